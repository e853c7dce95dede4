use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Timestamp;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached (network, pool exhaustion, I/O).
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The backend answered but refused the operation (permissions, constraints, bad data).
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Pets,
    Campaigns,
    Reports,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Pets => "pets",
            Collection::Campaigns => "campaigns",
            Collection::Reports => "reports",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document as returned by a listing: stored fields plus what the store assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Map<String, Value>,
    pub created_at: Timestamp,
}

impl StoredDocument {
    /// Merge the store-assigned id and timestamp into the fields and decode.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields;
        fields.insert("id".into(), Value::String(self.id));
        fields.insert("createdAt".into(), serde_json::to_value(self.created_at)?);
        serde_json::from_value(Value::Object(fields))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document; the store assigns its id and creation time.
    async fn insert(&self, collection: Collection, fields: Map<String, Value>) -> Result<String, StoreError>;
    /// Every document of the collection, most recent first.
    async fn list_recent(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError>;
    /// Bring the backing schema up to date. Called once after the handle is built.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process store used by tests and embedders without a database.
pub mod memory {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Clone, Default)]
    pub struct MemoryDocumentStore {
        collections: Arc<RwLock<HashMap<Collection, Vec<StoredDocument>>>>,
    }

    impl MemoryDocumentStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Raw stored fields, in insertion order. Lets tests inspect what was written.
        pub fn raw(&self, collection: Collection) -> Vec<Map<String, Value>> {
            let s = self.collections.read().unwrap_or_else(|e| e.into_inner());
            s.get(&collection)
                .map(|docs| docs.iter().map(|d| d.fields.clone()).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryDocumentStore {
        async fn insert(&self, collection: Collection, mut fields: Map<String, Value>) -> Result<String, StoreError> {
            // id and createdAt belong to the store
            fields.remove("id");
            fields.remove("createdAt");
            let id = uuid::Uuid::new_v4().simple().to_string();
            let doc = StoredDocument {
                id: id.clone(),
                fields,
                created_at: Timestamp::Resolved(Utc::now()),
            };
            let mut s = self.collections.write().unwrap_or_else(|e| e.into_inner());
            s.entry(collection).or_default().push(doc);
            Ok(id)
        }

        async fn list_recent(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
            let s = self.collections.read().unwrap_or_else(|e| e.into_inner());
            // newest insert first so equal timestamps keep recency after the stable sort
            let mut v: Vec<_> = s.get(&collection).map(|d| d.iter().rev().cloned().collect()).unwrap_or_default();
            v.sort_by(|a, b| b.created_at.resolved().cmp(&a.created_at.resolved()));
            Ok(v)
        }
    }
}

/// Postgres-backed store: one JSONB row per document, namespaced by project.
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use log::info;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};
    use std::str::FromStr;

    #[derive(Clone)]
    pub struct PgDocumentStore {
        pool: Pool<Postgres>,
        project: String,
    }

    #[derive(sqlx::FromRow)]
    struct DocumentRow {
        id: uuid::Uuid,
        data: Json<Value>,
        created_at: Option<DateTime<Utc>>,
    }

    impl PgDocumentStore {
        pub fn new(pool: Pool<Postgres>, project: impl Into<String>) -> Self {
            Self { pool, project: project.into() }
        }

        /// Build a lazily connecting pool; no network traffic until first use.
        pub fn connect_lazy(url: &str, project: &str, application_name: Option<&str>) -> Result<Self, StoreError> {
            let mut opts = PgConnectOptions::from_str(url).map_err(|e| StoreError::Rejected(e.to_string()))?;
            if let Some(name) = application_name {
                opts = opts.application_name(name);
            }
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(std::time::Duration::from_secs(5))
                .connect_lazy_with(opts);
            Ok(Self::new(pool, project))
        }
    }

    fn classify(e: sqlx::Error) -> StoreError {
        match e {
            sqlx::Error::Database(db) => StoreError::Rejected(db.to_string()),
            sqlx::Error::Decode(d) => StoreError::Rejected(d.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }

    #[async_trait]
    impl DocumentStore for PgDocumentStore {
        async fn insert(&self, collection: Collection, mut fields: Map<String, Value>) -> Result<String, StoreError> {
            fields.remove("id");
            fields.remove("createdAt");
            let id = sqlx::query_scalar::<_, uuid::Uuid>(
                "INSERT INTO documents (project, collection, data) VALUES ($1,$2,$3) RETURNING id",
            )
            .bind(&self.project)
            .bind(collection.as_str())
            .bind(Json(Value::Object(fields)))
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
            Ok(id.to_string())
        }

        async fn list_recent(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
            let rows = sqlx::query_as::<_, DocumentRow>(
                "SELECT id, data, created_at FROM documents WHERE project = $1 AND collection = $2 ORDER BY created_at DESC",
            )
            .bind(&self.project)
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
            Ok(rows
                .into_iter()
                .map(|r| StoredDocument {
                    id: r.id.to_string(),
                    fields: match r.data.0 {
                        Value::Object(m) => m,
                        _ => Map::new(),
                    },
                    created_at: r.created_at.into(),
                })
                .collect())
        }

        async fn prepare(&self) -> Result<(), StoreError> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            info!("document schema up to date (project={})", self.project);
            Ok(())
        }
    }
}
