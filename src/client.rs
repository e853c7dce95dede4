//! Process-wide backend handles, constructed at most once.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::config::{BackendConfig, ConfigKey};
use crate::storage::{BlobStore, S3BlobStore, S3Settings};
use crate::store::pg::PgDocumentStore;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct Handles {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Builds backend handles from a complete configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &BackendConfig) -> anyhow::Result<Handles>;
}

/// Postgres documents + S3 blobs.
pub struct RemoteConnector;

#[async_trait]
impl Connector for RemoteConnector {
    async fn connect(&self, config: &BackendConfig) -> anyhow::Result<Handles> {
        let required = |k: ConfigKey| {
            config
                .get(k)
                .ok_or_else(|| anyhow::anyhow!("{} must be set", k.env_var()))
        };
        let documents = PgDocumentStore::connect_lazy(
            required(ConfigKey::DatabaseUrl)?,
            required(ConfigKey::ProjectId)?,
            config.get(ConfigKey::MessagingSenderId),
        )?;
        let blobs = S3BlobStore::new(S3Settings {
            endpoint: required(ConfigKey::StorageBucket)?,
            bucket: required(ConfigKey::BucketName)?,
            region: config.region(),
            access_key: required(ConfigKey::ApiKey)?,
            secret_key: required(ConfigKey::ApiSecret)?,
            app_name: config.get(ConfigKey::AppId),
            public_base: config.get(ConfigKey::AuthDomain),
        })
        .await?;
        Ok(Handles {
            documents: Arc::new(documents),
            blobs: Arc::new(blobs),
        })
    }
}

/// Zero or one handle per backend. `None` inside the cell records that
/// construction was attempted and produced nothing.
#[derive(Default)]
pub struct HandleCache {
    cell: OnceCell<Option<Handles>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that already holds the given handles.
    pub fn with_handles(documents: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Some(Handles { documents, blobs }))),
        }
    }

    /// A cache that settled on "not configured".
    pub fn unconfigured() -> Self {
        Self {
            cell: OnceCell::new_with(Some(None)),
        }
    }

    /// Attempt construction once; later calls return the settled outcome.
    pub async fn initialize<C>(&self, config: &BackendConfig, connector: &C) -> bool
    where
        C: Connector + ?Sized,
    {
        let settled = self
            .cell
            .get_or_init(|| async {
                if !config.is_configured() {
                    warn!("backend handles not created: configuration incomplete");
                    return None;
                }
                match connector.connect(config).await {
                    Ok(handles) => {
                        info!(
                            project = config.get(ConfigKey::ProjectId).unwrap_or_default(),
                            "backend handles initialised"
                        );
                        Some(handles)
                    }
                    Err(e) => {
                        error!(error = %e, "backend handle construction failed");
                        None
                    }
                }
            })
            .await;
        settled.is_some()
    }

    /// Run schema / bucket preparation on the held handles. Failures are logged.
    pub async fn prepare(&self) {
        let Some(h) = self.handles() else { return };
        if let Err(e) = h.documents.prepare().await {
            error!(error = %e, "document store preparation failed");
        }
        if let Err(e) = h.blobs.prepare().await {
            error!(error = %e, "blob store preparation failed");
        }
    }

    fn handles(&self) -> Option<&Handles> {
        self.cell.get().and_then(Option::as_ref)
    }

    pub fn documents(&self) -> Option<Arc<dyn DocumentStore>> {
        self.handles().map(|h| h.documents.clone())
    }

    pub fn blobs(&self) -> Option<Arc<dyn BlobStore>> {
        self.handles().map(|h| h.blobs.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.handles().is_some()
    }
}

static GLOBAL: Lazy<Arc<HandleCache>> = Lazy::new(|| Arc::new(HandleCache::new()));

/// The process-wide cache.
pub fn global() -> Arc<HandleCache> {
    GLOBAL.clone()
}
