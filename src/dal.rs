//! Data access layer over the document and blob stores.
//!
//! Writes fail loud: a missing handle, an invalid payload, a rejected write or
//! a timeout all surface as [`DalError`]. Reads fail soft: `list_*` logs and
//! returns an empty list, while the `try_list_*` variants hand the error back
//! to callers that need to tell "nothing there" from "could not look".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client::HandleCache;
use crate::config::REMOTE_TIMEOUT;
use crate::models::*;
use crate::store::{Collection, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Documents,
    Blobs,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Documents => "document store",
            Backend::Blobs => "blob storage",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Pet,
    Campaign,
    Report,
}

impl Entity {
    pub fn collection(self) -> Collection {
        match self {
            Entity::Pet => Collection::Pets,
            Entity::Campaign => Collection::Campaigns,
            Entity::Report => Collection::Reports,
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Pet => "pet",
            Entity::Campaign => "campaign",
            Entity::Report => "report",
        })
    }
}

/// Caller-facing errors. Messages never carry the underlying backend cause.
#[derive(Debug, Error)]
pub enum DalError {
    #[error("{0} is not configured; set the PAWPOST_* variables")]
    NotConfigured(Backend),
    #[error("invalid {entity}: {source}")]
    Invalid {
        entity: Entity,
        #[source]
        source: ValidationError,
    },
    #[error("the server did not answer within {}s; try again", .0.as_secs())]
    Timeout(Duration),
    #[error("could not save the {0}; check your connection and try again")]
    SaveFailed(Entity),
    #[error("could not load the {0} list")]
    ListFailed(Entity),
    #[error("failed to upload the {0} image")]
    UploadFailed(ImageFolder),
}

#[derive(Clone)]
pub struct Dal {
    handles: Arc<HandleCache>,
    timeout: Duration,
}

impl Dal {
    pub fn new(handles: Arc<HandleCache>) -> Self {
        Self { handles, timeout: REMOTE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.handles.is_ready()
    }

    /// Race `fut` against the timeout; a late result is dropped with the future.
    async fn bounded<T, F>(&self, fut: F) -> Result<Result<T, StoreError>, Duration>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| self.timeout)
    }

    // ---------------------------------------------------------------- writes

    pub async fn create_pet(&self, pet: NewPet) -> Result<String, DalError> {
        let entity = Entity::Pet;
        self.admit_pet(&pet)?;
        let mut fields = to_fields(entity, &pet)?;
        fields.insert("isActive".into(), Value::Bool(true));
        self.insert(entity, fields).await
    }

    pub async fn create_campaign(&self, campaign: NewCampaign) -> Result<String, DalError> {
        let entity = Entity::Campaign;
        self.admit_campaign(&campaign)?;
        let status = campaign.status.unwrap_or_default();
        let mut fields = to_fields(entity, &campaign)?;
        fields.insert("amountRaised".into(), Value::from(0));
        fields.insert("status".into(), to_value(entity, &status)?);
        fields.insert("isActive".into(), Value::Bool(true));
        self.insert(entity, fields).await
    }

    pub async fn create_report(&self, report: NewReport) -> Result<String, DalError> {
        let entity = Entity::Report;
        self.admit_report(&report)?;
        let mut fields = to_fields(entity, &report)?;
        fields.insert("resolved".into(), Value::Bool(false));
        self.insert(entity, fields).await
    }

    /// Everything `create_pet` checks before talking to the store.
    pub fn admit_pet(&self, pet: &NewPet) -> Result<(), DalError> {
        self.ensure(Backend::Documents)?;
        pet.validate().map_err(|source| DalError::Invalid { entity: Entity::Pet, source })
    }

    pub fn admit_campaign(&self, campaign: &NewCampaign) -> Result<(), DalError> {
        self.ensure(Backend::Documents)?;
        campaign
            .validate()
            .map_err(|source| DalError::Invalid { entity: Entity::Campaign, source })
    }

    pub fn admit_report(&self, report: &NewReport) -> Result<(), DalError> {
        self.ensure(Backend::Documents)?;
        report
            .validate()
            .map_err(|source| DalError::Invalid { entity: Entity::Report, source })
    }

    pub fn ensure(&self, backend: Backend) -> Result<(), DalError> {
        let present = match backend {
            Backend::Documents => self.handles.documents().is_some(),
            Backend::Blobs => self.handles.blobs().is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(DalError::NotConfigured(backend))
        }
    }

    async fn insert(&self, entity: Entity, fields: Map<String, Value>) -> Result<String, DalError> {
        let documents = self
            .handles
            .documents()
            .ok_or(DalError::NotConfigured(Backend::Documents))?;
        debug!(collection = %entity.collection(), payload = ?fields, "insert");
        match self.bounded(documents.insert(entity.collection(), fields)).await {
            Ok(Ok(id)) => {
                info!(collection = %entity.collection(), %id, "document created");
                Ok(id)
            }
            Ok(Err(e)) => {
                error!(collection = %entity.collection(), error = %e, "insert failed");
                Err(DalError::SaveFailed(entity))
            }
            Err(after) => {
                error!(collection = %entity.collection(), ?after, "insert timed out");
                Err(DalError::Timeout(after))
            }
        }
    }

    // ----------------------------------------------------------------- reads

    pub async fn try_list_pets(&self) -> Result<Vec<Pet>, DalError> {
        self.fetch(Entity::Pet).await
    }

    pub async fn try_list_campaigns(&self) -> Result<Vec<Campaign>, DalError> {
        self.fetch(Entity::Campaign).await
    }

    pub async fn try_list_reports(&self) -> Result<Vec<Report>, DalError> {
        self.fetch(Entity::Report).await
    }

    pub async fn list_pets(&self) -> Vec<Pet> {
        degrade(Entity::Pet, self.try_list_pets().await)
    }

    pub async fn list_campaigns(&self) -> Vec<Campaign> {
        degrade(Entity::Campaign, self.try_list_campaigns().await)
    }

    pub async fn list_reports(&self) -> Vec<Report> {
        degrade(Entity::Report, self.try_list_reports().await)
    }

    async fn fetch<T: DeserializeOwned>(&self, entity: Entity) -> Result<Vec<T>, DalError> {
        let documents = self
            .handles
            .documents()
            .ok_or(DalError::NotConfigured(Backend::Documents))?;
        let docs = match self.bounded(documents.list_recent(entity.collection())).await {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                error!(collection = %entity.collection(), error = %e, "list failed");
                return Err(DalError::ListFailed(entity));
            }
            Err(after) => {
                error!(collection = %entity.collection(), ?after, "list timed out");
                return Err(DalError::Timeout(after));
            }
        };
        debug!(collection = %entity.collection(), count = docs.len(), "documents fetched");
        let records = docs
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id.clone();
                match doc.decode::<T>() {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(collection = %entity.collection(), %id, error = %e, "skipping undecodable document");
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    // --------------------------------------------------------------- uploads

    pub async fn upload_pet_image(&self, file: ImageFile) -> Result<String, DalError> {
        self.upload_image(file, ImageFolder::Pets).await
    }

    pub async fn upload_campaign_image(&self, file: ImageFile) -> Result<String, DalError> {
        self.upload_image(file, ImageFolder::Campaigns).await
    }

    pub async fn upload_image(&self, file: ImageFile, folder: ImageFolder) -> Result<String, DalError> {
        let blobs = self.handles.blobs().ok_or(DalError::NotConfigured(Backend::Blobs))?;
        let key = blob_key(folder, &file.name, Utc::now().timestamp_millis());
        let content_type = file.content_type();
        info!(%key, size = file.bytes.len(), %content_type, "uploading image");
        match self.bounded(blobs.put(&key, content_type, &file.bytes)).await {
            Ok(Ok(())) => Ok(blobs.public_url(&key)),
            Ok(Err(e)) => {
                error!(%key, error = %e, "image upload failed");
                Err(DalError::UploadFailed(folder))
            }
            Err(after) => {
                error!(%key, ?after, "image upload timed out");
                Err(DalError::Timeout(after))
            }
        }
    }
}

fn degrade<T>(entity: Entity, result: Result<Vec<T>, DalError>) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            warn!(collection = %entity.collection(), kind = ?e, "list degraded to empty");
            Vec::new()
        }
    }
}

fn to_value<T: Serialize>(entity: Entity, value: &T) -> Result<Value, DalError> {
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "payload serialisation failed");
        DalError::SaveFailed(entity)
    })
}

fn to_fields<T: Serialize>(entity: Entity, value: &T) -> Result<Map<String, Value>, DalError> {
    match to_value(entity, value)? {
        Value::Object(fields) => Ok(fields),
        _ => {
            error!("payload did not serialise to an object");
            Err(DalError::SaveFailed(entity))
        }
    }
}

/// `<folder>/<millis>-<name>`, with separators in the name neutralised so the
/// key always stays inside its folder.
pub fn blob_key(folder: ImageFolder, file_name: &str, millis: i64) -> String {
    let cleaned: String = file_name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let name = match cleaned.trim_matches('.') {
        "" => "upload",
        _ => cleaned.as_str(),
    };
    format!("{}/{millis}-{name}", folder.as_str())
}
