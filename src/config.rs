//! Backend configuration gate.
//!
//! Reads the fixed set of `PAWPOST_*` connection parameters and decides whether
//! the remote backends can be used at all. Missing configuration is a normal
//! state: it is reported, never raised.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

/// Bound on every remote call issued by the data access layer.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ApiKey,
    ApiSecret,
    AuthDomain,
    ProjectId,
    StorageBucket,
    MessagingSenderId,
    AppId,
    DatabaseUrl,
    BucketName,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::ApiKey,
        ConfigKey::ApiSecret,
        ConfigKey::AuthDomain,
        ConfigKey::ProjectId,
        ConfigKey::StorageBucket,
        ConfigKey::MessagingSenderId,
        ConfigKey::AppId,
        ConfigKey::DatabaseUrl,
        ConfigKey::BucketName,
    ];

    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::ApiKey => "PAWPOST_API_KEY",
            ConfigKey::ApiSecret => "PAWPOST_API_SECRET",
            ConfigKey::AuthDomain => "PAWPOST_AUTH_DOMAIN",
            ConfigKey::ProjectId => "PAWPOST_PROJECT_ID",
            ConfigKey::StorageBucket => "PAWPOST_STORAGE_BUCKET",
            ConfigKey::MessagingSenderId => "PAWPOST_MESSAGING_SENDER_ID",
            ConfigKey::AppId => "PAWPOST_APP_ID",
            ConfigKey::DatabaseUrl => "PAWPOST_DATABASE_URL",
            ConfigKey::BucketName => "PAWPOST_BUCKET_NAME",
        }
    }

    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::ApiKey => "apiKey",
            ConfigKey::ApiSecret => "apiSecret",
            ConfigKey::AuthDomain => "authDomain",
            ConfigKey::ProjectId => "projectId",
            ConfigKey::StorageBucket => "storageBucket",
            ConfigKey::MessagingSenderId => "messagingSenderId",
            ConfigKey::AppId => "appId",
            ConfigKey::DatabaseUrl => "databaseUrl",
            ConfigKey::BucketName => "bucketName",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, ConfigKey::AuthDomain | ConfigKey::MessagingSenderId)
    }

    fn is_secret(self) -> bool {
        matches!(self, ConfigKey::ApiKey | ConfigKey::ApiSecret | ConfigKey::DatabaseUrl)
    }
}

#[derive(Clone, Default)]
pub struct BackendConfig {
    values: HashMap<ConfigKey, String>,
    region: Option<String>,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = ConfigKey::ALL
            .iter()
            .filter_map(|&k| {
                lookup(k.env_var())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (k, v))
            })
            .collect();
        let region = lookup("PAWPOST_STORAGE_REGION")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self { values, region }
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Required parameters that are absent, in declaration order.
    pub fn missing(&self) -> Vec<ConfigKey> {
        ConfigKey::ALL
            .iter()
            .copied()
            .filter(|k| k.is_required() && !self.values.contains_key(k))
            .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }

    /// Log whether the backend is usable, naming exactly what is missing.
    pub fn report(&self) {
        let missing = self.missing();
        if missing.is_empty() {
            info!(
                project = self.get(ConfigKey::ProjectId).unwrap_or_default(),
                "backend configuration complete"
            );
        } else {
            let names: Vec<&str> = missing.iter().map(|k| k.name()).collect();
            warn!(missing = %names.join(", "), "backend not configured; remote operations disabled");
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for k in ConfigKey::ALL {
            if let Some(v) = self.get(k) {
                let shown = if k.is_secret() { "<redacted>" } else { v };
                m.entry(&k.name(), &shown);
            }
        }
        m.finish()
    }
}

/// `PAWPOST_REMOTE_TIMEOUT_MS` override of [`REMOTE_TIMEOUT`].
pub fn remote_timeout_from_env() -> Duration {
    std::env::var("PAWPOST_REMOTE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(REMOTE_TIMEOUT)
}
