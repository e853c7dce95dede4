use async_trait::async_trait;
use log::{error, info, warn};

use crate::store::StoreError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Publicly resolvable URL of an object previously written under `key`.
    fn public_url(&self, key: &str) -> String;
    /// Make sure the bucket exists. Called once after the handle is built.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3BlobStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    endpoint: String,
    public_base: Option<String>,
}

pub struct S3Settings<'a> {
    pub endpoint: &'a str,
    pub bucket: &'a str,
    pub region: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub app_name: Option<&'a str>,
    /// Host serving the bucket publicly; defaults to path-style URLs on the endpoint.
    pub public_base: Option<&'a str>,
}

impl S3BlobStore {
    pub async fn new(settings: S3Settings<'_>) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.to_string()))
            .endpoint_url(settings.endpoint);
        if !settings.access_key.is_empty() && !settings.secret_key.is_empty() {
            let creds = Credentials::new(settings.access_key, settings.secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        if let Some(name) = settings.app_name {
            match aws_config::AppName::new(name.to_string()) {
                Ok(app) => loader = loader.app_name(app),
                Err(e) => warn!("ignoring app name '{name}' for S3 client: {e}"),
            }
        }
        let conf = loader.load().await;
        // Path-style addressing: most MinIO/local endpoints have no wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3 client for bucket '{}' (path-style addressing)", settings.bucket);

        Ok(Self {
            bucket: settings.bucket.to_string(),
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            public_base: settings.public_base.map(|b| {
                let b = b.trim_end_matches('/');
                if b.starts_with("http://") || b.starts_with("https://") {
                    b.to_string()
                } else {
                    format!("https://{b}")
                }
            }),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<(), StoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let msg = e.to_string();
            let hint = if msg.contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if msg.contains("AccessDenied") {
                " (check PAWPOST_API_KEY/PAWPOST_API_SECRET permissions)"
            } else {
                ""
            };
            return Err(StoreError::Unavailable(format!("{msg}{hint}")));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base {
            Some(base) => format!("{base}/{}", encode_key(key)),
            None => format!("{}/{}/{}", self.endpoint, self.bucket, encode_key(key)),
        }
    }

    async fn prepare(&self) -> Result<(), StoreError> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }
        warn!("head_bucket failed for '{}' (will attempt create)", self.bucket);
        let max_attempts = 5u32;
        for attempt in 1..=max_attempts {
            match self.client.create_bucket().bucket(&self.bucket).send().await {
                Ok(_) => {
                    info!("created bucket '{}' (attempt {attempt})", self.bucket);
                    return Ok(());
                }
                Err(e) if attempt == max_attempts => {
                    error!("create_bucket failed for '{}' after {attempt} attempts: {e:?}", self.bucket);
                    return Err(StoreError::Unavailable(format!(
                        "failed to ensure bucket '{}': {e}",
                        self.bucket
                    )));
                }
                Err(e) => {
                    let backoff_ms = 200 * attempt.pow(2) as u64; // quadratic backoff
                    warn!("create_bucket attempt {attempt} failed: {e:?} (retrying in {backoff_ms}ms)");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
            }
        }
        Ok(())
    }
}

// ---------------- In-memory implementation (tests / local embedding) ----------------
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    pub struct MemoryBlobStore {
        inner: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
        base_url: String,
    }

    impl MemoryBlobStore {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                inner: Arc::new(Mutex::new(HashMap::new())),
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }

        /// Stored bytes and content type for `key`.
        pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
            let m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            m.get(key).cloned()
        }

        pub fn keys(&self) -> Vec<String> {
            let m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            m.keys().cloned().collect()
        }
    }

    impl Default for MemoryBlobStore {
        fn default() -> Self {
            Self::new("http://localhost/blobs")
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<(), StoreError> {
            let mut m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            m.insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("{}/{}", self.base_url, encode_key(key))
        }
    }
}
