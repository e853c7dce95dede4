use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pawpost::client::{Connector, Handles};
use pawpost::config::{BackendConfig, ConfigKey};
use pawpost::storage::memory::MemoryBlobStore;
use pawpost::store::memory::MemoryDocumentStore;
use pawpost::{Dal, HandleCache};

#[derive(Default)]
struct CountingConnector {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait::async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, _config: &BackendConfig) -> anyhow::Result<Handles> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // stay in flight long enough for concurrent callers to pile up
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.fail {
            anyhow::bail!("endpoint refused");
        }
        Ok(Handles {
            documents: Arc::new(MemoryDocumentStore::new()),
            blobs: Arc::new(MemoryBlobStore::default()),
        })
    }
}

fn complete_config() -> BackendConfig {
    let vars: HashMap<&str, String> = ConfigKey::ALL
        .iter()
        .map(|k| (k.env_var(), format!("v-{}", k.name())))
        .collect();
    BackendConfig::from_lookup(|n| vars.get(n).cloned())
}

#[tokio::test]
async fn construction_happens_once() {
    let cache = HandleCache::new();
    assert!(!cache.is_ready());
    let connector = CountingConnector::default();
    let cfg = complete_config();

    assert!(cache.initialize(&cfg, &connector).await);
    assert!(cache.initialize(&cfg, &connector).await);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_ready());
    assert!(cache.documents().is_some());
    assert!(cache.blobs().is_some());
}

#[tokio::test]
async fn unconfigured_never_constructs() {
    let cache = HandleCache::new();
    let connector = CountingConnector::default();
    let cfg = BackendConfig::from_lookup(|_| None);

    assert!(!cache.initialize(&cfg, &connector).await);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    assert!(cache.documents().is_none());
    assert!(cache.blobs().is_none());

    // the outcome is settled: a later complete config does not re-initialise
    assert!(!cache.initialize(&complete_config(), &connector).await);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_construction_leaves_no_handles() {
    let cache = Arc::new(HandleCache::new());
    let connector = CountingConnector { fail: true, ..Default::default() };
    assert!(!cache.initialize(&complete_config(), &connector).await);
    assert!(!cache.is_ready());

    let dal = Dal::new(cache);
    assert!(dal.list_pets().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initialisation_is_single_flight() {
    let cache = Arc::new(HandleCache::new());
    let connector = Arc::new(CountingConnector::default());
    let cfg = Arc::new(complete_config());
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let (cache, connector, cfg) = (cache.clone(), connector.clone(), cfg.clone());
        tasks.push(tokio::spawn(async move { cache.initialize(&cfg, connector.as_ref()).await }));
    }
    for t in tasks {
        assert!(t.await.unwrap());
    }
    assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn global_cache_is_shared() {
    let a = pawpost::client::global();
    let b = pawpost::client::global();
    assert!(Arc::ptr_eq(&a, &b));
}
