use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pawpost::dal::{Backend, Dal, DalError, Entity};
use pawpost::models::*;
use pawpost::storage::memory::MemoryBlobStore;
use pawpost::storage::BlobStore;
use pawpost::store::memory::MemoryDocumentStore;
use pawpost::store::{Collection, DocumentStore, StoreError, StoredDocument};
use pawpost::HandleCache;
use serde_json::{json, Map, Value};

// ---------------- test backends ----------------

/// Never answers.
struct HangingStore;

#[async_trait::async_trait]
impl DocumentStore for HangingStore {
    async fn insert(&self, _: Collection, _: Map<String, Value>) -> Result<String, StoreError> {
        std::future::pending().await
    }
    async fn list_recent(&self, _: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        std::future::pending().await
    }
}

#[async_trait::async_trait]
impl BlobStore for HangingStore {
    async fn put(&self, _: &str, _: &str, _: &[u8]) -> Result<(), StoreError> {
        std::future::pending().await
    }
    fn public_url(&self, key: &str) -> String {
        format!("http://never/{key}")
    }
}

/// Always refuses, and counts how often it was asked.
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl DocumentStore for FailingStore {
    async fn insert(&self, _: Collection, _: Map<String, Value>) -> Result<String, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected("permission-denied: secret rule detail".into()))
    }
    async fn list_recent(&self, _: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection reset".into()))
    }
}

#[async_trait::async_trait]
impl BlobStore for FailingStore {
    async fn put(&self, _: &str, _: &str, _: &[u8]) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("bucket gone".into()))
    }
    fn public_url(&self, key: &str) -> String {
        format!("http://broken/{key}")
    }
}

fn memory_dal() -> (Dal, MemoryDocumentStore, MemoryBlobStore) {
    let docs = MemoryDocumentStore::new();
    let blobs = MemoryBlobStore::new("http://cdn.test");
    let cache = HandleCache::with_handles(Arc::new(docs.clone()), Arc::new(blobs.clone()));
    (Dal::new(Arc::new(cache)), docs, blobs)
}

fn unconfigured_dal() -> Dal {
    Dal::new(Arc::new(HandleCache::unconfigured()))
}

fn thor() -> NewPet {
    serde_json::from_value(json!({
        "name": "Thor", "species": "dog", "location": "X", "contact": "11999990000",
        "description": "lost near park", "type": "lost", "status": "lost"
    }))
    .unwrap()
}

fn campaign() -> NewCampaign {
    NewCampaign {
        org_name: "ONG Patas Solidarias".into(),
        title: "Racao para o inverno".into(),
        description: "Compra de racao".into(),
        goal: 1500.0,
        pix_key: Some("pix@ong.org".into()),
        contact: "contato@ong.org".into(),
        image_url: None,
        status: None,
    }
}

// ---------------- creates + lists ----------------

#[tokio::test]
async fn create_pet_then_list_returns_it_first() {
    let (dal, _, _) = memory_dal();
    let older = NewPet { name: "Mel".into(), ..thor() };
    dal.create_pet(older).await.unwrap();

    let id = dal.create_pet(thor()).await.unwrap();
    assert!(!id.is_empty());

    let pets = dal.list_pets().await;
    assert_eq!(pets.len(), 2);
    assert_eq!(pets[0].details.name, "Thor");
    assert_eq!(pets[0].id, id);
    assert!(pets[0].is_active);
    assert!(pets[0].created_at.resolved().is_some());
}

#[tokio::test]
async fn lists_are_ordered_newest_first() {
    let (dal, _, _) = memory_dal();
    for i in 0..5 {
        dal.create_report(NewReport {
            target_type: TargetType::Pet,
            target_id: None,
            reason: format!("case {i}"),
            description: None,
            contact: None,
            snapshot: ReportSnapshot::default(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let reports = dal.list_reports().await;
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0].details.reason, "case 4");
    for pair in reports.windows(2) {
        assert!(pair[0].created_at.resolved() >= pair[1].created_at.resolved());
    }
}

#[tokio::test]
async fn campaign_defaults_are_stamped() {
    let (dal, docs, _) = memory_dal();
    let id = dal.create_campaign(campaign()).await.unwrap();

    let raw = docs.raw(Collection::Campaigns);
    assert_eq!(raw[0]["status"], "active");
    assert_eq!(raw[0]["amountRaised"], 0);
    assert_eq!(raw[0]["isActive"], true);

    let listed = dal.list_campaigns().await;
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].status, CampaignStatus::Active);
    assert_eq!(listed[0].amount_raised, 0.0);
    assert_eq!(listed[0].progress_percent(), 0);

    let paused = NewCampaign { status: Some(CampaignStatus::Paused), ..campaign() };
    dal.create_campaign(paused).await.unwrap();
    assert_eq!(dal.list_campaigns().await[0].status, CampaignStatus::Paused);
}

#[tokio::test]
async fn report_is_never_created_resolved() {
    let (dal, docs, _) = memory_dal();
    // extra caller fields are ignored by the typed payload
    let report: NewReport = serde_json::from_value(json!({
        "targetType": "pet", "reason": "abuse", "resolved": true,
        "createdAt": "2000-01-01T00:00:00Z", "name": "Bidu", "type": "abuse-report"
    }))
    .unwrap();
    dal.create_report(report).await.unwrap();

    let raw = docs.raw(Collection::Reports);
    assert_eq!(raw[0]["resolved"], false);
    assert!(raw[0].get("createdAt").is_none());

    let listed = dal.list_reports().await;
    assert!(!listed[0].resolved);
    assert_eq!(listed[0].details.snapshot.name.as_deref(), Some("Bidu"));
    assert_eq!(listed[0].details.snapshot.kind, Some(PetKind::AbuseReport));
}

#[tokio::test]
async fn undecodable_documents_are_skipped() {
    let (dal, docs, _) = memory_dal();
    let mut broken = Map::new();
    broken.insert("name".into(), json!(42));
    docs.insert(Collection::Pets, broken).await.unwrap();
    dal.create_pet(thor()).await.unwrap();

    let pets = dal.try_list_pets().await.unwrap();
    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0].details.name, "Thor");
}

// ---------------- configuration gate ----------------

#[tokio::test]
async fn unconfigured_lists_are_empty_and_creates_fail() {
    let dal = unconfigured_dal();
    assert!(dal.list_campaigns().await.is_empty());
    assert!(dal.list_pets().await.is_empty());
    assert!(dal.list_reports().await.is_empty());

    let err = dal.create_campaign(campaign()).await.unwrap_err();
    assert!(matches!(err, DalError::NotConfigured(Backend::Documents)));
    let err = dal.try_list_pets().await.unwrap_err();
    assert!(matches!(err, DalError::NotConfigured(Backend::Documents)));

    let file = ImageFile { name: "a.png".into(), bytes: vec![1, 2, 3] };
    let err = dal.upload_pet_image(file).await.unwrap_err();
    assert!(matches!(err, DalError::NotConfigured(Backend::Blobs)));
}

#[tokio::test]
async fn invalid_payload_never_reaches_the_store() {
    let store = Arc::new(FailingStore::default());
    let cache = HandleCache::with_handles(store.clone(), store.clone());
    let dal = Dal::new(Arc::new(cache));

    let err = dal.create_campaign(NewCampaign { goal: -10.0, ..campaign() }).await.unwrap_err();
    assert!(matches!(err, DalError::Invalid { entity: Entity::Campaign, .. }));
    let err = dal.create_pet(NewPet { name: "".into(), ..thor() }).await.unwrap_err();
    assert!(matches!(err, DalError::Invalid { entity: Entity::Pet, .. }));
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

// ---------------- failure policy ----------------

#[tokio::test]
async fn remote_failures_are_loud_for_writes_and_soft_for_reads() {
    let store = Arc::new(FailingStore::default());
    let cache = HandleCache::with_handles(store.clone(), store.clone());
    let dal = Dal::new(Arc::new(cache));

    let err = dal.create_pet(thor()).await.unwrap_err();
    assert!(matches!(err, DalError::SaveFailed(Entity::Pet)));
    assert!(!err.to_string().contains("secret rule detail"));

    assert!(dal.list_pets().await.is_empty());
    assert!(matches!(dal.try_list_pets().await, Err(DalError::ListFailed(Entity::Pet))));

    let file = ImageFile { name: "a.png".into(), bytes: vec![0; 8] };
    let err = dal.upload_campaign_image(file).await.unwrap_err();
    assert!(matches!(err, DalError::UploadFailed(ImageFolder::Campaigns)));
}

#[tokio::test]
async fn hanging_backend_is_bounded_by_the_timeout() {
    let store = Arc::new(HangingStore);
    let cache = HandleCache::with_handles(store.clone(), store.clone());
    let bound = Duration::from_millis(100);
    let dal = Dal::new(Arc::new(cache)).with_timeout(bound);

    let started = Instant::now();
    let err = dal.create_pet(thor()).await.unwrap_err();
    assert!(matches!(err, DalError::Timeout(d) if d == bound));
    assert!(started.elapsed() < bound * 10);

    let started = Instant::now();
    assert!(dal.list_campaigns().await.is_empty());
    assert!(started.elapsed() < bound * 10);
    assert!(matches!(dal.try_list_reports().await, Err(DalError::Timeout(_))));

    let file = ImageFile { name: "a.png".into(), bytes: vec![0; 8] };
    assert!(matches!(dal.upload_pet_image(file).await, Err(DalError::Timeout(_))));
}

// ---------------- uploads ----------------

#[tokio::test]
async fn upload_writes_namespaced_key_and_returns_public_url() {
    let (dal, _, blobs) = memory_dal();
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];
    let file = ImageFile { name: "thor photo.png".into(), bytes: png.clone() };
    let url = dal.upload_pet_image(file).await.unwrap();

    let keys = blobs.keys();
    assert_eq!(keys.len(), 1);
    let key = &keys[0];
    assert!(key.starts_with("pets/"));
    assert!(key.ends_with("-thor photo.png"));
    let (bytes, content_type) = blobs.get(key).unwrap();
    assert_eq!(bytes, png);
    assert_eq!(content_type, "image/png");
    assert!(url.starts_with("http://cdn.test/pets/"));
    assert!(url.ends_with("-thor%20photo.png"));
}
