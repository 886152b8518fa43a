use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use docrepo::clients::{DocumentStore, FeedPage, MemoryStore};
use docrepo::core::links::{CollectionLink, DatabaseLink, DocumentLink};
use docrepo::core::models::{Item, Partitioning, StoreReceipt};
use docrepo::errors::StoreError;
use docrepo::query::{Filter, field};
use docrepo::repository::{
    DocumentRepository, ProvisionOutcome, ProvisionedCollection, Repository, StoreProvisioner,
};
use futures::TryStreamExt;
use serde_json::Value;

const DATABASE: &str = "ToDoList";
const COLLECTION: &str = "Items";

async fn open_repo(store: Arc<MemoryStore>) -> DocumentRepository<Item, MemoryStore> {
    DocumentRepository::with_store(store, DATABASE, COLLECTION, 400)
        .await
        .expect("provisioning a memory store succeeds")
}

fn item(id: &str, completed: bool) -> Item {
    let mut item = Item::new(id, format!("task {id}"));
    item.completed = completed;
    item
}

#[tokio::test]
async fn test_provisioning_creates_missing_resources_once() {
    let store = Arc::new(MemoryStore::new());
    let link = CollectionLink::new(DATABASE, COLLECTION);

    let _repo = open_repo(store.clone()).await;
    assert_eq!(store.create_requests(), 2);
    assert_eq!(store.offer_throughput(&link).await, Some(400));

    // A second instance over the same store finds everything in place.
    let _again = open_repo(store.clone()).await;
    assert_eq!(store.create_requests(), 2);
}

#[tokio::test]
async fn test_provisioner_reports_outcomes() {
    let store = MemoryStore::new();
    let link = CollectionLink::new(DATABASE, COLLECTION);
    let provisioner = StoreProvisioner::new(&store, &link, 1000);

    assert_eq!(
        provisioner.ensure_database().await.unwrap(),
        ProvisionOutcome::Created
    );
    assert_eq!(
        provisioner.ensure_collection().await.unwrap(),
        ProvisionedCollection {
            outcome: ProvisionOutcome::Created,
            partitioning: Partitioning::ById,
        }
    );
    assert_eq!(
        provisioner.ensure_database().await.unwrap(),
        ProvisionOutcome::Existing
    );
    assert_eq!(
        provisioner.ensure_collection().await.unwrap(),
        ProvisionedCollection {
            outcome: ProvisionOutcome::Existing,
            partitioning: Partitioning::ById,
        }
    );
    assert_eq!(store.offer_throughput(&link).await, Some(1000));
}

#[tokio::test]
async fn test_existing_collection_is_not_overwritten() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store.clone()).await;
    repo.create_item(&item("kept", false)).await.unwrap();

    let _second = open_repo(store.clone()).await;
    let link = CollectionLink::new(DATABASE, COLLECTION);
    assert_eq!(store.document_count(&link).await, Some(1));
}

#[tokio::test]
async fn test_unpartitioned_collection_is_addressed_without_key() {
    let store = Arc::new(MemoryStore::new().unpartitioned());
    let repo = open_repo(store.clone()).await;
    assert_eq!(repo.partitioning(), Partitioning::Unpartitioned);

    repo.create_item(&item("u1", false)).await.unwrap();
    let mut changed = item("u1", true);
    changed.category = Some("home".to_string());
    repo.update_item("u1", &changed).await.unwrap();
    assert_eq!(repo.get_item("u1").await.unwrap(), Some(changed));
    repo.delete_item("u1").await.unwrap();
    assert_eq!(repo.get_item("u1").await.unwrap(), None);

    // A repository opened later over the same store keeps the partitioning it finds.
    let again = open_repo(store).await;
    assert_eq!(again.partitioning(), Partitioning::Unpartitioned);
}

#[tokio::test]
async fn test_store_rejects_mismatched_partition_key() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store.clone()).await;
    assert_eq!(repo.partitioning(), Partitioning::ById);
    repo.create_item(&item("k1", false)).await.unwrap();

    let link = repo.collection().document("k1");
    for key in [None, Some("other")] {
        let err = store.read_document(&link, key).await.unwrap_err();
        assert_eq!(err.status(), Some(400), "key {key:?}");
    }
    assert!(store.read_document(&link, Some("k1")).await.is_ok());
}

#[tokio::test]
async fn test_blank_identifiers_fail_before_provisioning() {
    let store = Arc::new(MemoryStore::new());
    let result: Result<DocumentRepository<Item, MemoryStore>, _> =
        DocumentRepository::with_store(store.clone(), DATABASE, " ", 400).await;

    assert!(matches!(result, Err(StoreError::ConfigurationError(_))));
    assert_eq!(store.create_requests(), 0);
}

#[tokio::test]
async fn test_forbidden_id_characters_fail_before_provisioning() {
    let store = Arc::new(MemoryStore::new());
    for (database, collection) in [("To/Do", COLLECTION), (DATABASE, "Items?"), (DATABASE, "a#b")] {
        let result: Result<DocumentRepository<Item, MemoryStore>, _> =
            DocumentRepository::with_store(store.clone(), database, collection, 400).await;
        match result {
            Err(StoreError::ConfigurationError(msg)) => {
                assert!(msg.contains("forbidden character"), "unexpected message: {msg}");
            }
            Err(other) => panic!("expected configuration error, got {other:?}"),
            Ok(_) => panic!("'{database}/{collection}' should be rejected"),
        }
    }
    assert_eq!(store.create_requests(), 0);
}

#[tokio::test]
async fn test_get_missing_item_is_none() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;
    assert_eq!(repo.get_item("missing-id").await.unwrap(), None);
}

#[tokio::test]
async fn test_round_trip_crud() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;

    let mut original = item("x1", false);
    original.description = Some("buy milk".to_string());
    let receipt = repo.create_item(&original).await.unwrap();
    assert_eq!(receipt.id, "x1");
    assert!(receipt.etag.is_some());

    assert_eq!(repo.get_item("x1").await.unwrap(), Some(original.clone()));

    let mut changed = original.clone();
    changed.completed = true;
    changed.category = Some("errands".to_string());
    let update = repo.update_item("x1", &changed).await.unwrap();
    assert_ne!(update.etag, receipt.etag);
    assert_eq!(repo.get_item("x1").await.unwrap(), Some(changed));

    repo.delete_item("x1").await.unwrap();
    assert_eq!(repo.get_item("x1").await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_create_propagates_conflict() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;
    repo.create_item(&item("dup", false)).await.unwrap();

    let err = repo.create_item(&item("dup", true)).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(repo.get_item("dup").await.unwrap(), Some(item("dup", false)));
}

#[tokio::test]
async fn test_update_with_mismatched_id_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store).await;
    repo.create_item(&item("a", false)).await.unwrap();

    let err = repo.update_item("a", &item("b", true)).await.unwrap_err();
    match err {
        StoreError::IdentifierMismatch { addressed, embedded } => {
            assert_eq!(addressed, "a");
            assert_eq!(embedded, "b");
        }
        other => panic!("expected id mismatch, got {other:?}"),
    }
    assert_eq!(repo.get_item("a").await.unwrap(), Some(item("a", false)));
}

#[tokio::test]
async fn test_update_missing_document_propagates_not_found() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;
    let err = repo.update_item("ghost", &item("ghost", true)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_missing_document_is_tolerated() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;
    repo.delete_item("never-existed").await.unwrap();
}

#[tokio::test]
async fn test_filter_returns_exactly_the_incomplete_items() {
    let store = Arc::new(MemoryStore::with_page_size(7));
    let repo = open_repo(store).await;

    let mut expected = HashSet::new();
    for i in 0..50 {
        let completed = i % 3 == 0;
        let id = format!("item-{i}");
        if !completed {
            expected.insert(id.clone());
        }
        repo.create_item(&item(&id, completed)).await.unwrap();
    }

    let open_items = repo.get_items(&field("completed").eq(false)).await.unwrap();
    assert!(open_items.iter().all(|i| !i.completed));

    let ids: HashSet<String> = open_items.into_iter().map(|i| i.id).collect();
    assert_eq!(ids, expected);

    let negated = repo.get_items(&!field("completed").eq(true)).await.unwrap();
    assert_eq!(negated.len(), expected.len());
}

#[tokio::test]
async fn test_pagination_is_exhausted_without_duplicates() {
    let store = Arc::new(MemoryStore::with_page_size(40));
    let repo = open_repo(store.clone()).await;

    for i in 0..100 {
        repo.create_item(&item(&format!("doc-{i:03}"), false))
            .await
            .unwrap();
    }

    let before = store.query_requests();
    let all = repo.get_items(&Filter::All).await.unwrap();
    assert_eq!(store.query_requests() - before, 3);

    assert_eq!(all.len(), 100);
    let unique: HashSet<&str> = all.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(unique.len(), 100);

    // Feed order is preserved across pages.
    let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn test_query_pages_one_batch_at_a_time() {
    let store = Arc::new(MemoryStore::with_page_size(40));
    let repo = open_repo(store).await;
    for i in 0..100 {
        repo.create_item(&item(&format!("p{i}"), false)).await.unwrap();
    }

    let mut query = repo.query(Filter::All).unwrap();
    let mut sizes = Vec::new();
    while query.has_more_results() {
        sizes.push(query.execute_next().await.unwrap().len());
    }
    assert_eq!(sizes, [40, 40, 20]);
    assert_eq!(query.pages_fetched(), 3);
    assert!(query.execute_next().await.unwrap().is_empty());

    let batches: Vec<Vec<Item>> = repo
        .query(Filter::All)
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), [40, 40, 20]);
}

#[tokio::test]
async fn test_empty_collection_yields_one_empty_page() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store).await;

    let mut query = repo.query(field("completed").eq(false)).unwrap();
    assert!(query.has_more_results());
    assert!(query.execute_next().await.unwrap().is_empty());
    assert!(!query.has_more_results());
}

#[tokio::test]
async fn test_foreign_continuation_tokens_are_rejected() {
    let store = Arc::new(MemoryStore::with_page_size(40));
    let repo = open_repo(store.clone()).await;
    for i in 0..50 {
        repo.create_item(&item(&format!("c{i}"), false)).await.unwrap();
    }
    let link = repo.collection().clone();

    let max = usize::MAX.to_string();
    for token in [max.as_str(), "51", "not-a-number"] {
        let err = store
            .query_documents(&link, &Filter::All, Some(token))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400), "token '{token}'");
    }

    let tail = store
        .query_documents(&link, &Filter::All, Some("40"))
        .await
        .unwrap();
    assert_eq!(tail.documents.len(), 10);
    assert!(tail.continuation.is_none());

    let end = store
        .query_documents(&link, &Filter::All, Some("50"))
        .await
        .unwrap();
    assert!(end.documents.is_empty());
    assert!(end.continuation.is_none());
}

#[tokio::test]
async fn test_untranslatable_filter_fails_before_any_request() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store.clone()).await;

    let err = repo.get_items(&field("a..b").eq(1)).await.unwrap_err();
    assert!(matches!(err, StoreError::FilterError(_)));
    assert_eq!(store.query_requests(), 0);
}

#[tokio::test]
async fn test_concurrent_get_and_delete_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let repo = open_repo(store).await;
    repo.create_item(&item("A", false)).await.unwrap();
    repo.create_item(&item("B", false)).await.unwrap();

    let reader = repo.clone();
    let deleter = repo.clone();
    let (got, deleted) = tokio::join!(
        tokio::spawn(async move { reader.get_item("A").await }),
        tokio::spawn(async move { deleter.delete_item("B").await }),
    );

    assert_eq!(got.unwrap().unwrap(), Some(item("A", false)));
    deleted.unwrap().unwrap();
    assert_eq!(repo.get_item("B").await.unwrap(), None);
    assert_eq!(repo.get_item("A").await.unwrap(), Some(item("A", false)));
}

/// Delegates to a [`MemoryStore`] but can be told to fail.
struct FaultyStore {
    inner: MemoryStore,
    deny_database_reads: bool,
    throttle_documents: AtomicBool,
}

impl FaultyStore {
    fn new(deny_database_reads: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            deny_database_reads,
            throttle_documents: AtomicBool::new(false),
        }
    }
}

fn failure(status: u16) -> StoreError {
    StoreError::StoreFailure {
        status,
        sub_status: None,
        activity_id: Some("activity".to_string()),
        message: format!("injected {status}"),
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn read_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        if self.deny_database_reads {
            return Err(failure(401));
        }
        self.inner.read_database(database).await
    }

    async fn create_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        self.inner.create_database(database).await
    }

    async fn read_collection(
        &self,
        collection: &CollectionLink,
    ) -> Result<StoreReceipt, StoreError> {
        self.inner.read_collection(collection).await
    }

    async fn create_collection(
        &self,
        collection: &CollectionLink,
        offer_throughput: u32,
    ) -> Result<StoreReceipt, StoreError> {
        self.inner.create_collection(collection, offer_throughput).await
    }

    async fn read_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<Value, StoreError> {
        if self.throttle_documents.load(Ordering::SeqCst) {
            return Err(failure(429));
        }
        self.inner.read_document(document, partition_key).await
    }

    async fn create_document(
        &self,
        collection: &CollectionLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        self.inner
            .create_document(collection, body, partition_key)
            .await
    }

    async fn replace_document(
        &self,
        document: &DocumentLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        self.inner
            .replace_document(document, body, partition_key)
            .await
    }

    async fn delete_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<(), StoreError> {
        if self.throttle_documents.load(Ordering::SeqCst) {
            return Err(failure(429));
        }
        self.inner.delete_document(document, partition_key).await
    }

    async fn query_documents(
        &self,
        collection: &CollectionLink,
        filter: &Filter,
        continuation: Option<&str>,
    ) -> Result<FeedPage, StoreError> {
        if self.throttle_documents.load(Ordering::SeqCst) {
            return Err(failure(429));
        }
        self.inner
            .query_documents(collection, filter, continuation)
            .await
    }
}

#[tokio::test]
async fn test_provisioning_failure_fails_construction() {
    let store = Arc::new(FaultyStore::new(true));
    let result: Result<DocumentRepository<Item, FaultyStore>, _> =
        DocumentRepository::with_store(store.clone(), DATABASE, COLLECTION, 400).await;

    match result {
        Err(StoreError::StoreFailure { status, .. }) => assert_eq!(status, 401),
        Err(other) => panic!("expected store failure, got {other:?}"),
        Ok(_) => panic!("construction should fail"),
    }
    // Neither the database nor the collection was created.
    assert_eq!(store.inner.create_requests(), 0);
}

#[tokio::test]
async fn test_store_failures_propagate_and_repository_stays_usable() {
    let store = Arc::new(FaultyStore::new(false));
    let repo: DocumentRepository<Item, FaultyStore> =
        DocumentRepository::with_store(store.clone(), DATABASE, COLLECTION, 400)
            .await
            .unwrap();
    repo.create_item(&item("z", false)).await.unwrap();

    store.throttle_documents.store(true, Ordering::SeqCst);
    assert_eq!(repo.get_item("z").await.unwrap_err().status(), Some(429));
    assert_eq!(repo.delete_item("z").await.unwrap_err().status(), Some(429));
    assert_eq!(
        repo.get_items(&Filter::All).await.unwrap_err().status(),
        Some(429)
    );

    store.throttle_documents.store(false, Ordering::SeqCst);
    assert_eq!(repo.get_item("z").await.unwrap(), Some(item("z", false)));
}

#[tokio::test]
async fn test_repository_works_through_trait_object() {
    let repo = open_repo(Arc::new(MemoryStore::new())).await;
    let shared: Arc<dyn Repository<Item>> = Arc::new(repo);

    shared.create_item(&item("dyn", false)).await.unwrap();
    assert_eq!(shared.get_items(&Filter::All).await.unwrap().len(), 1);
}
