//! In-process document store.
//!
//! Implements [`DocumentStore`] over in-memory maps with the same status
//! conventions as the remote store (404 for missing resources, 409 for
//! duplicate ids) and splits query results into pages of a fixed size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::{DocumentStore, FeedPage};
use crate::core::links::{CollectionLink, DatabaseLink, DocumentLink};
use crate::core::models::{PartitionKeyDefinition, Partitioning, StoreReceipt};
use crate::errors::StoreError;
use crate::query::filter::Filter;

pub const DEFAULT_PAGE_SIZE: usize = 100;

struct CollectionState {
    receipt: StoreReceipt,
    offer_throughput: u32,
    // Insertion order doubles as feed order.
    documents: Vec<Value>,
}

impl CollectionState {
    /// The key must be the document id on partitioned collections and absent
    /// otherwise.
    fn check_partition_key(&self, id: &str, partition_key: Option<&str>) -> Result<(), StoreError> {
        let partitioning = Partitioning::from_definition(self.receipt.partition_key.as_ref())?;
        if partitioning.key_for(id) == partition_key {
            return Ok(());
        }
        Err(StoreError::StoreFailure {
            status: 400,
            sub_status: Some(1001),
            activity_id: None,
            message: format!(
                "partition key {partition_key:?} does not match the collection's partitioning ({partitioning:?})"
            ),
        })
    }
}

struct DatabaseState {
    receipt: StoreReceipt,
    collections: HashMap<String, CollectionState>,
}

pub struct MemoryStore {
    databases: RwLock<HashMap<String, DatabaseState>>,
    page_size: usize,
    partitioned: bool,
    create_requests: AtomicUsize,
    query_requests: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_receipt(id: &str, link: &str) -> StoreReceipt {
    let rid = Uuid::new_v4().simple().to_string();
    StoreReceipt {
        id: id.to_string(),
        resource_id: Some(rid[..12].to_string()),
        self_link: Some(format!("{link}/")),
        etag: Some(format!("\"{}\"", Uuid::new_v4())),
        timestamp: Some(Utc::now().timestamp()),
        partition_key: None,
        request_charge: Some(1.0),
        activity_id: Some(Uuid::new_v4().to_string()),
    }
}

fn conflict(link: &str) -> StoreError {
    StoreError::StoreFailure {
        status: 409,
        sub_status: None,
        activity_id: None,
        message: format!("Entity with the specified id already exists: {link}"),
    }
}

fn invalid_continuation(token: &str) -> StoreError {
    StoreError::StoreFailure {
        status: 400,
        sub_status: None,
        activity_id: None,
        message: format!("invalid continuation token '{token}'"),
    }
}

fn stamp(mut body: Value, receipt: &StoreReceipt) -> Value {
    if let Some(object) = body.as_object_mut() {
        object.insert("_rid".to_string(), receipt.resource_id.clone().into());
        object.insert("_self".to_string(), receipt.self_link.clone().into());
        object.insert("_etag".to_string(), receipt.etag.clone().into());
        object.insert("_ts".to_string(), receipt.timestamp.into());
    }
    body
}

fn document_id(body: &Value) -> Option<&str> {
    body.get("id").and_then(Value::as_str)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A store whose query feeds return at most `page_size` documents per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            databases: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            partitioned: true,
            create_requests: AtomicUsize::new(0),
            query_requests: AtomicUsize::new(0),
        }
    }

    /// Collections created from now on have no partition key, like those made
    /// by older clients of the store.
    #[must_use]
    pub fn unpartitioned(mut self) -> Self {
        self.partitioned = false;
        self
    }

    /// Number of database/collection/document create requests received.
    #[must_use]
    pub fn create_requests(&self) -> usize {
        self.create_requests.load(Ordering::SeqCst)
    }

    /// Number of query pages served.
    #[must_use]
    pub fn query_requests(&self) -> usize {
        self.query_requests.load(Ordering::SeqCst)
    }

    pub async fn offer_throughput(&self, collection: &CollectionLink) -> Option<u32> {
        self.databases
            .read()
            .await
            .get(collection.database().id())?
            .collections
            .get(collection.id())
            .map(|c| c.offer_throughput)
    }

    pub async fn document_count(&self, collection: &CollectionLink) -> Option<usize> {
        self.databases
            .read()
            .await
            .get(collection.database().id())?
            .collections
            .get(collection.id())
            .map(|c| c.documents.len())
    }
}

fn collection_mut<'a>(
    databases: &'a mut HashMap<String, DatabaseState>,
    link: &CollectionLink,
) -> Result<&'a mut CollectionState, StoreError> {
    databases
        .get_mut(link.database().id())
        .and_then(|db| db.collections.get_mut(link.id()))
        .ok_or_else(|| StoreError::NotFound(link.to_string()))
}

fn collection_ref<'a>(
    databases: &'a HashMap<String, DatabaseState>,
    link: &CollectionLink,
) -> Result<&'a CollectionState, StoreError> {
    databases
        .get(link.database().id())
        .and_then(|db| db.collections.get(link.id()))
        .ok_or_else(|| StoreError::NotFound(link.to_string()))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        self.databases
            .read()
            .await
            .get(database.id())
            .map(|db| db.receipt.clone())
            .ok_or_else(|| StoreError::NotFound(database.to_string()))
    }

    async fn create_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        self.create_requests.fetch_add(1, Ordering::SeqCst);
        let mut databases = self.databases.write().await;
        if databases.contains_key(database.id()) {
            return Err(conflict(&database.to_string()));
        }
        let receipt = new_receipt(database.id(), &database.to_string());
        databases.insert(
            database.id().to_string(),
            DatabaseState {
                receipt: receipt.clone(),
                collections: HashMap::new(),
            },
        );
        Ok(receipt)
    }

    async fn read_collection(
        &self,
        collection: &CollectionLink,
    ) -> Result<StoreReceipt, StoreError> {
        let databases = self.databases.read().await;
        Ok(collection_ref(&databases, collection)?.receipt.clone())
    }

    async fn create_collection(
        &self,
        collection: &CollectionLink,
        offer_throughput: u32,
    ) -> Result<StoreReceipt, StoreError> {
        self.create_requests.fetch_add(1, Ordering::SeqCst);
        let mut databases = self.databases.write().await;
        let database = databases
            .get_mut(collection.database().id())
            .ok_or_else(|| StoreError::NotFound(collection.database().to_string()))?;
        if database.collections.contains_key(collection.id()) {
            return Err(conflict(&collection.to_string()));
        }
        let mut receipt = new_receipt(collection.id(), &collection.to_string());
        if self.partitioned {
            receipt.partition_key = Some(PartitionKeyDefinition::by_id());
        }
        database.collections.insert(
            collection.id().to_string(),
            CollectionState {
                receipt: receipt.clone(),
                offer_throughput,
                documents: Vec::new(),
            },
        );
        Ok(receipt)
    }

    async fn read_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<Value, StoreError> {
        let databases = self.databases.read().await;
        let state = collection_ref(&databases, document.collection())?;
        state.check_partition_key(document.id(), partition_key)?;
        state
            .documents
            .iter()
            .find(|d| document_id(d) == Some(document.id()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(document.to_string()))
    }

    async fn create_document(
        &self,
        collection: &CollectionLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        self.create_requests.fetch_add(1, Ordering::SeqCst);
        let id = document_id(&body)
            .ok_or_else(|| {
                StoreError::SerializationError("document has no string 'id' field".to_string())
            })?
            .to_string();
        let link = collection.document(id.as_str());

        let mut databases = self.databases.write().await;
        let state = collection_mut(&mut databases, collection)?;
        state.check_partition_key(&id, partition_key)?;
        if state.documents.iter().any(|d| document_id(d) == Some(id.as_str())) {
            return Err(conflict(&link.to_string()));
        }
        let receipt = new_receipt(&id, &link.to_string());
        state.documents.push(stamp(body, &receipt));
        Ok(receipt)
    }

    async fn replace_document(
        &self,
        document: &DocumentLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        let mut databases = self.databases.write().await;
        let state = collection_mut(&mut databases, document.collection())?;
        state.check_partition_key(document.id(), partition_key)?;
        let slot = state
            .documents
            .iter_mut()
            .find(|d| document_id(d) == Some(document.id()))
            .ok_or_else(|| StoreError::NotFound(document.to_string()))?;
        let receipt = new_receipt(document.id(), &document.to_string());
        *slot = stamp(body, &receipt);
        Ok(receipt)
    }

    async fn delete_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut databases = self.databases.write().await;
        let state = collection_mut(&mut databases, document.collection())?;
        state.check_partition_key(document.id(), partition_key)?;
        let position = state
            .documents
            .iter()
            .position(|d| document_id(d) == Some(document.id()))
            .ok_or_else(|| StoreError::NotFound(document.to_string()))?;
        state.documents.remove(position);
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &CollectionLink,
        filter: &Filter,
        continuation: Option<&str>,
    ) -> Result<FeedPage, StoreError> {
        filter.validate()?;
        self.query_requests.fetch_add(1, Ordering::SeqCst);

        let offset = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| invalid_continuation(token))?,
            None => 0,
        };

        let databases = self.databases.read().await;
        let matching: Vec<&Value> = collection_ref(&databases, collection)?
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .collect();

        // Tokens are offsets this store issued, so they never point past the feed.
        if offset > matching.len() {
            return Err(invalid_continuation(&offset.to_string()));
        }
        let end = offset.saturating_add(self.page_size).min(matching.len());
        let documents: Vec<Value> = matching[offset..end]
            .iter()
            .map(|d| (*d).clone())
            .collect();
        let continuation = (end < matching.len()).then(|| end.to_string());

        debug!(
            link = %collection,
            offset,
            count = documents.len(),
            "Served query page"
        );

        Ok(FeedPage {
            documents,
            continuation,
        })
    }
}
