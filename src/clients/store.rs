//! The outbound contract every document store client fulfils.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::links::{CollectionLink, DatabaseLink, DocumentLink};
use crate::core::models::StoreReceipt;
use crate::errors::StoreError;
use crate::query::filter::Filter;

/// One batch of a query feed.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub documents: Vec<Value>,
    /// Token for the next batch; `None` once the feed is exhausted.
    pub continuation: Option<String>,
}

/// Remote operations a repository needs from its store.
///
/// A missing database, collection or document is reported as
/// [`StoreError::NotFound`]; every other rejection is a
/// [`StoreError::StoreFailure`] or a transport error. Implementations are
/// shared between concurrent callers and must not keep per-call state.
///
/// Point operations take the document's partition key value, `None` for an
/// unpartitioned collection. The collection receipt's `partition_key`
/// describes which applies.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError>;

    async fn create_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError>;

    async fn read_collection(
        &self,
        collection: &CollectionLink,
    ) -> Result<StoreReceipt, StoreError>;

    async fn create_collection(
        &self,
        collection: &CollectionLink,
        offer_throughput: u32,
    ) -> Result<StoreReceipt, StoreError>;

    async fn read_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<Value, StoreError>;

    /// `body` must carry a string `id` field.
    async fn create_document(
        &self,
        collection: &CollectionLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError>;

    async fn replace_document(
        &self,
        document: &DocumentLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError>;

    async fn delete_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Fetches one page of documents matching `filter`, resuming from
    /// `continuation` when given.
    async fn query_documents(
        &self,
        collection: &CollectionLink,
        filter: &Filter,
        continuation: Option<&str>,
    ) -> Result<FeedPage, StoreError>;
}
