use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::provisioner::StoreProvisioner;
use crate::clients::cosmos_client::CosmosClient;
use crate::clients::store::DocumentStore;
use crate::core::config::{StoreConfig, validate_resource_id};
use crate::core::links::CollectionLink;
use crate::core::models::{Partitioning, StoreDocument, StoreReceipt};
use crate::errors::StoreError;
use crate::query::feed::DocumentQuery;
use crate::query::filter::Filter;

/// Typed CRUD and filtered retrieval over one collection.
#[async_trait]
pub trait Repository<T: StoreDocument>: Send + Sync {
    /// `Ok(None)` when the store has no document with this id.
    async fn get_item(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Every document matching `filter`, across all feed pages.
    async fn get_items(&self, filter: &Filter) -> Result<Vec<T>, StoreError>;

    async fn create_item(&self, item: &T) -> Result<StoreReceipt, StoreError>;

    /// Replaces the document at `id` wholesale. `id` must equal `item.id()`.
    async fn update_item(&self, id: &str, item: &T) -> Result<StoreReceipt, StoreError>;

    /// Deleting an id that does not exist succeeds.
    async fn delete_item(&self, id: &str) -> Result<(), StoreError>;
}

/// Repository bound to a provisioned collection.
///
/// Obtain one through [`DocumentRepository::open`] (remote store) or
/// [`DocumentRepository::with_store`] (any [`DocumentStore`]); both provision
/// the database and collection before returning, so a handle always addresses
/// existing resources. Clones share the same store client.
pub struct DocumentRepository<T, S: ?Sized = CosmosClient> {
    store: Arc<S>,
    collection: CollectionLink,
    partitioning: Partitioning,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: ?Sized> Clone for DocumentRepository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            partitioning: self.partitioning,
            _marker: PhantomData,
        }
    }
}

impl<T: StoreDocument> DocumentRepository<T, CosmosClient> {
    /// Validates `config`, connects, and provisions the configured database
    /// and collection.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for invalid settings and any provisioning
    /// failure unchanged.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let client = CosmosClient::new(config)?;
        info!(
            endpoint = %client.endpoint(),
            database = %config.database,
            collection = %config.collection,
            "Opening document repository"
        );
        Self::with_store(
            Arc::new(client),
            &config.database,
            &config.collection,
            config.offer_throughput,
        )
        .await
    }
}

impl<T, S> DocumentRepository<T, S>
where
    T: StoreDocument,
    S: DocumentStore + ?Sized,
{
    /// # Errors
    ///
    /// Returns `ConfigurationError` for blank ids or ids with characters the
    /// store refuses, and any provisioning failure unchanged.
    pub async fn with_store(
        store: Arc<S>,
        database: &str,
        collection: &str,
        offer_throughput: u32,
    ) -> Result<Self, StoreError> {
        validate_resource_id("database", database)?;
        validate_resource_id("collection", collection)?;

        let collection = CollectionLink::new(database, collection);
        let partitioning = StoreProvisioner::new(store.as_ref(), &collection, offer_throughput)
            .provision()
            .await?;

        Ok(Self {
            store,
            collection,
            partitioning,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn collection(&self) -> &CollectionLink {
        &self.collection
    }

    /// Partitioning of the collection as found or created at construction.
    #[must_use]
    pub fn partitioning(&self) -> Partitioning {
        self.partitioning
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// A lazily executed feed over the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError` if the filter cannot be translated; no request is
    /// made in that case.
    pub fn query(&self, filter: Filter) -> Result<DocumentQuery<T, S>, StoreError> {
        filter.validate()?;
        Ok(DocumentQuery::new(
            Arc::clone(&self.store),
            self.collection.clone(),
            filter,
        ))
    }

    fn to_body(item: &T) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(item)?)
    }
}

#[async_trait]
impl<T, S> Repository<T> for DocumentRepository<T, S>
where
    T: StoreDocument,
    S: DocumentStore + ?Sized,
{
    async fn get_item(&self, id: &str) -> Result<Option<T>, StoreError> {
        let link = self.collection.document(id);
        match self
            .store
            .read_document(&link, self.partitioning.key_for(id))
            .await
        {
            Ok(body) => Ok(Some(serde_json::from_value(body)?)),
            Err(e) if e.is_not_found() => {
                debug!(document = %link, "Document not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_items(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let query = self.query(filter.clone())?;
        let items = query.collect_all().await?;
        debug!(
            collection = %self.collection,
            count = items.len(),
            "Collected query results"
        );
        Ok(items)
    }

    async fn create_item(&self, item: &T) -> Result<StoreReceipt, StoreError> {
        let receipt = self
            .store
            .create_document(
                &self.collection,
                Self::to_body(item)?,
                self.partitioning.key_for(item.id()),
            )
            .await?;
        debug!(collection = %self.collection, id = %receipt.id, "Created document");
        Ok(receipt)
    }

    async fn update_item(&self, id: &str, item: &T) -> Result<StoreReceipt, StoreError> {
        if item.id() != id {
            return Err(StoreError::IdentifierMismatch {
                addressed: id.to_string(),
                embedded: item.id().to_string(),
            });
        }
        let link = self.collection.document(id);
        let receipt = self
            .store
            .replace_document(&link, Self::to_body(item)?, self.partitioning.key_for(id))
            .await?;
        debug!(document = %link, "Replaced document");
        Ok(receipt)
    }

    async fn delete_item(&self, id: &str) -> Result<(), StoreError> {
        let link = self.collection.document(id);
        match self
            .store
            .delete_document(&link, self.partitioning.key_for(id))
            .await
        {
            Ok(()) => {
                debug!(document = %link, "Deleted document");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(document = %link, "Delete of missing document ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
