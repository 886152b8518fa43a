use tracing::{debug, info};

use crate::clients::store::DocumentStore;
use crate::core::links::CollectionLink;
use crate::core::models::Partitioning;
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Existing,
    Created,
}

/// Result of [`StoreProvisioner::ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionedCollection {
    pub outcome: ProvisionOutcome,
    pub partitioning: Partitioning,
}

/// Makes sure the database and collection a repository addresses exist.
///
/// Existing resources are left untouched. Only a NotFound reply triggers a
/// create; every other failure is returned as is.
pub struct StoreProvisioner<'a, S: ?Sized> {
    store: &'a S,
    collection: &'a CollectionLink,
    offer_throughput: u32,
}

impl<'a, S> StoreProvisioner<'a, S>
where
    S: DocumentStore + ?Sized,
{
    #[must_use]
    pub fn new(store: &'a S, collection: &'a CollectionLink, offer_throughput: u32) -> Self {
        Self {
            store,
            collection,
            offer_throughput,
        }
    }

    /// # Errors
    ///
    /// Returns any read failure other than NotFound, or the create failure.
    pub async fn ensure_database(&self) -> Result<ProvisionOutcome, StoreError> {
        let database = self.collection.database();
        match self.store.read_database(database).await {
            Ok(_) => {
                debug!(database = %database, "Database already exists");
                Ok(ProvisionOutcome::Existing)
            }
            Err(e) if e.is_not_found() => {
                info!(database = %database, "Creating database");
                self.store.create_database(database).await?;
                Ok(ProvisionOutcome::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Must run after [`StoreProvisioner::ensure_database`] succeeded. An
    /// existing collection keeps whatever partitioning it was created with.
    ///
    /// # Errors
    ///
    /// Returns any read failure other than NotFound, or the create failure.
    /// Returns `ConfigurationError` if the existing collection is partitioned
    /// on a path other than `/id`.
    pub async fn ensure_collection(&self) -> Result<ProvisionedCollection, StoreError> {
        match self.store.read_collection(self.collection).await {
            Ok(receipt) => {
                let partitioning = Partitioning::from_definition(receipt.partition_key.as_ref())?;
                debug!(
                    collection = %self.collection,
                    partitioning = ?partitioning,
                    "Collection already exists"
                );
                Ok(ProvisionedCollection {
                    outcome: ProvisionOutcome::Existing,
                    partitioning,
                })
            }
            Err(e) if e.is_not_found() => {
                info!(
                    collection = %self.collection,
                    offer_throughput = self.offer_throughput,
                    "Creating collection"
                );
                self.store
                    .create_collection(self.collection, self.offer_throughput)
                    .await?;
                Ok(ProvisionedCollection {
                    outcome: ProvisionOutcome::Created,
                    partitioning: Partitioning::ById,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Database first, then collection.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step.
    pub async fn provision(&self) -> Result<Partitioning, StoreError> {
        self.ensure_database().await?;
        Ok(self.ensure_collection().await?.partitioning)
    }
}
