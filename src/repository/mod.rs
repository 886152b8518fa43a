pub mod document_repository;
pub mod provisioner;

pub use document_repository::{DocumentRepository, Repository};
pub use provisioner::{ProvisionOutcome, ProvisionedCollection, StoreProvisioner};
