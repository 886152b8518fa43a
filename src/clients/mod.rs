//! Store clients: the outbound contract and its implementations

pub mod cosmos_client;
pub mod memory_store;
pub mod signature;
pub mod store;

pub use cosmos_client::CosmosClient;
pub use memory_store::MemoryStore;
pub use store::{DocumentStore, FeedPage};
