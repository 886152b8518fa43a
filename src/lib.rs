/// docrepo - a generic repository over a remote document store.
///
/// The crate keeps one collection of a Cosmos DB (SQL API) account behind a
/// typed repository:
/// 1. `DocumentRepository::open` validates the connection settings and makes
///    sure the database and collection exist, creating them only when the
///    store reports them missing
/// 2. The returned handle offers CRUD on any `StoreDocument` type plus
///    filtered queries that walk the store's paged result feed
///
/// # Architecture
///
/// The system uses:
/// - reqwest for the store's REST interface, signed with the account master key
/// - a `DocumentStore` trait so the repository runs against the remote store
///   or the in-memory `MemoryStore`
/// - explicit `Filter` expressions translated to the store's SQL dialect
/// - Tokio for async runtime
///
/// # Example
///
/// ```no_run
/// use docrepo::core::config::StoreConfig;
/// use docrepo::core::models::Item;
/// use docrepo::query::field;
/// use docrepo::repository::{DocumentRepository, Repository};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     docrepo::setup_logging();
///
///     let config = StoreConfig::new(
///         "https://localhost:8081/",
///         "c2VjcmV0LWtleQ==",
///         "ToDoList",
///         "Items",
///     );
///
///     let repo: DocumentRepository<Item> = DocumentRepository::open(&config).await?;
///
///     repo.create_item(&Item::new("1", "Write the report")).await?;
///     let open_items = repo.get_items(&field("completed").eq(false)).await?;
///     println!("{} open items", open_items.len());
///
///     if repo.get_item("missing").await?.is_none() {
///         println!("no such item");
///     }
///
///     Ok(())
/// }
/// ```
// Module declarations
pub mod clients;
pub mod core;
pub mod errors;
pub mod query;
pub mod repository;

pub use errors::StoreError;

/// Configure structured logging with JSON format.
///
/// This function sets up tracing-subscriber with a JSON formatter. Call it
/// once at process start; later calls are ignored.
///
/// # Example
///
/// ```
/// docrepo::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}
