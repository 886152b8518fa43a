//! todo CLI: list, show, create, edit and delete to-do items. Connection
//! settings come from COSMOS_* environment variables.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docrepo::clients::{DocumentStore, MemoryStore};
use docrepo::core::config::{DEFAULT_OFFER_THROUGHPUT, StoreConfig};
use docrepo::core::models::Item;
use docrepo::query::{Filter, field};
use docrepo::repository::{DocumentRepository, Repository};
use tracing::error;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Manage to-do items stored in a document collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Use a throwaway in-memory store instead of COSMOS_* settings.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List items that are not completed (all items with --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Show one item.
    Show { id: String },
    /// Create an item; the id is generated unless given.
    Create {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Change fields of an existing item.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Delete an item.
    Delete { id: String },
}

#[derive(Args)]
struct ItemFields {
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    completed: Option<bool>,
}

impl ItemFields {
    fn apply(self, item: &mut Item) {
        if let Some(description) = self.description {
            item.description = Some(description);
        }
        if let Some(category) = self.category {
            item.category = Some(category);
        }
        if let Some(completed) = self.completed {
            item.completed = completed;
        }
    }
}

fn print_item(item: &Item) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

fn not_found(id: &str) -> ExitCode {
    eprintln!("item '{id}' not found");
    ExitCode::FAILURE
}

async fn run<S>(repo: DocumentRepository<Item, S>, command: Commands) -> Result<ExitCode>
where
    S: DocumentStore + ?Sized,
{
    match command {
        Commands::List { all } => {
            let filter = if all {
                Filter::All
            } else {
                field("completed").eq(false)
            };
            let items = repo.get_items(&filter).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Show { id } => {
            let Some(item) = repo.get_item(&id).await? else {
                return Ok(not_found(&id));
            };
            print_item(&item)?;
        }
        Commands::Create { id, name, fields } => {
            let mut item = Item::new(id.unwrap_or_else(|| Uuid::new_v4().to_string()), name);
            fields.apply(&mut item);
            repo.create_item(&item).await?;
            print_item(&item)?;
        }
        Commands::Edit { id, name, fields } => {
            let Some(mut item) = repo.get_item(&id).await? else {
                return Ok(not_found(&id));
            };
            if let Some(name) = name {
                item.name = name;
            }
            fields.apply(&mut item);
            repo.update_item(&id, &item).await?;
            print_item(&item)?;
        }
        Commands::Delete { id } => {
            if repo.get_item(&id).await?.is_none() {
                return Ok(not_found(&id));
            }
            repo.delete_item(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    docrepo::setup_logging();

    let cli = Cli::parse();

    let outcome = if cli.memory {
        let store = Arc::new(MemoryStore::new());
        let repo =
            DocumentRepository::with_store(store, "ToDoList", "Items", DEFAULT_OFFER_THROUGHPUT)
                .await?;
        run(repo, cli.command).await
    } else {
        let config = StoreConfig::from_env().context("loading store configuration")?;
        let repo = DocumentRepository::open(&config)
            .await
            .context("opening document repository")?;
        run(repo, cli.command).await
    };

    if let Err(e) = &outcome {
        error!("todo command failed: {:#}", e);
    }
    outcome
}
