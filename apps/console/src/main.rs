use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shared::domain::{Document, Entity, EntityId, SyncStatus};
use store_rest::{load_settings, RestStore};
use store_sqlite::DocumentStore;
use sync_core::{CollectionSync, RemoteStoreAdapter, SyncOptions};
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    /// Which remote store backend to talk to.
    #[arg(long, value_enum, default_value_t = Backend::Sqlite)]
    backend: Backend,
    #[arg(long, default_value = "sqlite://console.db")]
    database_url: String,
    #[arg(long, default_value = "customers")]
    collection: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Sqlite,
    Rest,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert sample records through the regular add path.
    Seed {
        #[arg(default_value_t = 5)]
        count: usize,
    },
    /// Fetch and print every visible record.
    List,
    /// Add a record from a JSON object of fields.
    Add { fields: String },
    /// Merge a JSON object of fields into an existing record.
    Update { id: String, fields: String },
    Remove { id: String },
}

fn parse_fields(raw: &str) -> Result<Document> {
    serde_json::from_str(raw).context("fields must be a JSON object")
}

fn describe(entity: &Entity) -> String {
    let status = match &entity.status {
        SyncStatus::Confirmed => "confirmed",
        SyncStatus::PendingCreate => "pending-create",
        SyncStatus::PendingUpdate { .. } => "pending-update",
        SyncStatus::PendingDelete => "pending-delete",
    };
    format!(
        "{} [{}] {}",
        entity.id,
        status,
        serde_json::Value::Object(entity.fields.clone())
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let adapter: Arc<dyn RemoteStoreAdapter> = match cli.backend {
        Backend::Sqlite => {
            let store = DocumentStore::new(&cli.database_url).await?;
            Arc::new(store.collection(&cli.collection))
        }
        Backend::Rest => {
            let settings = load_settings();
            info!(base_url = %settings.base_url, "using rest backend");
            Arc::new(RestStore::new(&settings, &cli.collection)?)
        }
    };
    let sync = CollectionSync::new(adapter, SyncOptions::default());

    match cli.command {
        Command::Seed { count } => {
            let seeded = sync.seed_mock_entities(count).await?;
            for entity in &seeded {
                println!("{}", describe(entity));
            }
            println!("seeded {} records", seeded.len());
        }
        Command::List => {
            let entities = sync.fetch_all().await?;
            if sync.is_offline() {
                println!("(offline: showing cached state)");
            }
            for entity in &entities {
                println!("{}", describe(entity));
            }
            println!("{} records", entities.len());
        }
        Command::Add { fields } => {
            let entity = sync.add(parse_fields(&fields)?).await?;
            println!("{}", describe(&entity));
        }
        Command::Update { id, fields } => {
            let entity = sync
                .update(&EntityId::from(id), parse_fields(&fields)?)
                .await?;
            println!("{}", describe(&entity));
        }
        Command::Remove { id } => {
            sync.remove(&EntityId::from(id)).await?;
            println!("removed");
        }
    }

    Ok(())
}
