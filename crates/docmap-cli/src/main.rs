//! docmap CLI - document mapping walkthrough
//!
//! Usage:
//!   docmap demo                         Run the walkthrough against MongoDB
//!   docmap demo --memory                Run it against the in-memory store
//!   docmap demo --persons 20 --seed 42  Bigger, reproducible mock data
//!   docmap schema                       Show collections and indexes
//!   docmap --config docmap.toml demo    Read settings from a TOML file

mod config;
mod demo;
mod people;
mod seed;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docmap_mongodb::{
    Connection, ConnectionEvent, ConnectionEvents, MemoryStore, MongoStore, Odm,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::DemoConfig;
use crate::demo::DemoOptions;

#[derive(Parser)]
#[command(name = "docmap")]
#[command(about = "Schema-driven document mapping walkthrough", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MongoDB connection string (overrides the config file)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Use the in-memory store instead of MongoDB
    #[arg(long, global = true)]
    memory: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed mock data and run every step of the walkthrough
    Demo {
        /// Number of mock persons
        #[arg(long)]
        persons: Option<usize>,

        /// Number of mock stories
        #[arg(long)]
        stories: Option<usize>,

        /// Seed for reproducible mock data
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the registered kinds with their collections and indexes
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DemoConfig::load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.database.url = url;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level)?;

    match cli.command {
        Commands::Demo {
            persons,
            stories,
            seed,
        } => {
            let options = DemoOptions {
                persons: persons.unwrap_or(config.seed.persons),
                stories: stories.unwrap_or(config.seed.stories),
                seed: seed.or(config.seed.rng_seed),
            };
            if cli.memory {
                let odm = Odm::with_store(MemoryStore::new());
                run_demo(&odm, options).await?;
            } else {
                let connection = connect(&config).await?;
                let odm = Odm::with_store(MongoStore::from_connection(&connection));
                let outcome = run_demo(&odm, options).await;
                connection.close().await;
                outcome?;
            }
        }
        Commands::Schema => show_schema()?,
    }

    Ok(())
}

async fn connect(config: &DemoConfig) -> Result<Connection> {
    let events = ConnectionEvents::default();
    let mut rx = events.subscribe();
    let url = config.database.url.clone();

    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                ConnectionEvent::Connected { database } => {
                    info!(%database, "Connection open")
                }
                ConnectionEvent::Error { message } => error!(%message, "Connection error"),
                ConnectionEvent::Disconnected { database } => {
                    warn!(%database, "Connection disconnected")
                }
            }
        }
    });

    Connection::connect(&url, config.database.pool_config(), events)
        .await
        .with_context(|| format!("Failed to connect to {}", url))
}

async fn run_demo(odm: &Odm, options: DemoOptions) -> Result<()> {
    let report = demo::run(odm, options).await?;
    info!(
        persons = report.persons_inserted,
        stories = report.stories_inserted,
        friends = report.friends_resolved,
        old_people = report.old_people,
        aggregated = report.aggregated,
        "Walkthrough finished"
    );
    Ok(())
}

fn show_schema() -> Result<()> {
    let odm = Odm::with_store(MemoryStore::new());
    people::register(&odm)?;

    for kind in odm.registry().kinds() {
        let model = odm.model(&kind)?;
        println!("{} -> {}", kind, model.collection());
        for field in model.schema().fields() {
            let required = if field.required { " (required)" } else { "" };
            println!("  {}: {}{}", field.name, field.field_type.type_name(), required);
        }
        for index in model.schema().index_specs() {
            println!("  index {}", index.key_document());
        }
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized

    Ok(())
}
