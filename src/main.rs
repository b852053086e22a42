use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use disaster_watch::bluesky::{BlueskyClient, PostSource};
use disaster_watch::classify::{OnnxRelevanceClassifier, RelevanceClassifier};
use disaster_watch::config::Config;
use disaster_watch::db::RecordStore;
use disaster_watch::geo::{GeoResolver, NominatimResolver};
use disaster_watch::nlp::download::{classifier_model_dir, ner_model_dir};
use disaster_watch::nlp::{EntityLocator, OnnxEntityLocator};
use disaster_watch::output::terminal;
use disaster_watch::pipeline::{Coordinator, IngestionCycle, ScoringCycle};

/// disaster-watch: harvest, geolocate and classify disaster reports on Bluesky.
///
/// Searches recent posts for disaster keywords, resolves the places they
/// mention, and keeps the ones a local relevance model says are real reports.
#[derive(Parser)]
#[command(name = "disaster-watch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the database
    Init,

    /// Run ingestion and scoring continuously until Ctrl-C
    Run,

    /// Run a single ingestion pass over every keyword
    Ingest,

    /// Run a single scoring pass over every unscored record
    Score,

    /// Show record counts and sample rows
    Status,

    /// Delete stored records carrying the irrelevant label
    Prune,

    /// Download the NER and relevance-classifier ONNX models
    DownloadModel,

    /// Run the pipeline and serve the read-only JSON API
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("disaster_watch=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing disaster-watch database...");
            let config = Config::load()?;
            let store = init_database(&config).await?;
            let table_count = store.table_count().await?;
            if config.uses_postgres() {
                println!("Database initialized on PostgreSQL");
            } else {
                println!("Database initialized at: {}", config.db_path);
            }
            println!("Tables created: {table_count}");
            println!("\nNext: run `disaster-watch download-model`, then `disaster-watch run`.");
        }

        Commands::Run => {
            let config = Config::load()?;
            config.require_keywords()?;
            let store = init_database(&config).await?;
            let coordinator = build_coordinator(&config, store)?;

            println!(
                "Watching {} keywords. Press Ctrl-C to stop after the current pass.",
                config.keywords.len()
            );
            coordinator.run(shutdown_on_ctrl_c()).await?;
        }

        Commands::Ingest => {
            let config = Config::load()?;
            config.require_keywords()?;
            let store = init_database(&config).await?;
            let cycle = build_ingestion(&config, store)?;

            println!("Searching {} keywords...", config.keywords.len());
            let report = cycle.run_pass().await;
            terminal::display_ingest_report(&report);
        }

        Commands::Score => {
            let config = Config::load()?;
            let store = open_database(&config).await?;
            let cycle = ScoringCycle::new(store, load_classifier(&config));

            let outcome = cycle.run_pass().await?;
            terminal::display_scoring_outcome(&outcome);
        }

        Commands::Status => {
            let config = Config::load()?;
            let store = open_database(&config).await?;
            let db_file = (!config.uses_postgres()).then_some(config.db_path.as_str());
            disaster_watch::status::show(&store, db_file).await?;
        }

        Commands::Prune => {
            let config = Config::load()?;
            let store = open_database(&config).await?;
            let deleted = store.delete_irrelevant().await?;
            println!("Deleted {deleted} irrelevant records.");
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX models...");
            println!("  Destination: {}", model_dir.display());

            disaster_watch::nlp::download::download_models(model_dir, config.model_url.as_deref())
                .await?;

            match config.require_models() {
                Ok(()) => {
                    println!("\n{}", "Models ready.".bold());
                    println!("You can now run `disaster-watch run`.");
                }
                Err(e) => println!("\n{} {}", "Warning:".yellow(), e),
            }
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            config.require_keywords()?;
            let store = init_database(&config).await?;
            let coordinator = build_coordinator(&config, Arc::clone(&store))?;

            let state = disaster_watch::web::AppState {
                store,
                latch: coordinator.latch(),
                keywords: Arc::new(config.keywords.clone()),
            };

            let shutdown = shutdown_on_ctrl_c();
            tokio::try_join!(
                coordinator.run(shutdown.clone()),
                disaster_watch::web::run_server(state, &config.web_origin, &bind, port, shutdown),
            )?;
        }
    }

    Ok(())
}

/// Flip to `true` on the first Ctrl-C. Loops finish their current pass and exit.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current pass");
            let _ = tx.send(true);
        }
    });
    rx
}

fn build_coordinator(config: &Config, store: Arc<dyn RecordStore>) -> Result<Coordinator> {
    let ingest = build_ingestion(config, Arc::clone(&store))?;
    let score = ScoringCycle::new(store, load_classifier(config));
    Ok(Coordinator::new(ingest, score, config.cycle_policy()))
}

fn build_ingestion(config: &Config, store: Arc<dyn RecordStore>) -> Result<IngestionCycle> {
    let client = BlueskyClient::new(&config.public_api_url, &config.pds_url)?
        .with_credentials(&config.bluesky_handle, &config.bluesky_app_password);
    if client.has_credentials() {
        info!(handle = %config.bluesky_handle, "Searching with an app-password session");
    }
    let source: Arc<dyn PostSource> = Arc::new(client);

    let geocoder: Arc<dyn GeoResolver> =
        Arc::new(NominatimResolver::new(&config.nominatim_url, &config.geo_country)?);

    Ok(IngestionCycle::new(
        source,
        load_locator(config),
        geocoder,
        store,
        config.ingest_settings(),
    ))
}

/// Load the NER model, or carry on without locations if it can't be loaded.
fn load_locator(config: &Config) -> Option<Arc<dyn EntityLocator>> {
    match OnnxEntityLocator::load(&ner_model_dir(&config.model_dir)) {
        Ok(locator) => Some(Arc::new(locator) as Arc<dyn EntityLocator>),
        Err(e) => {
            warn!(error = %e, "NER model unavailable, records will be stored without locations");
            None
        }
    }
}

/// Load the relevance classifier, or leave scoring disabled if it can't be loaded.
fn load_classifier(config: &Config) -> Option<Arc<dyn RelevanceClassifier>> {
    match OnnxRelevanceClassifier::load(&classifier_model_dir(&config.model_dir)) {
        Ok(classifier) => Some(Arc::new(classifier) as Arc<dyn RelevanceClassifier>),
        Err(e) => {
            warn!(error = %e, "Relevance classifier unavailable, scoring is disabled");
            None
        }
    }
}

/// Open the configured database backend (PostgreSQL or SQLite).
async fn open_database(config: &Config) -> Result<Arc<dyn RecordStore>> {
    if let Some(ref url) = config.database_url {
        if config.uses_postgres() {
            #[cfg(feature = "postgres")]
            {
                info!("Using PostgreSQL backend");
                return disaster_watch::db::connect_postgres(url).await;
            }
            #[cfg(not(feature = "postgres"))]
            {
                let _ = url;
                anyhow::bail!(
                    "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
                     Rebuild with: cargo build --features postgres"
                );
            }
        }
    }
    disaster_watch::db::open_sqlite(&config.db_path)
}

/// Initialize the database (create if needed).
async fn init_database(config: &Config) -> Result<Arc<dyn RecordStore>> {
    if config.uses_postgres() {
        // Postgres migrations run on every connect
        return open_database(config).await;
    }
    disaster_watch::db::initialize_sqlite(&config.db_path)
}
