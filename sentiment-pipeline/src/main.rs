use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sentiment_pipeline::{
    Configuration, HttpFeedSource, IngestionPipeline, MemoryStore, PgStore, Store,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Topic sentiment ingestion", long_about = None)]
struct Cli {
    /// Path of the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Keep everything in memory instead of writing to the database
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one or more topic filters, one after another
    Ingest {
        #[arg(required = true)]
        filters: Vec<String>,
    },
    /// Follow the live feed for every named topic, ingesting items as they arrive
    IngestStream {
        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Ingest a topic filter, then print its sentiment shares as JSON
    Stats {
        filter: String,
        /// Window start, unix seconds
        #[arg(long)]
        from: i64,
        /// Window end, unix seconds
        #[arg(long)]
        to: i64,
        /// Leave neutral tweets out of the shares
        #[arg(long)]
        no_neutral: bool,
    },
    /// List known topics
    Topics,
    /// Apply database migrations and exit
    Migrate,
}

fn timestamp(seconds: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| anyhow!("timestamp {} out of range", seconds))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Configuration::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .init();

    let database = if cli.dry_run {
        info!("Dry run: nothing is written to the database");
        None
    } else {
        let store = PgStore::connect(config.require_database()?).await.map_err(|e| {
            error!("Failed to connect to the database, check the db setting");
            e
        })?;
        store.migrate().await?;
        Some(Arc::new(store))
    };
    let store: Arc<dyn Store> = match &database {
        Some(database) => database.clone() as Arc<dyn Store>,
        None => Arc::new(MemoryStore::new()),
    };

    let outcome = run(cli.command, &config, store).await;
    if let Some(database) = database {
        database.close().await;
    }
    outcome
}

async fn run(command: Command, config: &Configuration, store: Arc<dyn Store>) -> anyhow::Result<()> {
    match command {
        Command::Ingest { filters } => {
            let pipeline = IngestionPipeline::from_config(config, store)?;
            for filter in filters {
                let summary = pipeline.run(&filter).await?;
                println!("{}\t{}", summary.topic_id, filter);
            }
        }
        Command::IngestStream { limit } => {
            let pipeline = IngestionPipeline::from_config(config, store)?;
            let feed = HttpFeedSource::new(config.feed.clone())?;
            let summary = pipeline.ingest_stream(&feed, limit).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Stats {
            filter,
            from,
            to,
            no_neutral,
        } => {
            let pipeline = IngestionPipeline::from_config(config, store)?;
            let topic_id = pipeline.ingest(&filter).await?;
            let shares = pipeline
                .topic_shares(topic_id, timestamp(from)?, timestamp(to)?, no_neutral)
                .await?;
            println!("{}", serde_json::to_string_pretty(&shares)?);
        }
        Command::Topics => {
            for topic in store.list_topics().await? {
                println!(
                    "{}\t{}\t{}",
                    topic.id,
                    topic.name.as_deref().unwrap_or("-"),
                    topic.filter
                );
            }
        }
        Command::Migrate => {
            let counts = store.table_counts().await?;
            info!(
                "Schema ready: {} texts, {} tweets, {} topics, {} links",
                counts.texts, counts.tweets, counts.topics, counts.topic_links
            );
        }
    }
    Ok(())
}
