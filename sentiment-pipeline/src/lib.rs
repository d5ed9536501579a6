pub mod types;
pub mod traits;
pub mod config;
pub mod cleaner;
pub mod topics;
pub mod vote;
pub mod classifier;
pub mod ensemble;
pub mod scheduler;
pub mod retrieval;
pub mod sources;
pub mod store;
pub mod stats;
pub mod pipeline;

pub use types::*;
pub use traits::{
    AlreadySeen, Classification, ClassificationBackend, ClassifierConnection, EarlyStop,
    FeedSource, ItemStream, LiveFeed, Store,
};
pub use config::{Configuration, FeedConfig, NlcConfig};
pub use classifier::NlcClient;
pub use ensemble::EnsembleClassifier;
pub use scheduler::ClassificationScheduler;
pub use retrieval::RetrievalScheduler;
pub use sources::HttpFeedSource;
pub use store::{MemoryStore, PgStore};
pub use stats::SentimentShares;
pub use pipeline::{IngestSummary, IngestionPipeline, PipelineConfig, StreamSummary};
