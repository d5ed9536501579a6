use std::fmt;

// Use the interfaces crate for core types
pub use interfaces::defs::{
    Author, AuthorId, Item, Label, NewTweet, RawItem, SentimentCounts, TableCounts, Text, TextId,
    Topic, TopicId, TweetId, TweetRecord,
};

/// Placeholder inside a topic filter that expands to one clause per stored author.
pub const FROM_USERS_PLACEHOLDER: &str = "$FROM_USERS$";

/// Number of agreeing ensemble votes needed to accept the majority label.
pub const ENSEMBLE_QUORUM: usize = 2;

/// Ingestion stage reported alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Whitelist,
    Retrieve,
    StoreTexts,
    StoreTweets,
    Classify,
    StoreLabels,
    LinkTopics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Whitelist => "whitelist",
            Stage::Retrieve => "retrieve",
            Stage::StoreTexts => "store_texts",
            Stage::StoreTweets => "store_tweets",
            Stage::Classify => "classify",
            Stage::StoreLabels => "store_labels",
            Stage::LinkTopics => "link_topics",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Backend returned status {status} with body {body}")]
    Backend { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ingestion failed at stage {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// The error without any stage annotations.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage that failed, when the error came out of an ingestion run.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// True for classification or feed API failures, whether the request
    /// never completed or came back with a non-success status.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::Backend { .. } | PipelineError::Http(_)
        )
    }

    fn at(self, stage: Stage) -> Self {
        match self {
            already @ PipelineError::Stage { .. } => already,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Tag a failure with the ingestion stage it happened in.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.at(stage))
    }
}
