use crate::types::{Label, PipelineError, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Settings of the feed search API.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Maximum number of `from:<user>` clauses combined into one query
    #[serde(default = "default_user_filter_per_request")]
    pub user_filter_per_request: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            bearer_token: None,
            user_filter_per_request: default_user_filter_per_request(),
            max_pages: default_max_pages(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
        }
    }
}

/// Settings of the classification API and the ensemble.
#[derive(Debug, Clone, Deserialize)]
pub struct NlcConfig {
    #[serde(default = "default_nlc_base_url")]
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Ids of the trained classifiers forming the ensemble, in vote order
    pub classifiers: Vec<String>,
    /// Texts classified concurrently per block
    #[serde(default = "default_text_per_block")]
    pub text_per_block: usize,
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl NlcConfig {
    pub fn default_label(&self) -> Label {
        Label::new(self.default_label.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub feed: FeedConfig,
    pub nlc: NlcConfig,
    /// Postgres connection string; only needed when not running dry
    #[serde(default)]
    pub db: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Configuration {
    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Configuration = serde_json::from_str(raw)?;
        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.db = database_url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nlc.classifiers.is_empty() {
            return Err(PipelineError::Configuration(
                "nlc.classifiers must list at least one classifier".to_string(),
            ));
        }
        if self.nlc.text_per_block == 0 {
            return Err(PipelineError::Configuration(
                "nlc.text_per_block must be positive".to_string(),
            ));
        }
        if self.feed.user_filter_per_request == 0 {
            return Err(PipelineError::Configuration(
                "feed.user_filter_per_request must be positive".to_string(),
            ));
        }
        if self.feed.max_pages == 0 {
            return Err(PipelineError::Configuration(
                "feed.max_pages must be positive".to_string(),
            ));
        }
        self.tracing_level()?;
        Ok(())
    }

    /// Fail unless a database connection string is configured.
    pub fn require_database(&self) -> Result<&str> {
        let db = self.db.trim();
        if db.is_empty() {
            return Err(PipelineError::Configuration(
                "db connection string must not be empty".to_string(),
            ));
        }
        Ok(db)
    }

    /// `log_level` as a tracing level; accepts `WARNING` as an alias of `warn`.
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        let level = match self.log_level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            other => other.to_string(),
        };
        tracing::Level::from_str(&level).map_err(|_| {
            PipelineError::Configuration(format!("unknown log level {:?}", self.log_level))
        })
    }
}

fn default_user_filter_per_request() -> usize {
    20
}

fn default_max_pages() -> usize {
    10
}

fn default_user_agent() -> String {
    "Sentiment-Pipeline/1.0".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    1
}

fn default_nlc_base_url() -> String {
    "https://gateway.watsonplatform.net/natural-language-classifier".to_string()
}

fn default_text_per_block() -> usize {
    10
}

fn default_label() -> String {
    Label::NEUTRAL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
