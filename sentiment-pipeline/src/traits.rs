use crate::types::{
    Author, Label, NewTweet, RawItem, Result, SentimentCounts, TableCounts, TextId, Topic,
    TopicId, TweetId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Decides, page by page, whether a feed source may stop paginating.
#[async_trait]
pub trait EarlyStop: Send + Sync {
    async fn should_stop(&self, page: &[RawItem]) -> Result<bool>;
}

/// Predicate over the canonical texts of one retrieved page.
#[async_trait]
pub trait AlreadySeen: Send + Sync {
    async fn already_seen(&self, clean_texts: &[String]) -> Result<bool>;
}

/// Trait for pulling items matching a filter expression from a feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch every item matching `filter`.
    /// Implementations call `early_stop` once per page and stop paginating
    /// as soon as it answers `true`.
    async fn retrieve(&self, filter: &str, early_stop: &dyn EarlyStop) -> Result<Vec<RawItem>>;
}

/// Items pushed by a feed as they are posted.
pub type ItemStream = BoxStream<'static, Result<RawItem>>;

/// Live feed delivering new items matching any of the tracked terms.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    fn source_name(&self) -> String;

    /// Open the stream. It ends when the feed closes it; dropping it
    /// disconnects.
    async fn stream(&self, track: &[String]) -> Result<ItemStream>;
}

/// Result of one backend classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub top_label: Label,
    pub confidences: Vec<(Label, f64)>,
}

/// A classification backend hosting several independently trained models.
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    fn backend_name(&self) -> String;

    /// Open a connection. It is released when the returned value is dropped.
    async fn connect(&self) -> Result<Box<dyn ClassifierConnection>>;
}

#[async_trait]
pub trait ClassifierConnection: Send + Sync {
    /// Classify `text` with the model identified by `backend_id`.
    async fn classify(&self, backend_id: &str, text: &str) -> Result<Classification>;
}

/// Durable storage for texts, tweets, topics and their links.
///
/// Every method is atomic on its own; callers never get a transaction that
/// spans several calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert texts, silently skipping those already present.
    async fn insert_texts_if_absent(&self, texts: &[String]) -> Result<()>;

    async fn find_text_ids(&self, texts: &[String]) -> Result<HashMap<String, TextId>>;

    /// Subset of `texts` that is stored but has no label yet.
    async fn unlabeled_texts(&self, texts: &[String]) -> Result<Vec<String>>;

    /// Insert tweets and return their ids in input order. A tweet identical
    /// to a stored one (same text, author and time) yields the stored id.
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<TweetId>>;

    /// Write labels for texts that do not have one yet.
    async fn update_labels(&self, labels: &HashMap<TextId, Label>) -> Result<()>;

    async fn find_or_create_topic(&self, filter: &str) -> Result<TopicId>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;

    /// Idempotent: linking the same pair twice stores one link.
    async fn link_topic_tweet(&self, topic_id: TopicId, tweet_id: TweetId) -> Result<()>;

    /// True iff every given text is stored and labeled.
    async fn all_already_labeled(&self, texts: &[String]) -> Result<bool>;

    async fn list_whitelist_tags(&self) -> Result<Vec<String>>;

    async fn list_authors(&self) -> Result<Vec<Author>>;

    /// Author-weighted label counts of tweets linked to `topic_id` inside
    /// `[from, to]`.
    async fn topic_counts(
        &self,
        topic_id: TopicId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SentimentCounts>;

    async fn table_counts(&self) -> Result<TableCounts>;
}
