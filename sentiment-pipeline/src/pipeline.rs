use crate::classifier::NlcClient;
use crate::cleaner::clean;
use crate::config::Configuration;
use crate::ensemble::EnsembleClassifier;
use crate::retrieval::{author_filters, RetrievalScheduler};
use crate::scheduler::ClassificationScheduler;
use crate::sources::HttpFeedSource;
use crate::stats::SentimentShares;
use crate::topics::{match_key, matched_topics, strip_whitelisted};
use crate::traits::{
    AlreadySeen, ClassificationBackend, ClassifierConnection, FeedSource, LiveFeed, Store,
};
use crate::types::{
    Item, Label, NewTweet, PipelineError, Result, Stage, StageExt, TextId, Topic, TopicId,
    TweetId, FROM_USERS_PLACEHOLDER,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Block sizes bounding the fan-out of one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Texts classified concurrently
    pub classify_block_size: usize,
    /// Author clauses per retrieval query
    pub retrieve_block_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_block_size: 10,
            retrieve_block_size: 20,
        }
    }
}

impl From<&Configuration> for PipelineConfig {
    fn from(config: &Configuration) -> Self {
        Self {
            classify_block_size: config.nlc.text_per_block,
            retrieve_block_size: config.feed.user_filter_per_request,
        }
    }
}

/// What one ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub topic_id: TopicId,
    pub items_retrieved: usize,
    pub items_kept: usize,
    pub distinct_texts: usize,
    pub tweets_stored: usize,
    pub texts_classified: usize,
    pub topic_links: usize,
}

/// What one live ingestion did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub items_received: usize,
    pub items_kept: usize,
    pub tweets_stored: usize,
    pub texts_classified: usize,
    pub topic_links: usize,
}

/// Topic ids keyed by the text a mention has to contain.
fn group_by_match_key(topics: &[Topic]) -> BTreeMap<String, Vec<TopicId>> {
    let mut grouped: BTreeMap<String, Vec<TopicId>> = BTreeMap::new();
    for topic in topics {
        grouped
            .entry(match_key(&topic.filter))
            .or_default()
            .push(topic.id);
    }
    grouped
}

/// A page is "already seen" when every text on it has a stored label.
struct LabeledInStore<'a> {
    store: &'a dyn Store,
}

#[async_trait]
impl AlreadySeen for LabeledInStore<'_> {
    async fn already_seen(&self, clean_texts: &[String]) -> Result<bool> {
        self.store.all_already_labeled(clean_texts).await
    }
}

/// Retrieves, stores, classifies and links the items of a topic.
///
/// Runs are idempotent rather than transactional: a failed run keeps what it
/// already wrote, and running it again converges.
pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    retrieval: RetrievalScheduler,
    classification: ClassificationScheduler,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn FeedSource>,
        backend: Arc<dyn ClassificationBackend>,
        ensemble: EnsembleClassifier,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            retrieval: RetrievalScheduler::new(source),
            classification: ClassificationScheduler::new(backend, ensemble),
            config,
        }
    }

    /// Wire the HTTP feed source and classifier described by `config`.
    pub fn from_config(config: &Configuration, store: Arc<dyn Store>) -> Result<Self> {
        let source = Arc::new(HttpFeedSource::new(config.feed.clone())?);
        let backend = Arc::new(NlcClient::new(&config.nlc)?);
        let ensemble =
            EnsembleClassifier::new(config.nlc.classifiers.clone(), config.nlc.default_label())?;
        Ok(Self::new(
            store,
            source,
            backend,
            ensemble,
            PipelineConfig::from(config),
        ))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Ingest everything matching `topic_filter` and return the topic id.
    pub async fn ingest(&self, topic_filter: &str) -> Result<TopicId> {
        Ok(self.run(topic_filter).await?.topic_id)
    }

    /// Like [`ingest`](Self::ingest), reporting what the run did.
    pub async fn run(&self, topic_filter: &str) -> Result<IngestSummary> {
        let span = info_span!("ingest", run_id = %Uuid::new_v4(), filter = %topic_filter);
        self.run_steps(topic_filter).instrument(span).await
    }

    async fn run_steps(&self, topic_filter: &str) -> Result<IngestSummary> {
        if topic_filter.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "topic filter must not be empty".to_string(),
            ));
        }
        let mut summary = IngestSummary::default();

        // 1. retrieve
        let whitelist = self
            .store
            .list_whitelist_tags()
            .await
            .stage(Stage::Whitelist)?;
        let cleaner = move |raw: &str| clean(&strip_whitelisted(raw, &whitelist));

        let sub_filters = if topic_filter.contains(FROM_USERS_PLACEHOLDER) {
            let authors = self.store.list_authors().await.stage(Stage::Retrieve)?;
            Some(author_filters(&authors))
        } else {
            None
        };
        let predicate = LabeledInStore {
            store: self.store.as_ref(),
        };
        let items = self
            .retrieval
            .retrieve_by_filter(
                topic_filter,
                sub_filters.as_deref(),
                self.config.retrieve_block_size,
                &predicate,
                &cleaner,
            )
            .await
            .stage(Stage::Retrieve)?;
        summary.items_retrieved = items.len();

        // 2. drop items without meaningful text
        let items: Vec<Item> = items.into_iter().filter(Item::is_meaningful).collect();
        summary.items_kept = items.len();

        // 3. store-or-find texts
        let mut seen = HashSet::new();
        let distinct: Vec<String> = items
            .iter()
            .filter(|item| seen.insert(item.clean_text.as_str()))
            .map(|item| item.clean_text.clone())
            .collect();
        summary.distinct_texts = distinct.len();

        self.store
            .insert_texts_if_absent(&distinct)
            .await
            .stage(Stage::StoreTexts)?;
        let text_ids = self
            .store
            .find_text_ids(&distinct)
            .await
            .stage(Stage::StoreTexts)?;

        // 4. tweets
        let new_tweets = items
            .iter()
            .map(|item| {
                let text_id = text_ids.get(&item.clean_text).copied().ok_or_else(|| {
                    PipelineError::Store(format!("text {:?} missing after insert", item.clean_text))
                })?;
                Ok(NewTweet {
                    text_id,
                    author_id: item.raw.author_id,
                    created_at: item.raw.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()
            .stage(Stage::StoreTweets)?;
        let tweet_ids = self
            .store
            .insert_tweets(&new_tweets)
            .await
            .and_then(|ids| {
                if ids.len() == new_tweets.len() {
                    Ok(ids)
                } else {
                    Err(PipelineError::Store(format!(
                        "stored {} tweets but got {} ids",
                        new_tweets.len(),
                        ids.len()
                    )))
                }
            })
            .stage(Stage::StoreTweets)?;
        summary.tweets_stored = tweet_ids.len();

        // 5. classify texts nobody labeled yet
        let unlabeled = self
            .store
            .unlabeled_texts(&distinct)
            .await
            .stage(Stage::Classify)?;
        let labels = self
            .classification
            .classify_all(&unlabeled, self.config.classify_block_size)
            .await
            .stage(Stage::Classify)?;
        summary.texts_classified = labels.len();

        // 6. persist labels
        let by_id: HashMap<TextId, Label> = labels
            .into_iter()
            .filter_map(|(text, label)| text_ids.get(&text).map(|id| (*id, label)))
            .collect();
        self.store
            .update_labels(&by_id)
            .await
            .stage(Stage::StoreLabels)?;

        // 7. topic links
        let topic_id = self
            .store
            .find_or_create_topic(topic_filter)
            .await
            .stage(Stage::LinkTopics)?;
        summary.topic_id = topic_id;

        let topics = self.store.list_topics().await.stage(Stage::LinkTopics)?;
        let topics_by_key = group_by_match_key(&topics);
        for (item, tweet_id) in items.iter().zip(&tweet_ids) {
            summary.topic_links += self
                .link_mentions(&item.raw.text, *tweet_id, &topics_by_key)
                .await?;
        }
        debug!("Linked {} topic mentions", summary.topic_links);

        info!(
            "Ingested topic {}: {} items retrieved, {} kept, {} distinct texts, {} newly classified",
            topic_id,
            summary.items_retrieved,
            summary.items_kept,
            summary.distinct_texts,
            summary.texts_classified
        );
        Ok(summary)
    }

    /// Link `tweet_id` to every topic its raw text mentions.
    async fn link_mentions(
        &self,
        text: &str,
        tweet_id: TweetId,
        topics_by_key: &BTreeMap<String, Vec<TopicId>>,
    ) -> Result<usize> {
        let mut links = 0;
        for key in matched_topics(text, topics_by_key.keys()) {
            for topic_id in &topics_by_key[&key] {
                self.store
                    .link_topic_tweet(*topic_id, tweet_id)
                    .await
                    .stage(Stage::LinkTopics)?;
                links += 1;
            }
        }
        Ok(links)
    }

    /// Ingest items from a live feed as they are posted, tracking every named
    /// topic.
    ///
    /// Each meaningful item is stored and linked on arrival, and its text is
    /// classified right away unless it already has a label. The run ends when
    /// the feed closes the stream, after `limit` items, or at the first
    /// failure. One classifier connection serves the whole run.
    pub async fn ingest_stream(
        &self,
        feed: &dyn LiveFeed,
        limit: Option<usize>,
    ) -> Result<StreamSummary> {
        let span = info_span!("ingest_stream", run_id = %Uuid::new_v4());
        self.stream_steps(feed, limit).instrument(span).await
    }

    async fn stream_steps(
        &self,
        feed: &dyn LiveFeed,
        limit: Option<usize>,
    ) -> Result<StreamSummary> {
        let whitelist = self
            .store
            .list_whitelist_tags()
            .await
            .stage(Stage::Whitelist)?;
        let topics = self.store.list_topics().await.stage(Stage::LinkTopics)?;
        let topics_by_key = group_by_match_key(&topics);
        let track: Vec<String> = topics
            .iter()
            .filter(|topic| topic.name.is_some())
            .map(|topic| match_key(&topic.filter))
            .filter(|key| !key.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if track.is_empty() {
            return Err(PipelineError::Configuration(
                "no named topics to track".to_string(),
            ));
        }

        let connection = self.classification.connect().await.stage(Stage::Classify)?;
        let mut items = feed.stream(&track).await.stage(Stage::Retrieve)?;
        info!("Tracking {} topics on {}", track.len(), feed.source_name());

        let mut summary = StreamSummary::default();
        loop {
            if limit.is_some_and(|limit| summary.items_received >= limit) {
                break;
            }
            let Some(raw) = items.next().await else {
                break;
            };
            let raw = raw.stage(Stage::Retrieve)?;
            summary.items_received += 1;

            let clean_text = clean(&strip_whitelisted(&raw.text, &whitelist));
            let item = Item { raw, clean_text };
            if !item.is_meaningful() {
                continue;
            }
            summary.items_kept += 1;
            self.ingest_live_item(&item, &topics_by_key, connection.as_ref(), &mut summary)
                .await?;
        }

        info!(
            "Stream ended: {} items received, {} stored, {} newly classified",
            summary.items_received, summary.tweets_stored, summary.texts_classified
        );
        Ok(summary)
    }

    async fn ingest_live_item(
        &self,
        item: &Item,
        topics_by_key: &BTreeMap<String, Vec<TopicId>>,
        connection: &dyn ClassifierConnection,
        summary: &mut StreamSummary,
    ) -> Result<()> {
        let texts = vec![item.clean_text.clone()];
        self.store
            .insert_texts_if_absent(&texts)
            .await
            .stage(Stage::StoreTexts)?;
        let text_id = self
            .store
            .find_text_ids(&texts)
            .await
            .and_then(|ids| {
                ids.get(&item.clean_text).copied().ok_or_else(|| {
                    PipelineError::Store(format!("text {:?} missing after insert", item.clean_text))
                })
            })
            .stage(Stage::StoreTexts)?;

        let tweet = NewTweet {
            text_id,
            author_id: item.raw.author_id,
            created_at: item.raw.created_at,
        };
        let tweet_id = self
            .store
            .insert_tweets(std::slice::from_ref(&tweet))
            .await
            .and_then(|ids| {
                ids.first().copied().ok_or_else(|| {
                    PipelineError::Store("stored a tweet but got no id".to_string())
                })
            })
            .stage(Stage::StoreTweets)?;
        summary.tweets_stored += 1;
        debug!("Stored live tweet {}", tweet_id);

        summary.topic_links += self
            .link_mentions(&item.raw.text, tweet_id, topics_by_key)
            .await?;

        let unlabeled = self
            .store
            .unlabeled_texts(&texts)
            .await
            .stage(Stage::Classify)?;
        if unlabeled.is_empty() {
            return Ok(());
        }
        let label = self
            .classification
            .ensemble()
            .classify_one(connection, &item.clean_text)
            .await
            .stage(Stage::Classify)?;
        debug!("Tweet {} has text {} classified as {}", tweet_id, text_id, label);
        self.store
            .update_labels(&HashMap::from([(text_id, label)]))
            .await
            .stage(Stage::StoreLabels)?;
        summary.texts_classified += 1;
        Ok(())
    }

    /// Sentiment shares of a topic inside `[from, to]`.
    pub async fn topic_shares(
        &self,
        topic_id: TopicId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_neutral: bool,
    ) -> Result<SentimentShares> {
        if to < from {
            return Err(PipelineError::Configuration(
                "statistics window ends before it starts".to_string(),
            ));
        }
        let counts = self.store.topic_counts(topic_id, from, to).await?;
        Ok(SentimentShares::from_counts(counts, exclude_neutral))
    }
}
