use crate::traits::Store;
use crate::types::{
    Author, Label, NewTweet, Result, SentimentCounts, TableCounts, Text, TextId, Topic, TopicId,
    TweetId, TweetRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    texts: Vec<Text>,
    text_index: HashMap<String, TextId>,
    tweets: Vec<TweetRecord>,
    tweet_index: HashMap<(i64, DateTime<Utc>, TextId), TweetId>,
    topics: Vec<Topic>,
    links: BTreeSet<(TopicId, TweetId)>,
    whitelist: Vec<String>,
    authors: Vec<Author>,
}

impl Tables {
    fn text_by_content(&self, content: &str) -> Option<&Text> {
        self.text_index
            .get(content)
            .and_then(|id| self.texts.get((*id - 1) as usize))
    }
}

/// In-process store with the same guarantees as the database one.
///
/// Used for dry runs and tests; ids start at 1 like database serials.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_whitelist(mut self, tags: Vec<String>) -> Self {
        self.tables.get_mut().whitelist = tags;
        self
    }

    pub async fn add_author(&self, id: i64, name: &str, weight: Option<f64>) {
        let mut tables = self.tables.write().await;
        tables.authors.push(Author {
            id,
            name: name.to_string(),
            weight,
        });
    }

    pub async fn set_whitelist(&self, tags: Vec<String>) {
        self.tables.write().await.whitelist = tags;
    }

    /// Register a named topic, like an operator adding a row by hand.
    pub async fn add_topic(&self, name: &str, filter: &str) -> TopicId {
        let mut tables = self.tables.write().await;
        if let Some(topic) = tables.topics.iter_mut().find(|t| t.filter == filter) {
            topic.name = Some(name.to_string());
            return topic.id;
        }
        let id = tables.topics.len() as TopicId + 1;
        tables.topics.push(Topic {
            id,
            name: Some(name.to_string()),
            filter: filter.to_string(),
        });
        id
    }

    pub async fn texts(&self) -> Vec<Text> {
        self.tables.read().await.texts.clone()
    }

    pub async fn label_of(&self, content: &str) -> Option<Label> {
        let tables = self.tables.read().await;
        tables.text_by_content(content).and_then(|t| t.label.clone())
    }

    pub async fn tweets(&self) -> Vec<TweetRecord> {
        self.tables.read().await.tweets.clone()
    }

    pub async fn links(&self) -> Vec<(TopicId, TweetId)> {
        self.tables.read().await.links.iter().copied().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_texts_if_absent(&self, texts: &[String]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for text in texts {
            if tables.text_index.contains_key(text) {
                continue;
            }
            let id = tables.texts.len() as TextId + 1;
            tables.texts.push(Text {
                id,
                content: text.clone(),
                label: None,
            });
            tables.text_index.insert(text.clone(), id);
        }
        Ok(())
    }

    async fn find_text_ids(&self, texts: &[String]) -> Result<HashMap<String, TextId>> {
        let tables = self.tables.read().await;
        Ok(texts
            .iter()
            .filter_map(|text| tables.text_index.get(text).map(|id| (text.clone(), *id)))
            .collect())
    }

    async fn unlabeled_texts(&self, texts: &[String]) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        let mut seen = BTreeSet::new();
        Ok(texts
            .iter()
            .filter(|text| {
                tables
                    .text_by_content(text)
                    .is_some_and(|t| t.label.is_none())
            })
            .filter(|text| seen.insert(*text))
            .cloned()
            .collect())
    }

    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<TweetId>> {
        let mut tables = self.tables.write().await;
        let mut ids = Vec::with_capacity(tweets.len());
        for tweet in tweets {
            let key = (tweet.author_id, tweet.created_at, tweet.text_id);
            if let Some(id) = tables.tweet_index.get(&key) {
                ids.push(*id);
                continue;
            }
            let id = tables.tweets.len() as TweetId + 1;
            tables.tweets.push(TweetRecord {
                id,
                text_id: tweet.text_id,
                author_id: tweet.author_id,
                created_at: tweet.created_at,
            });
            tables.tweet_index.insert(key, id);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_labels(&self, labels: &HashMap<TextId, Label>) -> Result<()> {
        let mut tables = self.tables.write().await;
        for (text_id, label) in labels {
            if let Some(text) = tables.texts.get_mut((*text_id - 1) as usize) {
                if text.label.is_none() {
                    text.label = Some(label.clone());
                }
            }
        }
        Ok(())
    }

    async fn find_or_create_topic(&self, filter: &str) -> Result<TopicId> {
        let mut tables = self.tables.write().await;
        if let Some(topic) = tables.topics.iter().find(|t| t.filter == filter) {
            return Ok(topic.id);
        }
        let id = tables.topics.len() as TopicId + 1;
        tables.topics.push(Topic {
            id,
            name: None,
            filter: filter.to_string(),
        });
        Ok(id)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        Ok(self.tables.read().await.topics.clone())
    }

    async fn link_topic_tweet(&self, topic_id: TopicId, tweet_id: TweetId) -> Result<()> {
        self.tables.write().await.links.insert((topic_id, tweet_id));
        Ok(())
    }

    async fn all_already_labeled(&self, texts: &[String]) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(texts.iter().all(|text| {
            tables
                .text_by_content(text)
                .is_some_and(|t| t.label.is_some())
        }))
    }

    async fn list_whitelist_tags(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().await.whitelist.clone())
    }

    async fn list_authors(&self) -> Result<Vec<Author>> {
        let mut authors = self.tables.read().await.authors.clone();
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(authors)
    }

    async fn topic_counts(
        &self,
        topic_id: TopicId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SentimentCounts> {
        let tables = self.tables.read().await;
        let mut counts = SentimentCounts::default();
        for (_, tweet_id) in tables.links.iter().filter(|(topic, _)| *topic == topic_id) {
            let Some(tweet) = tables.tweets.get((*tweet_id - 1) as usize) else {
                continue;
            };
            if tweet.created_at < from || tweet.created_at > to {
                continue;
            }
            let weight = tables
                .authors
                .iter()
                .find(|a| a.id == tweet.author_id)
                .and_then(|a| a.weight)
                .unwrap_or(1.0);
            let label = tables
                .texts
                .get((tweet.text_id - 1) as usize)
                .and_then(|t| t.label.as_ref());
            match label.map(Label::as_str) {
                Some(Label::POSITIVE) => counts.positive += weight,
                Some(Label::NEGATIVE) => counts.negative += weight,
                Some(Label::NEUTRAL) => counts.neutral += weight,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let tables = self.tables.read().await;
        Ok(TableCounts {
            texts: tables.texts.len(),
            tweets: tables.tweets.len(),
            topics: tables.topics.len(),
            topic_links: tables.links.len(),
        })
    }
}
