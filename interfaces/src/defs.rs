use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TextId = i64;
pub type TweetId = i64;
pub type TopicId = i64;
pub type AuthorId = i64;

/// An item exactly as the feed source returned it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub source_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_id: AuthorId,
}

/// A retrieved item together with its canonical text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub raw: RawItem,
    pub clean_text: String,
}

impl Item {
    pub fn is_meaningful(&self) -> bool {
        !self.clean_text.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub const NEUTRAL: &'static str = "neutral";
    pub const POSITIVE: &'static str = "positive";
    pub const NEGATIVE: &'static str = "negative";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn neutral() -> Self {
        Self::new(Self::NEUTRAL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Label {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Canonical text row. `label` is absent until classified and final once set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Text {
    pub id: TextId,
    pub content: String,
    pub label: Option<Label>,
}

/// A tweet record waiting to be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTweet {
    pub text_id: TextId,
    pub author_id: AuthorId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TweetRecord {
    pub id: TweetId,
    pub text_id: TextId,
    pub author_id: AuthorId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: Option<String>,
    pub filter: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub weight: Option<f64>,
}

/// Author-weighted label counts for one topic and time window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// Row counts of the persisted tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub texts: usize,
    pub tweets: usize,
    pub topics: usize,
    pub topic_links: usize,
}

// Object style note:
// Everything in this module is plain data. Cleaning, voting, scheduling and
// storage live in the pipeline crate and take these values by reference.
