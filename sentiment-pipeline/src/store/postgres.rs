use crate::traits::Store;
use crate::types::{
    Author, Label, NewTweet, Result, SentimentCounts, TableCounts, TextId, Topic, TopicId,
    TweetId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_texts_if_absent(&self, texts: &[String]) -> Result<()> {
        if texts.is_empty() {
            return Ok(());
        }
        let result = sqlx::query(
            r#"
            INSERT INTO tweet_texts (text)
            SELECT * FROM UNNEST($1::text[])
            ON CONFLICT (text) DO NOTHING
            "#,
        )
        .bind(texts)
        .execute(&self.pool)
        .await?;
        debug!(
            "Inserted {} of {} texts",
            result.rows_affected(),
            texts.len()
        );
        Ok(())
    }

    async fn find_text_ids(&self, texts: &[String]) -> Result<HashMap<String, TextId>> {
        if texts.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, text FROM tweet_texts WHERE text = ANY($1)")
            .bind(texts)
            .fetch_all(&self.pool)
            .await?;

        let mut ids = HashMap::with_capacity(rows.len());
        for row in rows {
            ids.insert(row.try_get("text")?, row.try_get("id")?);
        }
        Ok(ids)
    }

    async fn unlabeled_texts(&self, texts: &[String]) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT text FROM tweet_texts WHERE text = ANY($1) AND classification IS NULL",
        )
        .bind(texts)
        .fetch_all(&self.pool)
        .await?;

        let unlabeled = rows
            .into_iter()
            .map(|row| row.try_get("text"))
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(unlabeled)
    }

    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<Vec<TweetId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(tweets.len());
        for tweet in tweets {
            // The no-op update makes RETURNING yield the id of an existing row.
            let row = sqlx::query(
                r#"
                INSERT INTO tweets (uid, time, text)
                VALUES ($1, $2, $3)
                ON CONFLICT (uid, time, text) DO UPDATE SET uid = EXCLUDED.uid
                RETURNING id
                "#,
            )
            .bind(tweet.author_id)
            .bind(tweet.created_at)
            .bind(tweet.text_id)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(row.try_get("id")?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn update_labels(&self, labels: &HashMap<TextId, Label>) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (text_id, label) in labels {
            sqlx::query(
                r#"
                UPDATE tweet_texts
                SET classification = $1
                WHERE id = $2 AND classification IS NULL
                "#,
            )
            .bind(label.as_str())
            .bind(text_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_or_create_topic(&self, filter: &str) -> Result<TopicId> {
        let row = sqlx::query(
            r#"
            INSERT INTO topics (filter)
            VALUES ($1)
            ON CONFLICT (filter) DO UPDATE SET filter = EXCLUDED.filter
            RETURNING id
            "#,
        )
        .bind(filter)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let rows = sqlx::query("SELECT id, name, filter FROM topics ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut topics = Vec::with_capacity(rows.len());
        for row in rows {
            topics.push(Topic {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                filter: row.try_get("filter")?,
            });
        }
        Ok(topics)
    }

    async fn link_topic_tweet(&self, topic_id: TopicId, tweet_id: TweetId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topic_tweets (topic, tweet)
            VALUES ($1, $2)
            ON CONFLICT (topic, tweet) DO NOTHING
            "#,
        )
        .bind(topic_id)
        .bind(tweet_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn all_already_labeled(&self, texts: &[String]) -> Result<bool> {
        if texts.is_empty() {
            return Ok(true);
        }
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) = 0 AS all_labeled
            FROM UNNEST($1::text[]) AS data (text)
            LEFT JOIN tweet_texts ON tweet_texts.text = data.text
            WHERE tweet_texts.classification IS NULL
            "#,
        )
        .bind(texts)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("all_labeled")?)
    }

    async fn list_whitelist_tags(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT tag FROM whitelist_tags ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        let tags = rows
            .into_iter()
            .map(|row| row.try_get("tag"))
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    async fn list_authors(&self) -> Result<Vec<Author>> {
        let rows = sqlx::query("SELECT id, name, k FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut authors = Vec::with_capacity(rows.len());
        for row in rows {
            authors.push(Author {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                weight: row.try_get("k")?,
            });
        }
        Ok(authors)
    }

    async fn topic_counts(
        &self,
        topic_id: TopicId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SentimentCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN tt.classification = 'positive' THEN w.k ELSE 0 END), 0)::float8 AS positive,
                COALESCE(SUM(CASE WHEN tt.classification = 'negative' THEN w.k ELSE 0 END), 0)::float8 AS negative,
                COALESCE(SUM(CASE WHEN tt.classification = 'neutral' THEN w.k ELSE 0 END), 0)::float8 AS neutral
            FROM tweets t
            INNER JOIN tweet_texts tt ON t.text = tt.id
            INNER JOIN topic_tweets ts ON t.id = ts.tweet
            CROSS JOIN LATERAL (
                SELECT COALESCE((SELECT users.k FROM users WHERE users.id = t.uid), 1.0) AS k
            ) w
            WHERE t.time >= $1 AND t.time <= $2 AND ts.topic = $3
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SentimentCounts {
            positive: row.try_get("positive")?,
            negative: row.try_get("negative")?,
            neutral: row.try_get("neutral")?,
        })
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM tweet_texts) AS texts,
                (SELECT COUNT(*) FROM tweets) AS tweets,
                (SELECT COUNT(*) FROM topics) AS topics,
                (SELECT COUNT(*) FROM topic_tweets) AS topic_links
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<usize> {
            let value: i64 = row.try_get(column)?;
            Ok(value.max(0) as usize)
        };
        Ok(TableCounts {
            texts: count("texts")?,
            tweets: count("tweets")?,
            topics: count("topics")?,
            topic_links: count("topic_links")?,
        })
    }
}
