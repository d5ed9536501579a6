use crate::config::FeedConfig;
use crate::traits::{EarlyStop, FeedSource, ItemStream, LiveFeed};
use crate::types::{PipelineError, RawItem, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
    author_id: i64,
}

impl From<SearchItem> for RawItem {
    fn from(item: SearchItem) -> Self {
        Self {
            source_id: item.id,
            text: item.text,
            created_at: item.created_at,
            author_id: item.author_id,
        }
    }
}

/// Paginated JSON search API: `GET {base}/search?q=<filter>[&cursor=<c>]`,
/// plus the live endpoint `GET {base}/stream?track=<a,b>` answering with one
/// JSON item per line.
pub struct HttpFeedSource {
    client: Client,
    stream_client: Client,
    config: FeedConfig,
    search_url: Url,
    stream_url: Url,
}

impl HttpFeedSource {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        // No overall timeout: a live stream stays open indefinitely.
        let stream_client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/');
        let search_url = Url::parse(&format!("{}/search", base_url))?;
        let stream_url = Url::parse(&format!("{}/stream", base_url))?;

        Ok(Self {
            client,
            stream_client,
            config,
            search_url,
            stream_url,
        })
    }

    async fn send(&self, filter: &str, cursor: Option<&str>) -> Result<Response> {
        let mut url = self.search_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", filter);
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Fetch one page, retrying transport errors and 5xx responses with
    /// exponential backoff.
    async fn fetch_page(&self, filter: &str, cursor: Option<&str>) -> Result<SearchPage> {
        let delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 32,
            multiplier: 2.0,
            // Attempts are bounded by max_retries alone.
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let failure = match self.send(filter, cursor).await {
                Ok(response) if response.status() == StatusCode::OK => {
                    let body = response.text().await?;
                    return Ok(serde_json::from_str(&body)?);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let failure = PipelineError::Backend {
                        status: status.as_u16(),
                        body,
                    };
                    if !status.is_server_error() {
                        return Err(failure);
                    }
                    failure
                }
                Err(e) => e,
            };

            if attempt >= self.config.max_retries {
                return Err(failure);
            }
            match backoff.next_backoff() {
                Some(wait) => {
                    warn!(
                        "Attempt {} for {:?} failed ({}), retrying in {:?}",
                        attempt + 1,
                        filter,
                        failure,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                None => return Err(failure),
            }
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn source_name(&self) -> String {
        self.search_url
            .domain()
            .map(|domain| format!("Search API ({})", domain))
            .unwrap_or_else(|| "Search API".to_string())
    }

    async fn retrieve(&self, filter: &str, early_stop: &dyn EarlyStop) -> Result<Vec<RawItem>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page_number in 1..=self.config.max_pages {
            let page = self.fetch_page(filter, cursor.as_deref()).await?;
            let page_items: Vec<RawItem> = page.items.into_iter().map(RawItem::from).collect();
            debug!(
                "Page {} for {:?}: {} items",
                page_number,
                filter,
                page_items.len()
            );

            let stop = early_stop.should_stop(&page_items).await?;
            items.extend(page_items);
            if stop {
                info!("Nothing new for {:?} after page {}, stopping", filter, page_number);
                break;
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl LiveFeed for HttpFeedSource {
    fn source_name(&self) -> String {
        self.stream_url
            .domain()
            .map(|domain| format!("Stream API ({})", domain))
            .unwrap_or_else(|| "Stream API".to_string())
    }

    async fn stream(&self, track: &[String]) -> Result<ItemStream> {
        let mut url = self.stream_url.clone();
        url.query_pairs_mut().append_pair("track", &track.join(","));
        let mut request = self.stream_client.get(url);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        info!("Streaming {:?} from {}", track, LiveFeed::source_name(self));

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(json_lines(body))
    }
}

struct LineReader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Split a chunked body into newline-delimited JSON items. Blank lines are
/// keep-alives and skipped; a transport error ends the stream after being
/// reported.
fn json_lines(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ItemStream {
    let reader = LineReader {
        body,
        buffer: Vec::new(),
        finished: false,
    };
    stream::unfold(reader, |mut reader| async move {
        loop {
            let line = match reader.buffer.iter().position(|byte| *byte == b'\n') {
                Some(end) => Some(reader.buffer.drain(..=end).collect::<Vec<u8>>()),
                None if reader.finished && !reader.buffer.is_empty() => {
                    Some(std::mem::take(&mut reader.buffer))
                }
                None if reader.finished => return None,
                None => None,
            };

            if let Some(line) = line {
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let item = serde_json::from_str::<SearchItem>(line)
                    .map(RawItem::from)
                    .map_err(PipelineError::from);
                return Some((item, reader));
            }

            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    reader.finished = true;
                    reader.buffer.clear();
                    return Some((Err(PipelineError::from(e)), reader));
                }
                None => {
                    debug!("Stream closed by the feed");
                    reader.finished = true;
                }
            }
        }
    })
    .boxed()
}
