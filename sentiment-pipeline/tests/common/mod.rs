#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use sentiment_pipeline::{
    Classification, ClassificationBackend, ClassifierConnection, EarlyStop, FeedSource,
    ItemStream, Label, LiveFeed, PipelineError, RawItem, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::minutes(minute)
}

pub fn raw(id: &str, text: &str, author_id: i64, minute: i64) -> RawItem {
    RawItem {
        source_id: id.to_string(),
        text: text.to_string(),
        created_at: at_minute(minute),
        author_id,
    }
}

/// Word-based sentiment every fake backend agrees on unless overridden.
pub fn keyword_label(text: &str) -> Label {
    let text = text.to_lowercase();
    if text.contains("love") || text.contains("great") {
        Label::new(Label::POSITIVE)
    } else if text.contains("hate") || text.contains("awful") {
        Label::new(Label::NEGATIVE)
    } else {
        Label::neutral()
    }
}

#[derive(Default)]
struct BackendState {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connects: AtomicUsize,
    releases: AtomicUsize,
    completed: AtomicUsize,
    calls: Mutex<Vec<(String, String)>>,
    overrides: HashMap<String, Label>,
    failing: Option<String>,
    delay: Duration,
    member_delays: HashMap<String, Duration>,
}

/// Classification backend recording every call and the peak number of calls
/// running at the same time.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::build(HashMap::new(), None)
    }

    /// Backend whose member `backend_id` always answers `label`.
    pub fn with_overrides(overrides: &[(&str, &str)]) -> Self {
        let overrides = overrides
            .iter()
            .map(|(id, label)| (id.to_string(), Label::new(*label)))
            .collect();
        Self::build(overrides, None)
    }

    /// Backend whose member `backend_id` answers with a 500.
    pub fn failing(backend_id: &str) -> Self {
        Self::build(HashMap::new(), Some(backend_id.to_string()))
    }

    /// `backend_id` fails at once while every other member takes `peer_delay`.
    pub fn failing_fast(backend_id: &str, peer_delay: Duration) -> Self {
        let mut backend = BackendState {
            failing: Some(backend_id.to_string()),
            delay: peer_delay,
            ..Default::default()
        };
        backend
            .member_delays
            .insert(backend_id.to_string(), Duration::ZERO);
        Self {
            state: Arc::new(backend),
        }
    }

    fn build(overrides: HashMap<String, Label>, failing: Option<String>) -> Self {
        Self {
            state: Arc::new(BackendState {
                overrides,
                failing,
                delay: Duration::from_millis(20),
                ..Default::default()
            }),
        }
    }

    /// Connections dropped so far.
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Calls that ran to a successful answer.
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationBackend for FakeBackend {
    fn backend_name(&self) -> String {
        "fake classifier".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn ClassifierConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<BackendState>,
}

#[async_trait]
impl ClassifierConnection for FakeConnection {
    async fn classify(&self, backend_id: &str, text: &str) -> Result<Classification> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((backend_id.to_string(), text.to_string()));
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .state
            .member_delays
            .get(backend_id)
            .copied()
            .unwrap_or(self.state.delay);
        tokio::time::sleep(delay).await;
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.state.failing.as_deref() == Some(backend_id) {
            return Err(PipelineError::Backend {
                status: 500,
                body: "model unavailable".to_string(),
            });
        }
        let label = self
            .state
            .overrides
            .get(backend_id)
            .cloned()
            .unwrap_or_else(|| keyword_label(text));
        self.state.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Classification {
            confidences: vec![(label.clone(), 0.9)],
            top_label: label,
        })
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Feed source serving canned pages, per filter or for any filter.
#[derive(Clone, Default)]
pub struct FakeFeed {
    pages: Arc<Mutex<HashMap<String, Vec<Vec<RawItem>>>>>,
    fallback: Arc<Mutex<Vec<Vec<RawItem>>>>,
    filters: Arc<Mutex<Vec<String>>>,
    pages_served: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    /// Delay per call, indexed by call order; later calls default to none.
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` for every filter without an exact entry.
    pub fn with_pages(self, pages: Vec<Vec<RawItem>>) -> Self {
        *self.fallback.lock().unwrap() = pages;
        self
    }

    pub fn with_filter_pages(self, filter: &str, pages: Vec<Vec<RawItem>>) -> Self {
        self.pages.lock().unwrap().insert(filter.to_string(), pages);
        self
    }

    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays;
        self
    }

    pub fn set_pages(&self, pages: Vec<Vec<RawItem>>) {
        *self.fallback.lock().unwrap() = pages;
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().unwrap().clone()
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    fn source_name(&self) -> String {
        "fake feed".to_string()
    }

    async fn retrieve(&self, filter: &str, early_stop: &dyn EarlyStop) -> Result<Vec<RawItem>> {
        let (pages, delay) = {
            let mut filters = self.filters.lock().unwrap();
            let call_index = filters.len();
            filters.push(filter.to_string());
            let pages = self
                .pages
                .lock()
                .unwrap()
                .get(filter)
                .cloned()
                .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
            let delay = self
                .delays
                .lock()
                .unwrap()
                .get(call_index)
                .copied()
                .unwrap_or_default();
            (pages, delay)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut items = Vec::new();
        for page in pages {
            self.pages_served.fetch_add(1, Ordering::SeqCst);
            let stop = early_stop.should_stop(&page).await?;
            items.extend(page);
            if stop {
                break;
            }
        }
        Ok(items)
    }
}

/// Live feed replaying a fixed list of items, then closing.
#[derive(Clone, Default)]
pub struct FakeLiveFeed {
    items: Vec<RawItem>,
    fail_with: Option<u16>,
    tracked: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeLiveFeed {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// End the stream with a feed failure instead of closing it.
    pub fn then_fail(mut self, status: u16) -> Self {
        self.fail_with = Some(status);
        self
    }

    pub fn tracked(&self) -> Vec<Vec<String>> {
        self.tracked.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveFeed for FakeLiveFeed {
    fn source_name(&self) -> String {
        "fake live feed".to_string()
    }

    async fn stream(&self, track: &[String]) -> Result<ItemStream> {
        self.tracked.lock().unwrap().push(track.to_vec());
        let mut items: Vec<Result<RawItem>> = self.items.iter().cloned().map(Ok).collect();
        if let Some(status) = self.fail_with {
            items.push(Err(PipelineError::Backend {
                status,
                body: "stream reset".to_string(),
            }));
        }
        Ok(stream::iter(items).boxed())
    }
}
