use crate::traits::{AlreadySeen, EarlyStop, FeedSource};
use crate::topics::match_key;
use crate::types::{Author, Item, PipelineError, RawItem, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Canonicalizes raw item text.
pub type Cleaner = dyn Fn(&str) -> String + Send + Sync;

/// Adapts an [`AlreadySeen`] predicate over canonical texts to the page-level
/// [`EarlyStop`] a feed source understands.
struct CleaningStop<'a> {
    cleaner: &'a Cleaner,
    already_seen: &'a dyn AlreadySeen,
}

#[async_trait]
impl EarlyStop for CleaningStop<'_> {
    async fn should_stop(&self, page: &[RawItem]) -> Result<bool> {
        let texts: BTreeSet<String> = page
            .iter()
            .map(|item| (self.cleaner)(&item.text))
            .filter(|text| !text.is_empty())
            .collect();
        // Pages without meaningful text never end pagination.
        if texts.is_empty() {
            return Ok(false);
        }
        let texts: Vec<String> = texts.into_iter().collect();
        self.already_seen.already_seen(&texts).await
    }
}

/// `from:<name>` clause for every author.
pub fn author_filters(authors: &[Author]) -> Vec<String> {
    authors
        .iter()
        .map(|author| format!("from:{}", author.name))
        .collect()
}

/// Combine the filter (without the author placeholder) with one block of
/// sub-filters: `<filter> AND (<a> OR <b> ...)`.
pub fn composite_filter(filter: &str, block: &[String]) -> String {
    let base = match_key(filter);
    let disjunction = format!("({})", block.join(" OR "));
    if base.is_empty() {
        disjunction
    } else {
        format!("{} AND {}", base, disjunction)
    }
}

/// Fans retrieval out over the feed source.
pub struct RetrievalScheduler {
    source: Arc<dyn FeedSource>,
}

impl RetrievalScheduler {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        Self { source }
    }

    /// Retrieve every item matching `filter`.
    ///
    /// Without sub-filters this is a single retrieval. With sub-filters, they
    /// are cut into blocks of at most `block_size`, one composite query per
    /// block runs concurrently with the others, and each query collects its
    /// own items; the lists are concatenated in block order once every query
    /// has finished. The first failing block cancels the rest.
    pub async fn retrieve_by_filter(
        &self,
        filter: &str,
        sub_filters: Option<&[String]>,
        block_size: usize,
        already_seen: &dyn AlreadySeen,
        cleaner: &Cleaner,
    ) -> Result<Vec<Item>> {
        if filter.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "retrieval filter must not be empty".to_string(),
            ));
        }
        if block_size == 0 {
            return Err(PipelineError::Configuration(
                "retrieval block size must be positive".to_string(),
            ));
        }

        let stop = CleaningStop {
            cleaner,
            already_seen,
        };

        let sub_filters = match sub_filters {
            Some(sub_filters) if !sub_filters.is_empty() => sub_filters,
            Some(_) => {
                let filter = match_key(filter);
                if filter.is_empty() {
                    debug!("No sub-filters and nothing left to query");
                    return Ok(Vec::new());
                }
                return self.retrieve_one(&filter, &stop, cleaner).await;
            }
            None => return self.retrieve_one(filter, &stop, cleaner).await,
        };

        let blocks: Vec<String> = sub_filters
            .chunks(block_size)
            .map(|block| composite_filter(filter, block))
            .collect();
        info!(
            "Retrieving from {} with {} sub-filters in {} blocks",
            self.source.source_name(),
            sub_filters.len(),
            blocks.len()
        );

        let stop = &stop;
        let per_block = try_join_all(
            blocks
                .iter()
                .map(|block_filter| self.retrieve_one(block_filter, stop, cleaner)),
        )
        .await?;

        Ok(per_block.into_iter().flatten().collect())
    }

    async fn retrieve_one(
        &self,
        filter: &str,
        stop: &CleaningStop<'_>,
        cleaner: &Cleaner,
    ) -> Result<Vec<Item>> {
        let raw_items = self.source.retrieve(filter, stop).await?;
        debug!("Filter {:?} returned {} items", filter, raw_items.len());
        Ok(raw_items
            .into_iter()
            .map(|raw| {
                let clean_text = cleaner(&raw.text);
                Item { raw, clean_text }
            })
            .collect())
    }
}
