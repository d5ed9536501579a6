use crate::ensemble::EnsembleClassifier;
use crate::traits::{ClassificationBackend, ClassifierConnection};
use crate::types::{Label, PipelineError, Result};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Classifies many texts, one bounded block at a time.
pub struct ClassificationScheduler {
    backend: Arc<dyn ClassificationBackend>,
    ensemble: EnsembleClassifier,
}

impl ClassificationScheduler {
    pub fn new(backend: Arc<dyn ClassificationBackend>, ensemble: EnsembleClassifier) -> Self {
        Self { backend, ensemble }
    }

    pub fn ensemble(&self) -> &EnsembleClassifier {
        &self.ensemble
    }

    /// Open a connection for classifying texts one at a time.
    pub async fn connect(&self) -> Result<Box<dyn ClassifierConnection>> {
        debug!("Connecting to {}", self.backend.backend_name());
        self.backend.connect().await
    }

    /// Classify `texts`, running the texts of a block concurrently and the
    /// blocks one after another.
    ///
    /// At most `block_size` texts, and so `block_size` calls per ensemble
    /// member, are in flight at once. Empty texts map to `neutral` without a
    /// backend call and duplicates are classified once. The first failing
    /// text aborts the run; nothing is returned for blocks that had already
    /// completed.
    pub async fn classify_all(
        &self,
        texts: &[String],
        block_size: usize,
    ) -> Result<HashMap<String, Label>> {
        if block_size == 0 {
            return Err(PipelineError::Configuration(
                "classification block size must be positive".to_string(),
            ));
        }

        let mut results = HashMap::with_capacity(texts.len());
        let mut seen = HashSet::with_capacity(texts.len());
        let mut pending: Vec<&str> = Vec::with_capacity(texts.len());
        for text in texts {
            if !seen.insert(text.as_str()) {
                continue;
            }
            if text.is_empty() {
                results.insert(String::new(), Label::neutral());
            } else {
                pending.push(text);
            }
        }
        if pending.is_empty() {
            return Ok(results);
        }

        let connection = self.backend.connect().await?;
        let total_blocks = pending.len().div_ceil(block_size);
        info!(
            "Classifying {} texts in {} blocks with {}",
            pending.len(),
            total_blocks,
            self.backend.backend_name()
        );

        for (index, block) in pending.chunks(block_size).enumerate() {
            let calls = block.iter().map(|text| {
                let connection = connection.as_ref();
                async move {
                    let label = self.ensemble.classify_one(connection, text).await?;
                    Ok::<(String, Label), PipelineError>((text.to_string(), label))
                }
            });
            let labelled = try_join_all(calls).await?;
            debug!(
                "Block {}/{} classified ({} texts)",
                index + 1,
                total_blocks,
                labelled.len()
            );
            results.extend(labelled);
        }

        Ok(results)
    }
}
