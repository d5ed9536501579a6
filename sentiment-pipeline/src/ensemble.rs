use crate::traits::ClassifierConnection;
use crate::types::{Label, PipelineError, Result, ENSEMBLE_QUORUM};
use crate::vote;
use futures::future::try_join_all;
use tracing::debug;

/// Majority vote over a fixed set of independently trained classifiers.
#[derive(Debug, Clone)]
pub struct EnsembleClassifier {
    backend_ids: Vec<String>,
    default_label: Label,
}

impl EnsembleClassifier {
    pub fn new(backend_ids: Vec<String>, default_label: Label) -> Result<Self> {
        if backend_ids.is_empty() {
            return Err(PipelineError::Configuration(
                "ensemble needs at least one classifier".to_string(),
            ));
        }
        Ok(Self {
            backend_ids,
            default_label,
        })
    }

    pub fn backend_ids(&self) -> &[String] {
        &self.backend_ids
    }

    pub fn default_label(&self) -> &Label {
        &self.default_label
    }

    /// Classify one text with every ensemble member concurrently and vote.
    ///
    /// Empty text is `neutral` without any backend call. A failing member
    /// fails the whole call: the quorum is defined over the full ensemble,
    /// so a partial vote is never produced. The other in-flight calls are
    /// dropped as soon as one fails.
    pub async fn classify_one(
        &self,
        connection: &dyn ClassifierConnection,
        text: &str,
    ) -> Result<Label> {
        if text.is_empty() {
            return Ok(Label::neutral());
        }

        let calls = self.backend_ids.iter().map(|backend_id| async move {
            let classification = connection.classify(backend_id, text).await?;
            Ok::<Label, PipelineError>(classification.top_label)
        });
        // try_join_all keeps input order, so votes follow backend order.
        let votes = try_join_all(calls).await?;

        let label = vote::resolve(&votes, &self.default_label, ENSEMBLE_QUORUM);
        debug!("Votes {:?} resolved to {}", votes, label);
        Ok(label)
    }
}
