use crate::config::NlcConfig;
use crate::traits::{Classification, ClassificationBackend, ClassifierConnection};
use crate::types::{Label, PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    top_class: String,
    #[serde(default)]
    classes: Vec<ClassConfidence>,
}

#[derive(Debug, Deserialize)]
struct ClassConfidence {
    class_name: String,
    confidence: f64,
}

/// Natural-language-classifier HTTP API client
pub struct NlcClient {
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl NlcClient {
    pub fn new(config: &NlcConfig) -> Result<Self> {
        if config.username.is_empty() || config.password.is_empty() {
            return Err(PipelineError::Configuration(
                "classifier credentials must not be empty".to_string(),
            ));
        }
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PipelineError::Configuration(
                "classifier base_url must not be empty".to_string(),
            ));
        }
        // Reject a malformed base URL up front.
        Url::parse(&base_url)?;

        Ok(Self {
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

#[async_trait]
impl ClassificationBackend for NlcClient {
    fn backend_name(&self) -> String {
        format!("NLC ({})", self.base_url)
    }

    async fn connect(&self) -> Result<Box<dyn ClassifierConnection>> {
        let client = Client::builder().timeout(self.timeout).build()?;
        debug!("Opened classifier connection to {}", self.base_url);
        Ok(Box::new(NlcConnection {
            client,
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }))
    }
}

/// One open connection pool; dropping it closes the pooled sockets.
struct NlcConnection {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl NlcConnection {
    fn classify_url(&self, backend_id: &str, text: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/api/v1/classifiers/{}/classify",
            self.base_url, backend_id
        ))?;
        url.query_pairs_mut().append_pair("text", text);
        Ok(url)
    }
}

#[async_trait]
impl ClassifierConnection for NlcConnection {
    async fn classify(&self, backend_id: &str, text: &str) -> Result<Classification> {
        let url = self.classify_url(backend_id, text)?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            warn!("Classifier {} returned {}", backend_id, status);
            return Err(PipelineError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifyResponse = serde_json::from_str(&body)?;
        Ok(Classification {
            top_label: Label::new(parsed.top_class),
            confidences: parsed
                .classes
                .into_iter()
                .map(|class| (Label::new(class.class_name), class.confidence))
                .collect(),
        })
    }
}

impl Drop for NlcConnection {
    fn drop(&mut self) {
        debug!("Closed classifier connection to {}", self.base_url);
    }
}
