//! HTTP client for the remote expression classifier.
//!
//! The classifier is an opaque service: it takes a JPEG frame and returns a
//! single expression label. It may be slow and it may fail; callers treat a
//! failure as "no update this tick" rather than an error worth propagating.

use crate::classify::types::{ClassifierError, Label};
use serde::Deserialize;

/// Classifier endpoint configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the classifier service
    pub base_url: String,
}

impl ClassifierConfig {
    /// Create a new classifier configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the prediction endpoint URL.
    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.base_url)
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// Prediction response body.
#[derive(Debug, Clone, Deserialize)]
struct PredictResponse {
    expression: String,
}

/// Async classifier client.
pub struct HttpClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    /// Create a new classifier client.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ClassifierError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Test connection to the classifier.
    pub async fn test_connection(&self) -> Result<bool, ClassifierError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Classify a single JPEG frame.
    pub async fn classify(&self, frame: &[u8]) -> Result<Label, ClassifierError> {
        let part = reqwest::multipart::Part::bytes(frame.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| ClassifierError::Config(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.config.predict_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassifierError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let prediction: PredictResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        Ok(Label::new(prediction.expression))
    }
}

/// Blocking classifier client for use on worker threads.
pub struct BlockingClassifier {
    inner: HttpClassifier,
    runtime: tokio::runtime::Runtime,
}

impl BlockingClassifier {
    /// Create a new blocking classifier client.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClassifierError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: HttpClassifier::new(config)?,
            runtime,
        })
    }

    /// Test connection to the classifier.
    pub fn test_connection(&self) -> Result<bool, ClassifierError> {
        self.runtime.block_on(self.inner.test_connection())
    }
}

impl crate::classify::Classifier for BlockingClassifier {
    fn classify(&mut self, frame: &[u8]) -> Result<Label, ClassifierError> {
        self.runtime.block_on(self.inner.classify(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_config_urls() {
        let config = ClassifierConfig::new("http://127.0.0.1:8080");
        assert_eq!(config.predict_url(), "http://127.0.0.1:8080/predict");
        assert_eq!(config.health_url(), "http://127.0.0.1:8080/health");
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let config = ClassifierConfig::new("http://127.0.0.1:8080/");
        assert_eq!(config.predict_url(), "http://127.0.0.1:8080/predict");
    }
}
