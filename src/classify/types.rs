//! Label types for the expression classifier boundary.
//!
//! Labels are whatever the remote classifier says they are: the set is fixed
//! on the classifier side, not here, so an unrecognized value is an ordinary
//! distinct label rather than an error.

use serde::{Deserialize, Serialize};

/// The label the classifier reports for a face at rest.
pub const NEUTRAL_LABEL: &str = "neutral";

/// Labels treated as distress indicators unless overridden in configuration.
pub const DEFAULT_DISTRESS_LABELS: [&str; 4] = ["angry", "disgust", "fear", "sad"];

/// One classification result for a single video frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The neutral resting label.
    pub fn neutral() -> Self {
        Self::new(NEUTRAL_LABEL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classifier client error types.
#[derive(Debug, Clone)]
pub enum ClassifierError {
    /// Configuration or client construction error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Classifier returned an error response
    Server { status: u16, message: String },
    /// Response body could not be understood
    Malformed(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::Config(msg) => write!(f, "Classifier config error: {msg}"),
            ClassifierError::Network(msg) => write!(f, "Classifier network error: {msg}"),
            ClassifierError::Server { status, message } => {
                write!(f, "Classifier server error ({status}): {message}")
            }
            ClassifierError::Malformed(msg) => write!(f, "Classifier malformed response: {msg}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        let label = Label::new("sad");
        assert_eq!(label.as_str(), "sad");
        assert_eq!(label.to_string(), "sad");

        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"sad\"");
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }

    #[test]
    fn test_unrecognized_label_is_ordinary() {
        // Anything the classifier emits is a valid label.
        let label = Label::new("perplexed");
        assert_ne!(label, Label::neutral());
    }

    #[test]
    fn test_default_distress_set() {
        assert!(DEFAULT_DISTRESS_LABELS.contains(&"sad"));
        assert!(!DEFAULT_DISTRESS_LABELS.contains(&NEUTRAL_LABEL));
    }
}
