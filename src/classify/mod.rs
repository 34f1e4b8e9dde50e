//! Expression classification boundary.
//!
//! The classifier itself is a remote collaborator; this module provides the
//! client seam plus a scripted implementation for environments without one.

pub mod http;
pub mod scripted;
pub mod types;

// Re-export commonly used types
pub use http::{BlockingClassifier, ClassifierConfig, HttpClassifier};
pub use scripted::ScriptedClassifier;
pub use types::{ClassifierError, Label, DEFAULT_DISTRESS_LABELS, NEUTRAL_LABEL};

/// A classifier turns one JPEG frame into one expression label.
///
/// Implementations run on a dedicated worker thread owned by the session, so
/// a slow round-trip never stalls the event loop.
pub trait Classifier: Send {
    fn classify(&mut self, frame: &[u8]) -> Result<Label, ClassifierError>;
}
