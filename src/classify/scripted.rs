//! Scripted classifier for tests and demos.
//!
//! This exists so sessions can run end-to-end without a classifier service:
//! results are replayed from a queue instead of computed from pixels.

use crate::classify::types::{ClassifierError, Label};
use crate::classify::Classifier;
use std::collections::VecDeque;

/// A classifier that replays a fixed script of results.
pub struct ScriptedClassifier {
    script: VecDeque<Result<Label, ClassifierError>>,
    last: Option<Label>,
    hold_last: bool,
}

impl ScriptedClassifier {
    /// Create a classifier from a sequence of labels.
    ///
    /// Once the script is exhausted, further calls fail (and are treated as
    /// skipped ticks by the caller).
    pub fn new<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Self {
            script: labels.into_iter().map(|l| Ok(l.into())).collect(),
            last: None,
            hold_last: false,
        }
    }

    /// Create a classifier that keeps returning the final label after the
    /// script runs out.
    pub fn holding<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        let mut scripted = Self::new(labels);
        scripted.hold_last = true;
        scripted
    }

    /// Append a failure to the script.
    pub fn push_failure(&mut self, error: ClassifierError) {
        self.script.push_back(Err(error));
    }

    /// Append a label to the script.
    pub fn push_label(&mut self, label: impl Into<Label>) {
        self.script.push_back(Ok(label.into()));
    }

    /// Number of unplayed script entries.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, _frame: &[u8]) -> Result<Label, ClassifierError> {
        match self.script.pop_front() {
            Some(Ok(label)) => {
                self.last = Some(label.clone());
                Ok(label)
            }
            Some(Err(e)) => Err(e),
            None => {
                if self.hold_last {
                    if let Some(ref label) = self.last {
                        return Ok(label.clone());
                    }
                }
                Err(ClassifierError::Network("script exhausted".to_string()))
            }
        }
    }
}
