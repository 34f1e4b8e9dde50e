//! Expression stability filter.
//!
//! Per-frame classifications are noisy: a single blink can read as "fear".
//! The filter keeps a bounded window of the most recent labels and reports
//! the plurality value, so one stray frame never flips the visible state.

use crate::classify::Label;
use std::collections::VecDeque;

/// Majority-vote smoother over a bounded window of recent labels.
///
/// Owned exclusively by one session; mutated only through [`append`].
///
/// Tie-break rule: counts are accumulated over the window front-to-back
/// (oldest first) and the first distinct label to reach the maximum count
/// wins. Deterministic, but adding one label can still flip a tie the other
/// way; callers must tolerate that.
///
/// [`append`]: StabilityFilter::append
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    window: VecDeque<Label>,
    capacity: usize,
}

impl StabilityFilter {
    /// Create a filter holding at most `capacity` recent labels.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a label into the window, evicting the oldest past capacity,
    /// and return the current stable label.
    pub fn append(&mut self, label: Label) -> Label {
        self.window.push_back(label);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }
        // Window is non-empty here, so a plurality always exists.
        self.stable().unwrap_or_else(Label::neutral)
    }

    /// The current plurality label, if any labels have been appended.
    pub fn stable(&self) -> Option<Label> {
        let mut counts: Vec<(&Label, usize)> = Vec::with_capacity(self.window.len());
        for label in &self.window {
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label, 1)),
            }
        }

        let mut best: Option<(&Label, usize)> = None;
        for (label, n) in counts {
            match best {
                // Strictly greater: first-seen label keeps the tie.
                Some((_, best_n)) if n <= best_n => {}
                _ => best = Some((label, n)),
            }
        }
        best.map(|(label, _)| label.clone())
    }

    /// Number of labels currently in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window capacity K.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all window contents.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Label {
        Label::new(s)
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut filter = StabilityFilter::new(3);
        for i in 0..10 {
            filter.append(label(&format!("l{i}")));
            assert!(filter.len() <= 3);
        }
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_output_is_in_window() {
        let mut filter = StabilityFilter::new(3);
        let labels = ["sad", "happy", "sad", "neutral", "fear", "fear"];
        for (i, l) in labels.iter().enumerate() {
            let stable = filter.append(label(l));
            let window: Vec<&str> = labels[i.saturating_sub(2)..=i].to_vec();
            assert!(window.contains(&stable.as_str()));
        }
    }

    #[test]
    fn test_majority_wins() {
        let mut filter = StabilityFilter::new(3);
        filter.append(label("sad"));
        filter.append(label("sad"));
        let stable = filter.append(label("happy"));
        assert_eq!(stable.as_str(), "sad");
    }

    #[test]
    fn test_tie_break_first_seen_wins() {
        let mut filter = StabilityFilter::new(3);
        filter.append(label("a"));
        filter.append(label("b"));
        let stable = filter.append(label("c"));
        // All counts equal; the oldest distinct value wins.
        assert_eq!(stable.as_str(), "a");
    }

    #[test]
    fn test_tie_break_after_eviction() {
        let mut filter = StabilityFilter::new(3);
        filter.append(label("a"));
        filter.append(label("b"));
        filter.append(label("c"));
        // Window is now [b, c, d]: "a" evicted, first-seen is "b".
        let stable = filter.append(label("d"));
        assert_eq!(stable.as_str(), "b");
    }

    #[test]
    fn test_partial_window_has_plurality() {
        let mut filter = StabilityFilter::new(5);
        let stable = filter.append(label("fear"));
        assert_eq!(stable.as_str(), "fear");
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_empty_window_has_no_stable() {
        let filter = StabilityFilter::new(3);
        assert!(filter.stable().is_none());
    }

    #[test]
    fn test_capacity_of_one_tracks_latest() {
        let mut filter = StabilityFilter::new(1);
        assert_eq!(filter.append(label("sad")).as_str(), "sad");
        assert_eq!(filter.append(label("happy")).as_str(), "happy");
    }

    #[test]
    fn test_clear_empties_window() {
        let mut filter = StabilityFilter::new(3);
        filter.append(label("sad"));
        filter.clear();
        assert!(filter.is_empty());
        assert!(filter.stable().is_none());
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut filter = StabilityFilter::new(0);
        assert_eq!(filter.capacity(), 1);
        assert_eq!(filter.append(label("sad")).as_str(), "sad");
    }
}
