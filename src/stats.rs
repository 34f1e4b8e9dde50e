//! Session activity counters.
//!
//! Tracks what a session actually did (frames sampled, classifications
//! failed, intents sent) so a participant can see the agent working without
//! any of it leaving the machine unless they export it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current session.
#[derive(Debug)]
pub struct SessionStats {
    /// Sampling ticks that produced a frame
    frames_sampled: AtomicU64,
    /// Sampling ticks skipped (no frame ready)
    ticks_skipped: AtomicU64,
    /// Classification round-trips that failed
    classify_failures: AtomicU64,
    /// Labels folded into the stability window
    labels_applied: AtomicU64,
    /// Trouble/resolved intents sent
    intents_sent: AtomicU64,
    /// Room events received (keepalives included)
    events_received: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting counters
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            frames_sampled: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            classify_failures: AtomicU64::new(0),
            labels_applied: AtomicU64::new(0),
            intents_sent: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters persisted to (and seeded from) the given path.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);
        if let Err(e) = stats.load() {
            tracing::debug!("no previous session stats loaded: {e}");
        }
        stats
    }

    pub fn record_frame_sampled(&self) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classify_failure(&self) {
        self.classify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_label_applied(&self) {
        self.labels_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_sent(&self) {
        self.intents_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            classify_failures: self.classify_failures.load(Ordering::Relaxed),
            labels_applied: self.labels_applied.load(Ordering::Relaxed),
            intents_sent: self.intents_sent.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Frames sampled: {}\n\
             - Ticks skipped: {}\n\
             - Classification failures: {}\n\
             - Labels applied: {}\n\
             - Intents sent: {}\n\
             - Room events received: {}\n\
             - Session duration: {} seconds",
            snapshot.frames_sampled,
            snapshot.ticks_skipped,
            snapshot.classify_failures,
            snapshot.labels_applied,
            snapshot.intents_sent,
            snapshot.events_received,
            snapshot.session_duration_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let snapshot = self.snapshot();
            let json = serde_json::to_string_pretty(&snapshot).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load counters from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let snapshot: StatsSnapshot =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_sampled
                    .store(snapshot.frames_sampled, Ordering::Relaxed);
                self.ticks_skipped
                    .store(snapshot.ticks_skipped, Ordering::Relaxed);
                self.classify_failures
                    .store(snapshot.classify_failures, Ordering::Relaxed);
                self.labels_applied
                    .store(snapshot.labels_applied, Ordering::Relaxed);
                self.intents_sent
                    .store(snapshot.intents_sent, Ordering::Relaxed);
                self.events_received
                    .store(snapshot.events_received, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.frames_sampled.store(0, Ordering::Relaxed);
        self.ticks_skipped.store(0, Ordering::Relaxed);
        self.classify_failures.store(0, Ordering::Relaxed);
        self.labels_applied.store(0, Ordering::Relaxed);
        self.intents_sent.store(0, Ordering::Relaxed);
        self.events_received.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_sampled: u64,
    pub ticks_skipped: u64,
    pub classify_failures: u64,
    pub labels_applied: u64,
    pub intents_sent: u64,
    pub events_received: u64,
    pub session_start: DateTime<Utc>,
    #[serde(default)]
    pub session_duration_secs: u64,
}

/// Thread-safe shared session counters.
pub type SharedSessionStats = Arc<SessionStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counting() {
        let stats = SessionStats::new();

        stats.record_frame_sampled();
        stats.record_frame_sampled();
        stats.record_intent_sent();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sampled, 2);
        assert_eq!(snapshot.intents_sent, 1);
        assert_eq!(snapshot.classify_failures, 0);
    }

    #[test]
    fn test_stats_reset() {
        let stats = SessionStats::new();
        stats.record_event_received();
        stats.record_tick_skipped();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 0);
        assert_eq!(snapshot.ticks_skipped, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = SessionStats::new();
        stats.record_label_applied();
        let summary = stats.summary();

        assert!(summary.contains("Frames sampled"));
        assert!(summary.contains("Labels applied: 1"));
        assert!(summary.contains("Intents sent"));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let path = std::env::temp_dir().join("troublewatch-stats-test.json");
        let _ = std::fs::remove_file(&path);

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_intent_sent();
        stats.save().unwrap();

        let reloaded = SessionStats::with_persistence(path.clone());
        assert_eq!(reloaded.snapshot().intents_sent, 1);

        let _ = std::fs::remove_file(&path);
    }
}
