//! Trouble debounce state machine.
//!
//! Turns stable-label transitions into at-most-one outstanding distress
//! report per episode:
//!
//! - **Confirmation window**: distress must persist for the configured
//!   duration before a `trouble` intent fires; a transient dip back to a
//!   non-distress label cancels the pending report silently.
//! - **Latch**: once `Troubled`, further label changes are ignored. Only an
//!   explicit [`resolve`] clears the state and emits `resolved`.
//!
//! The machine is pure with respect to time: callers pass `now` in, and the
//! pending deadline is exposed so an event loop can schedule its own wakeup.
//! Nothing here spawns timers, so session teardown cancels a pending report
//! by dropping (or [`reset`]ting) the machine.
//!
//! [`resolve`]: DebounceMachine::resolve
//! [`reset`]: DebounceMachine::reset

use crate::channel::PresenceIntent;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Distress reporting state for the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistressState {
    /// No distress observed.
    Normal,
    /// Distress observed; waiting out the confirmation window.
    PendingConfirmation,
    /// A trouble report is outstanding until explicitly resolved.
    Troubled,
}

/// Debounce state machine, one instance per local participant.
#[derive(Debug, Clone)]
pub struct DebounceMachine {
    state: DistressState,
    pending_since: Option<DateTime<Utc>>,
    confirm_after: TimeDelta,
}

impl DebounceMachine {
    /// Create a machine requiring distress to persist for `confirm_after`.
    pub fn new(confirm_after: Duration) -> Self {
        Self {
            state: DistressState::Normal,
            pending_since: None,
            confirm_after: TimeDelta::milliseconds(confirm_after.as_millis() as i64),
        }
    }

    /// The current state.
    pub fn state(&self) -> DistressState {
        self.state
    }

    /// Feed one stable-label observation.
    ///
    /// `distress` is whether the stable label is in the distress set. Never
    /// emits; firing happens in [`tick`](DebounceMachine::tick) once the
    /// confirmation window elapses.
    pub fn observe(&mut self, distress: bool, now: DateTime<Utc>) {
        match self.state {
            DistressState::Normal => {
                if distress {
                    self.state = DistressState::PendingConfirmation;
                    self.pending_since = Some(now);
                }
            }
            DistressState::PendingConfirmation => {
                if !distress {
                    // Anti-flicker: the dip cancels the pending report.
                    self.state = DistressState::Normal;
                    self.pending_since = None;
                }
                // Continued distress keeps the original window running.
            }
            DistressState::Troubled => {
                // Latched: label changes neither re-fire nor auto-clear.
            }
        }
    }

    /// When the pending confirmation window elapses, if one is running.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.pending_since.map(|since| since + self.confirm_after)
    }

    /// Advance the clock; fires the `trouble` intent exactly once when the
    /// confirmation window has fully elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<PresenceIntent> {
        match (self.state, self.deadline()) {
            (DistressState::PendingConfirmation, Some(deadline)) if now >= deadline => {
                self.state = DistressState::Troubled;
                self.pending_since = None;
                Some(PresenceIntent::Trouble)
            }
            _ => None,
        }
    }

    /// Explicitly clear an outstanding trouble report.
    ///
    /// Only meaningful in `Troubled`; in any other state this is a no-op, so
    /// double resolution is harmless. A new episode afterwards runs the full
    /// confirmation window again.
    pub fn resolve(&mut self) -> Option<PresenceIntent> {
        match self.state {
            DistressState::Troubled => {
                self.state = DistressState::Normal;
                self.pending_since = None;
                Some(PresenceIntent::Resolved)
            }
            _ => None,
        }
    }

    /// Cancel everything without emitting; used on session teardown so a
    /// pending window can never fire afterwards.
    pub fn reset(&mut self) {
        self.state = DistressState::Normal;
        self.pending_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid RFC3339")
            .with_timezone(&Utc)
    }

    fn t0() -> DateTime<Utc> {
        ts("2026-03-01T09:00:00Z")
    }

    const T: Duration = Duration::from_millis(1000);

    #[test]
    fn test_distress_arms_pending() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        assert_eq!(machine.state(), DistressState::PendingConfirmation);
        assert_eq!(machine.deadline(), Some(t0() + TimeDelta::milliseconds(1000)));
    }

    #[test]
    fn test_dip_cancels_without_firing() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.observe(false, t0() + TimeDelta::milliseconds(400));

        assert_eq!(machine.state(), DistressState::Normal);
        assert!(machine.deadline().is_none());
        // Even long after the original deadline, nothing fires.
        assert!(machine.tick(t0() + TimeDelta::milliseconds(5000)).is_none());
    }

    #[test]
    fn test_sustained_distress_fires_exactly_once() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.observe(true, t0() + TimeDelta::milliseconds(500));

        assert!(machine.tick(t0() + TimeDelta::milliseconds(900)).is_none());
        assert_eq!(
            machine.tick(t0() + TimeDelta::milliseconds(1000)),
            Some(PresenceIntent::Trouble)
        );
        assert_eq!(machine.state(), DistressState::Troubled);

        // Latched: no second report while troubled.
        assert!(machine.tick(t0() + TimeDelta::milliseconds(2000)).is_none());
        machine.observe(true, t0() + TimeDelta::milliseconds(2500));
        assert!(machine.tick(t0() + TimeDelta::milliseconds(4000)).is_none());
    }

    #[test]
    fn test_window_runs_from_first_distress_observation() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        // Later distress observations do not restart the window.
        machine.observe(true, t0() + TimeDelta::milliseconds(800));
        assert_eq!(
            machine.tick(t0() + TimeDelta::milliseconds(1000)),
            Some(PresenceIntent::Trouble)
        );
    }

    #[test]
    fn test_non_distress_does_not_clear_latch() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.tick(t0() + TimeDelta::milliseconds(1000));
        assert_eq!(machine.state(), DistressState::Troubled);

        machine.observe(false, t0() + TimeDelta::milliseconds(1500));
        assert_eq!(machine.state(), DistressState::Troubled);
    }

    #[test]
    fn test_resolve_emits_once_then_noop() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.tick(t0() + TimeDelta::milliseconds(1000));

        assert_eq!(machine.resolve(), Some(PresenceIntent::Resolved));
        assert_eq!(machine.state(), DistressState::Normal);
        assert_eq!(machine.resolve(), None);
    }

    #[test]
    fn test_resolve_in_normal_and_pending_is_noop() {
        let mut machine = DebounceMachine::new(T);
        assert_eq!(machine.resolve(), None);

        machine.observe(true, t0());
        assert_eq!(machine.resolve(), None);
        // The pending window is untouched by the stray resolve.
        assert_eq!(machine.state(), DistressState::PendingConfirmation);
    }

    #[test]
    fn test_reentry_after_resolve_requires_full_window() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.tick(t0() + TimeDelta::milliseconds(1000));
        machine.resolve();

        let t1 = t0() + TimeDelta::milliseconds(2000);
        machine.observe(true, t1);
        assert!(machine.tick(t1 + TimeDelta::milliseconds(900)).is_none());
        assert_eq!(
            machine.tick(t1 + TimeDelta::milliseconds(1000)),
            Some(PresenceIntent::Trouble)
        );
    }

    #[test]
    fn test_reset_cancels_pending_window() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.reset();

        assert_eq!(machine.state(), DistressState::Normal);
        assert!(machine.deadline().is_none());
        assert!(machine.tick(t0() + TimeDelta::milliseconds(5000)).is_none());
    }

    #[test]
    fn test_reset_drops_latch_without_emitting() {
        let mut machine = DebounceMachine::new(T);
        machine.observe(true, t0());
        machine.tick(t0() + TimeDelta::milliseconds(1000));
        machine.reset();

        assert_eq!(machine.state(), DistressState::Normal);
        assert_eq!(machine.resolve(), None);
    }
}
