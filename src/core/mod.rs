//! Core state logic for a participant session.
//!
//! This module contains:
//! - Stability filtering of noisy per-frame labels into a stable label
//! - The trouble debounce state machine
//! - The local read-model of room membership

pub mod debounce;
pub mod roster;
pub mod stability;

// Re-export commonly used types
pub use debounce::{DebounceMachine, DistressState};
pub use roster::RosterView;
pub use stability::StabilityFilter;
