//! Troublewatch - room presence agent with distress flagging.
//!
//! Each participant's device watches its own camera feed, smooths the noisy
//! per-frame expression classifications into a stable label, and reports
//! sustained distress to everyone else in the room. The flag stays up until
//! the participant explicitly clears it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Participant Session                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐               │
//! │  │ Classifier│──▶│ Stability │──▶│ Debounce  │               │
//! │  │  (remote) │   │  Filter   │   │  Machine  │               │
//! │  └───────────┘   └───────────┘   └─────┬─────┘               │
//! │        ▲                               │ trouble/resolved    │
//! │  ┌─────┴─────┐   ┌───────────┐   ┌─────▼─────┐               │
//! │  │   Frame   │   │  Roster   │◀──│ Presence  │◀─▶ room       │
//! │  │  Source   │   │   View    │   │  Channel  │    authority  │
//! │  └───────────┘   └───────────┘   └───────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The presence channel is the only boundary the session depends on; the
//! request/stream hybrid, the persistent socket, and the in-process bus all
//! satisfy the same contract, so the surrounding logic never changes when
//! the transport does.
//!
//! # Example
//!
//! ```no_run
//! use troublewatch::channel::MemoryBus;
//! use troublewatch::classify::ScriptedClassifier;
//! use troublewatch::camera::SilentFrameSource;
//! use troublewatch::config::Config;
//! use troublewatch::session;
//!
//! let bus = MemoryBus::new();
//! let channel = bus.connect("lobby", "aki");
//!
//! let handle = session::spawn(
//!     "aki",
//!     Config::default(),
//!     Box::new(ScriptedClassifier::holding(["neutral"])),
//!     Box::new(SilentFrameSource),
//!     Box::new(channel),
//! );
//!
//! // ... later
//! handle.resolve();
//! handle.shutdown();
//! ```

pub mod camera;
pub mod channel;
pub mod classify;
pub mod config;
pub mod core;
pub mod session;
pub mod stats;

#[cfg(feature = "authority")]
pub mod authority;

// Re-export key types at crate root for convenience
pub use camera::{FrameSource, SilentFrameSource, StillFrameSource};
pub use channel::{
    ChannelError, HttpChannel, HttpChannelConfig, MemoryBus, MemoryChannel, PresenceChannel,
    PresenceIntent, RoomEvent, RoomMember,
};
pub use classify::{BlockingClassifier, Classifier, ClassifierConfig, ClassifierError, Label};
pub use config::{Config, ConfigError};
pub use self::core::{DebounceMachine, DistressState, RosterView, StabilityFilter};
pub use session::{SessionHandle, SessionNotice};
pub use stats::{SessionStats, SharedSessionStats, StatsSnapshot};

#[cfg(feature = "ws")]
pub use channel::WsChannel;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
