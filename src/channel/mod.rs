//! Presence synchronization channel.
//!
//! The one boundary the rest of the session depends on. Any transport, be it
//! the request/stream hybrid, a persistent socket, or an in-process bus,
//! satisfies the same contract:
//!
//! - connecting yields a handle with an opaque session token (enough for the
//!   authority to deduplicate reconnects by identity);
//! - [`send`] delivers intents at least once, ordered relative to this
//!   participant's own prior sends (a single FIFO outbound worker per
//!   transport), with no cross-participant ordering;
//! - inbound events and transport errors arrive on channel receivers the
//!   session folds into its serialized queue;
//! - [`disconnect`] gates and drains delivery so nothing is observable
//!   afterwards, even for events already in flight.
//!
//! [`send`]: PresenceChannel::send
//! [`disconnect`]: PresenceChannel::disconnect

pub mod http;
pub mod memory;
pub mod room;

#[cfg(feature = "ws")]
pub mod ws;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use http::{HttpChannel, HttpChannelConfig};
pub use memory::{MemoryBus, MemoryChannel};
pub use room::RoomLedger;

#[cfg(feature = "ws")]
pub use ws::WsChannel;

/// Outbound distress signal for the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceIntent {
    Trouble,
    Resolved,
}

/// One participant as the authority last reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user: String,
    pub troubled: bool,
}

impl RoomMember {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            troubled: false,
        }
    }
}

/// Inbound room event.
///
/// `members` always carries the full current set and is applied as a total
/// replacement, never a diff. `ping` is transport keepalive; consumers must
/// ignore it rather than surface it as a domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoomEvent {
    Members { users: Vec<RoomMember> },
    Join { user: String },
    Leave { user: String },
    Trouble { user: String },
    Resolved { user: String },
    Ping,
}

/// Channel error types.
#[derive(Debug, Clone)]
pub enum ChannelError {
    /// Connect or handshake failure
    Connect(String),
    /// An intent could not be delivered
    Send(String),
    /// The inbound stream dropped
    Dropped(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Connect(msg) => write!(f, "Channel connect error: {msg}"),
            ChannelError::Send(msg) => write!(f, "Channel send error: {msg}"),
            ChannelError::Dropped(msg) => write!(f, "Channel stream dropped: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Bidirectional event conduit between one participant and its room.
pub trait PresenceChannel: Send {
    /// Opaque token identifying this logical subscription.
    fn session_token(&self) -> &str;

    /// Queue an intent for delivery. Ordered after this participant's prior
    /// sends; failures surface on [`errors`](PresenceChannel::errors) or as
    /// an immediate error when the channel is already disconnected.
    fn send(&mut self, intent: PresenceIntent) -> Result<(), ChannelError>;

    /// Inbound room events. The receiver stays connected for the lifetime of
    /// the handle; after [`disconnect`](PresenceChannel::disconnect) it
    /// yields nothing further.
    fn events(&self) -> Receiver<RoomEvent>;

    /// Transport-level failures, reported without crashing anything.
    fn errors(&self) -> Receiver<ChannelError>;

    /// Release the conduit. Idempotent; suppresses any event still in
    /// flight, not merely future ones.
    fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_event_wire_shape() {
        let event = RoomEvent::Members {
            users: vec![RoomMember {
                user: "aki".to_string(),
                troubled: true,
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"members","users":[{"user":"aki","troubled":true}]}"#
        );
    }

    #[test]
    fn test_room_event_parses_tagged_kinds() {
        let event: RoomEvent = serde_json::from_str(r#"{"type":"trouble","user":"aki"}"#).unwrap();
        assert_eq!(
            event,
            RoomEvent::Trouble {
                user: "aki".to_string()
            }
        );

        let ping: RoomEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, RoomEvent::Ping);
    }

    #[test]
    fn test_intent_wire_shape() {
        assert_eq!(
            serde_json::to_string(&PresenceIntent::Trouble).unwrap(),
            r#"{"type":"trouble"}"#
        );
        assert_eq!(
            serde_json::to_string(&PresenceIntent::Resolved).unwrap(),
            r#"{"type":"resolved"}"#
        );
    }

    #[test]
    fn test_malformed_event_is_an_error() {
        assert!(serde_json::from_str::<RoomEvent>(r#"{"kind":"members"}"#).is_err());
        assert!(serde_json::from_str::<RoomEvent>("not json").is_err());
    }
}
