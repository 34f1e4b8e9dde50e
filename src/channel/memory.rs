//! In-process event-bus transport.
//!
//! The bus plays both roles at once: it is the presence authority (it owns a
//! [`RoomLedger`] per room) and the transport fabric (crossbeam fan-out to
//! every subscriber). Used by tests, demos, and anything colocating several
//! participants in one process.

use crate::channel::room::RoomLedger;
use crate::channel::{ChannelError, PresenceChannel, PresenceIntent, RoomEvent, RoomMember};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared in-process room fabric.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    rooms: HashMap<String, BusRoom>,
}

#[derive(Default)]
struct BusRoom {
    ledger: RoomLedger,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    token: String,
    user: String,
    tx: Sender<RoomEvent>,
    open: Arc<AtomicBool>,
}

impl BusRoom {
    fn broadcast(&self, events: &[RoomEvent]) {
        for sub in &self.subscribers {
            if !sub.open.load(Ordering::SeqCst) {
                continue;
            }
            for event in events {
                let _ = sub.tx.send(event.clone());
            }
        }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish a logical subscription for `user` in `room`.
    pub fn connect(&self, room: &str, user: &str) -> MemoryChannel {
        let token = uuid::Uuid::new_v4().to_string();
        let (events_tx, events_rx) = unbounded();
        let (errors_tx, errors_rx) = unbounded();
        let open = Arc::new(AtomicBool::new(true));

        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let slot = state.rooms.entry(room.to_string()).or_default();

        // Existing subscribers hear the join; the newcomer gets the fresh
        // snapshot directly rather than its own join echo.
        let events = slot.ledger.join(user);
        slot.broadcast(&events);

        let snapshot = slot.ledger.snapshot();
        let _ = events_tx.send(snapshot);

        slot.subscribers.push(Subscriber {
            token: token.clone(),
            user: user.to_string(),
            tx: events_tx.clone(),
            open: open.clone(),
        });
        drop(state);

        MemoryChannel {
            bus: self.clone(),
            room: room.to_string(),
            user: user.to_string(),
            token,
            events_rx,
            _events_tx: events_tx,
            errors_rx,
            _errors_tx: errors_tx,
            open,
            connected: true,
        }
    }

    /// Current member set for a room (authority-side view).
    pub fn members(&self, room: &str) -> Vec<RoomMember> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .rooms
            .get(room)
            .map(|slot| slot.ledger.members().to_vec())
            .unwrap_or_default()
    }

    fn apply_intent(&self, room: &str, user: &str, intent: PresenceIntent) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = state.rooms.get_mut(room) {
            let events = slot.ledger.apply_intent(user, intent);
            slot.broadcast(&events);
        }
    }

    fn unsubscribe(&self, room: &str, token: &str, user: &str) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = state.rooms.get_mut(room) else {
            return;
        };
        slot.subscribers.retain(|s| s.token != token);

        // Membership follows the identity, not the subscription: only the
        // last handle for a user takes the member out of the room.
        if !slot.subscribers.iter().any(|s| s.user == user) {
            let events = slot.ledger.leave(user);
            slot.broadcast(&events);
        }
        if slot.subscribers.is_empty() && slot.ledger.is_empty() {
            state.rooms.remove(room);
        }
    }
}

/// One participant's handle onto the memory bus.
pub struct MemoryChannel {
    bus: MemoryBus,
    room: String,
    user: String,
    token: String,
    events_rx: Receiver<RoomEvent>,
    // Held so the receiver never reports disconnection while the handle lives.
    _events_tx: Sender<RoomEvent>,
    errors_rx: Receiver<ChannelError>,
    _errors_tx: Sender<ChannelError>,
    open: Arc<AtomicBool>,
    connected: bool,
}

impl MemoryChannel {
    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl PresenceChannel for MemoryChannel {
    fn session_token(&self) -> &str {
        &self.token
    }

    fn send(&mut self, intent: PresenceIntent) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Send("channel is disconnected".to_string()));
        }
        self.bus.apply_intent(&self.room, &self.user, intent);
        Ok(())
    }

    fn events(&self) -> Receiver<RoomEvent> {
        self.events_rx.clone()
    }

    fn errors(&self) -> Receiver<ChannelError> {
        self.errors_rx.clone()
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        // Gate first: a broadcast racing this call is suppressed, then the
        // queue is drained so nothing already delivered remains observable.
        self.open.store(false, Ordering::SeqCst);
        self.bus.unsubscribe(&self.room, &self.token, &self.user);
        while self.events_rx.try_recv().is_ok() {}
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &Receiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_connect_delivers_initial_snapshot() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        let events = drain(&channel.events());
        assert_eq!(events.len(), 1);
        match &events[0] {
            RoomEvent::Members { users } => {
                assert_eq!(users, &[RoomMember::new("aki")]);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_peers_hear_joins_and_intents() {
        let bus = MemoryBus::new();
        let a = bus.connect("r1", "aki");
        let _ = drain(&a.events());

        let mut b = bus.connect("r1", "ben");
        let a_events = drain(&a.events());
        assert!(a_events.contains(&RoomEvent::Join {
            user: "ben".to_string()
        }));

        b.send(PresenceIntent::Trouble).unwrap();
        let a_events = drain(&a.events());
        assert!(a_events.contains(&RoomEvent::Trouble {
            user: "ben".to_string()
        }));
        let last_snapshot = a_events
            .iter()
            .rev()
            .find_map(|e| match e {
                RoomEvent::Members { users } => Some(users.clone()),
                _ => None,
            })
            .expect("snapshot after intent");
        assert!(last_snapshot.iter().any(|m| m.user == "ben" && m.troubled));
    }

    #[test]
    fn test_disconnect_suppresses_and_drains() {
        let bus = MemoryBus::new();
        let mut a = bus.connect("r1", "aki");
        let _b = bus.connect("r1", "ben");
        let a_events = a.events();

        a.disconnect();
        assert!(a_events.try_recv().is_err(), "queue drained on disconnect");

        // Later room activity is invisible to the closed handle.
        let mut c = bus.connect("r1", "chi");
        c.send(PresenceIntent::Trouble).unwrap();
        assert!(a_events.try_recv().is_err());
    }

    #[test]
    fn test_send_after_disconnect_is_an_error() {
        let bus = MemoryBus::new();
        let mut a = bus.connect("r1", "aki");
        a.disconnect();
        assert!(a.send(PresenceIntent::Trouble).is_err());
    }

    #[test]
    fn test_reconnect_same_identity_not_duplicated() {
        let bus = MemoryBus::new();
        let first = bus.connect("r1", "aki");
        let second = bus.connect("r1", "aki");
        assert_ne!(first.session_token(), second.session_token());
        assert_eq!(bus.members("r1").len(), 1);

        // Dropping one handle keeps the identity in the room.
        drop(first);
        assert_eq!(bus.members("r1").len(), 1);
        drop(second);
        assert!(bus.members("r1").is_empty());
    }

    #[test]
    fn test_leave_broadcast_to_remaining_peers() {
        let bus = MemoryBus::new();
        let a = bus.connect("r1", "aki");
        let b = bus.connect("r1", "ben");
        let _ = drain(&a.events());

        drop(b);
        let events = drain(&a.events());
        assert!(events.contains(&RoomEvent::Leave {
            user: "ben".to_string()
        }));
    }
}
