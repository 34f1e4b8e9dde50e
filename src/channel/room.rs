//! Authoritative room state transitions.
//!
//! Shared by every in-process authority (the memory bus and the reference
//! server): a plain member set plus the events each mutation broadcasts.
//! Every mutation ends with a fresh full `members` snapshot so mirrors stay
//! trivially consistent.

use crate::channel::{PresenceIntent, RoomEvent, RoomMember};

/// The canonical member set for one room.
#[derive(Debug, Clone, Default)]
pub struct RoomLedger {
    members: Vec<RoomMember>,
}

impl RoomLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a participant. Rejoining under the same identity is not a
    /// duplicate; the caller just gets a fresh snapshot.
    pub fn join(&mut self, user: &str) -> Vec<RoomEvent> {
        if self.members.iter().any(|m| m.user == user) {
            return vec![self.snapshot()];
        }
        self.members.push(RoomMember::new(user));
        vec![
            RoomEvent::Join {
                user: user.to_string(),
            },
            self.snapshot(),
        ]
    }

    /// Remove a participant. Unknown identities are a no-op.
    pub fn leave(&mut self, user: &str) -> Vec<RoomEvent> {
        let before = self.members.len();
        self.members.retain(|m| m.user != user);
        if self.members.len() == before {
            return Vec::new();
        }
        vec![
            RoomEvent::Leave {
                user: user.to_string(),
            },
            self.snapshot(),
        ]
    }

    /// Apply a distress intent from a participant. Intents from identities
    /// not in the room are absorbed silently.
    pub fn apply_intent(&mut self, user: &str, intent: PresenceIntent) -> Vec<RoomEvent> {
        let Some(member) = self.members.iter_mut().find(|m| m.user == user) else {
            return Vec::new();
        };
        match intent {
            PresenceIntent::Trouble => {
                member.troubled = true;
                vec![
                    RoomEvent::Trouble {
                        user: user.to_string(),
                    },
                    self.snapshot(),
                ]
            }
            PresenceIntent::Resolved => {
                member.troubled = false;
                vec![
                    RoomEvent::Resolved {
                        user: user.to_string(),
                    },
                    self.snapshot(),
                ]
            }
        }
    }

    /// Full current member set as a broadcastable event.
    pub fn snapshot(&self) -> RoomEvent {
        RoomEvent::Members {
            users: self.members.clone(),
        }
    }

    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_emits_join_then_snapshot() {
        let mut ledger = RoomLedger::new();
        let events = ledger.join("aki");
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RoomEvent::Join {
                user: "aki".to_string()
            }
        );
        match &events[1] {
            RoomEvent::Members { users } => assert_eq!(users.len(), 1),
            other => panic!("expected members snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_rejoin_is_not_a_duplicate() {
        let mut ledger = RoomLedger::new();
        ledger.join("aki");
        let events = ledger.join("aki");

        assert_eq!(ledger.members().len(), 1);
        // Only a fresh snapshot, no second join broadcast.
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RoomEvent::Members { .. }));
    }

    #[test]
    fn test_trouble_and_resolve_flip_flag() {
        let mut ledger = RoomLedger::new();
        ledger.join("aki");

        ledger.apply_intent("aki", PresenceIntent::Trouble);
        assert!(ledger.members()[0].troubled);

        ledger.apply_intent("aki", PresenceIntent::Resolved);
        assert!(!ledger.members()[0].troubled);
    }

    #[test]
    fn test_intent_from_unknown_identity_absorbed() {
        let mut ledger = RoomLedger::new();
        let events = ledger.apply_intent("ghost", PresenceIntent::Trouble);
        assert!(events.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_leave_unknown_identity_is_noop() {
        let mut ledger = RoomLedger::new();
        ledger.join("aki");
        assert!(ledger.leave("ghost").is_empty());
        assert_eq!(ledger.members().len(), 1);
    }

    #[test]
    fn test_leave_drops_member() {
        let mut ledger = RoomLedger::new();
        ledger.join("aki");
        ledger.join("ben");

        let events = ledger.leave("aki");
        assert_eq!(
            events[0],
            RoomEvent::Leave {
                user: "aki".to_string()
            }
        );
        assert_eq!(ledger.members().len(), 1);
        assert_eq!(ledger.members()[0].user, "ben");
    }
}
