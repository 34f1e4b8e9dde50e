//! Local read-model of room membership.
//!
//! Purely a projection of what the presence authority last broadcast: each
//! `members` event replaces the whole set. Join/leave/trouble/resolved events
//! are informational only; inferring membership from them locally would let
//! an optimistic patch diverge from the authoritative next snapshot.

use crate::channel::{RoomEvent, RoomMember};

/// Mirror of the authority's member set for one room.
#[derive(Debug, Clone, Default)]
pub struct RosterView {
    members: Vec<RoomMember>,
    stale: bool,
}

impl RosterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an inbound event; returns true when the member set was replaced.
    pub fn apply(&mut self, event: &RoomEvent) -> bool {
        match event {
            RoomEvent::Members { users } => {
                self.members = users.clone();
                self.stale = false;
                true
            }
            _ => false,
        }
    }

    /// Mark the view stale (transport dropped); cleared by the next snapshot.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether the view may lag the authority.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Current members in snapshot order.
    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    /// Look up a member by identity.
    pub fn get(&self, user: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.user == user)
    }

    /// Whether the named member is currently flagged as troubled.
    pub fn is_troubled(&self, user: &str) -> bool {
        self.get(user).map(|m| m.troubled).unwrap_or(false)
    }
}
