use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A player as the duel sees them: id plus the name shown to the opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: i64,
    pub display_name: String,
}

/// A queued matchmaking intent awaiting an opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub player_id: i64,
    pub display_name: String,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn player(&self) -> PlayerRef {
        PlayerRef {
            id: self.player_id,
            display_name: self.display_name.clone(),
        }
    }
}

/// FIFO list of players waiting for an opponent. Holds at most one entry
/// per player id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchQueue {
    entries: Vec<PendingRequest>,
}

impl MatchQueue {
    /// Drop every entry whose expiry has passed. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_expired(now));
        before - self.entries.len()
    }

    /// Remove and return the earliest still-valid entry belonging to someone
    /// other than `player_id`.
    pub fn take_opponent(&mut self, player_id: i64, now: DateTime<Utc>) -> Option<PendingRequest> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.player_id != player_id && !e.is_expired(now))?;
        Some(self.entries.remove(idx))
    }

    /// Queue a player, or refresh the expiry of their existing entry in place.
    /// Returns `true` when a new entry was added.
    pub fn enqueue(&mut self, player: &PlayerRef, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.player_id == player.id) {
            existing.expires_at = now + ttl;
            existing.display_name = player.display_name.clone();
            return false;
        }

        self.entries.push(PendingRequest {
            player_id: player.id,
            display_name: player.display_name.clone(),
            enqueued_at: now,
            expires_at: now + ttl,
        });
        true
    }

    pub fn remove(&mut self, player_id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.player_id != player_id);
        before != self.entries.len()
    }

    /// Whether the player holds an unexpired entry.
    pub fn is_pending(&self, player_id: i64, now: DateTime<Utc>) -> bool {
        self.entries
            .iter()
            .any(|e| e.player_id == player_id && !e.is_expired(now))
    }

    pub fn entries(&self) -> &[PendingRequest] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
