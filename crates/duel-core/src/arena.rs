use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::duel::Match;
use crate::error::DuelError;
use crate::queue::{MatchQueue, PlayerRef};
use crate::rules::DuelRules;

/// Result of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player is in an open match, either just created or already running.
    Matched {
        match_id: String,
        opponent: PlayerRef,
        seat: usize,
        created: bool,
    },
    /// No opponent available; the player waits in the queue.
    Queued { refreshed: bool },
}

/// Where a player currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaStatus {
    InMatch(String),
    Matching,
    Idle,
}

/// The pending queue together with every known match. Joining touches both,
/// so they are kept and persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    queue: MatchQueue,
    matches: Vec<Match>,
}

impl Arena {
    /// Pair `player` with the earliest valid waiting opponent, or queue them.
    pub fn join(
        &mut self,
        player: PlayerRef,
        rules: &DuelRules,
        total_questions: usize,
        match_id: String,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        self.queue.prune(now);

        if let Some(existing) = self.open_match_for(player.id) {
            let seat = existing.seat_of(player.id).unwrap_or(0);
            return JoinOutcome::Matched {
                match_id: existing.match_id.clone(),
                opponent: existing.players[1 - seat].clone(),
                seat,
                created: false,
            };
        }

        match self.queue.take_opponent(player.id, now) {
            Some(waiting) => {
                self.queue.remove(player.id);
                let opponent = waiting.player();
                let duel = Match::new(
                    match_id.clone(),
                    [opponent.clone(), player],
                    rules.starting_hp,
                    total_questions,
                    now,
                );
                self.matches.push(duel);
                JoinOutcome::Matched {
                    match_id,
                    opponent,
                    seat: 1,
                    created: true,
                }
            }
            None => {
                let added = self.queue.enqueue(&player, now, rules.pending_ttl);
                JoinOutcome::Queued { refreshed: !added }
            }
        }
    }

    pub fn status(&self, player_id: i64, now: DateTime<Utc>) -> ArenaStatus {
        if let Some(m) = self.open_match_for(player_id) {
            ArenaStatus::InMatch(m.match_id.clone())
        } else if self.queue.is_pending(player_id, now) {
            ArenaStatus::Matching
        } else {
            ArenaStatus::Idle
        }
    }

    pub fn open_match_for(&self, player_id: i64) -> Option<&Match> {
        self.matches
            .iter()
            .find(|m| !m.is_finished() && m.has_player(player_id))
    }

    pub fn get(&self, match_id: &str) -> Result<&Match, DuelError> {
        self.matches
            .iter()
            .find(|m| m.match_id == match_id)
            .ok_or_else(|| DuelError::MatchNotFound(match_id.to_string()))
    }

    pub fn get_mut(&mut self, match_id: &str) -> Result<&mut Match, DuelError> {
        self.matches
            .iter_mut()
            .find(|m| m.match_id == match_id)
            .ok_or_else(|| DuelError::MatchNotFound(match_id.to_string()))
    }

    /// Forget matches that finished more than `retention` ago.
    pub fn prune_finished(&mut self, now: DateTime<Utc>, retention: TimeDelta) -> usize {
        let before = self.matches.len();
        self.matches
            .retain(|m| m.finished_at.is_none_or(|at| now - at <= retention));
        before - self.matches.len()
    }

    /// Forget open matches nobody has touched for longer than `horizon`.
    pub fn prune_abandoned(&mut self, now: DateTime<Utc>, horizon: TimeDelta) -> usize {
        let before = self.matches.len();
        self.matches.retain(|m| !m.is_abandoned(now, horizon));
        before - self.matches.len()
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64) -> PlayerRef {
        PlayerRef {
            id,
            display_name: format!("player-{id}"),
        }
    }

    fn join(arena: &mut Arena, id: i64, now: DateTime<Utc>) -> JoinOutcome {
        arena.join(player(id), &DuelRules::default(), 17, format!("m-{id}"), now)
    }

    #[test]
    fn two_players_in_sequence_share_one_match() {
        let now = Utc::now();
        let mut arena = Arena::default();

        assert_eq!(join(&mut arena, 1, now), JoinOutcome::Queued { refreshed: false });
        let outcome = join(&mut arena, 2, now + TimeDelta::seconds(5));

        assert_eq!(
            outcome,
            JoinOutcome::Matched {
                match_id: "m-2".into(),
                opponent: player(1),
                seat: 1,
                created: true,
            }
        );
        assert_eq!(arena.matches().len(), 1);
        assert!(arena.queue().is_empty());

        let m = arena.get("m-2").unwrap();
        assert_eq!(m.players[0].id, 1);
        assert_eq!(m.players[1].id, 2);
        assert_eq!(m.hp, [100, 100]);
        assert_eq!(m.current_question_index, 0);
        assert_eq!(m.total_questions, 17);
    }

    #[test]
    fn expired_entries_are_pruned_before_pairing() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);

        let outcome = join(&mut arena, 2, now + TimeDelta::seconds(61));

        assert_eq!(outcome, JoinOutcome::Queued { refreshed: false });
        assert!(arena.matches().is_empty());
        assert_eq!(arena.queue().len(), 1);
        assert_eq!(arena.queue().entries()[0].player_id, 2);
    }

    #[test]
    fn repeated_join_never_pairs_with_self() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);

        let again = join(&mut arena, 1, now + TimeDelta::seconds(1));

        assert_eq!(again, JoinOutcome::Queued { refreshed: true });
        assert_eq!(arena.queue().len(), 1);
        assert!(arena.matches().is_empty());
    }

    #[test]
    fn pairs_form_in_arrival_order() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        let first = join(&mut arena, 2, now);
        assert!(matches!(first, JoinOutcome::Matched { ref opponent, .. } if opponent.id == 1));

        assert_eq!(join(&mut arena, 3, now), JoinOutcome::Queued { refreshed: false });
        let second = join(&mut arena, 4, now);
        assert!(matches!(second, JoinOutcome::Matched { ref opponent, .. } if opponent.id == 3));

        assert_eq!(arena.matches().len(), 2);
        assert!(arena.queue().is_empty());
    }

    #[test]
    fn join_while_in_match_returns_that_match() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        join(&mut arena, 2, now);

        let again = join(&mut arena, 1, now);
        assert_eq!(
            again,
            JoinOutcome::Matched {
                match_id: "m-2".into(),
                opponent: player(2),
                seat: 0,
                created: false,
            }
        );
        assert_eq!(arena.matches().len(), 1);
        assert!(arena.queue().is_empty());
    }

    #[test]
    fn status_classifies_players() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        assert_eq!(arena.status(1, now), ArenaStatus::Matching);
        assert_eq!(arena.status(2, now), ArenaStatus::Idle);

        join(&mut arena, 2, now);
        assert_eq!(arena.status(1, now), ArenaStatus::InMatch("m-2".into()));
        assert_eq!(arena.status(2, now), ArenaStatus::InMatch("m-2".into()));

        arena.get_mut("m-2").unwrap().quit(1, now).unwrap();
        assert_eq!(arena.status(1, now), ArenaStatus::Idle);
    }

    #[test]
    fn expired_pending_entry_reads_as_idle() {
        let now = Utc::now();
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        assert_eq!(arena.status(1, now + TimeDelta::seconds(60)), ArenaStatus::Idle);
    }

    #[test]
    fn finished_matches_are_kept_for_the_retention_window() {
        let now = Utc::now();
        let retention = TimeDelta::seconds(600);
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        join(&mut arena, 2, now);
        join(&mut arena, 3, now);
        join(&mut arena, 4, now);
        arena.get_mut("m-2").unwrap().quit(1, now).unwrap();

        assert_eq!(arena.prune_finished(now + retention, retention), 0);
        assert_eq!(arena.prune_finished(now + retention + TimeDelta::seconds(1), retention), 1);
        assert!(matches!(arena.get("m-2"), Err(DuelError::MatchNotFound(_))));
        assert!(arena.get("m-4").is_ok());
    }

    #[test]
    fn abandoned_matches_release_their_players() {
        let now = Utc::now();
        let horizon = TimeDelta::minutes(30);
        let mut arena = Arena::default();
        join(&mut arena, 1, now);
        join(&mut arena, 2, now);
        join(&mut arena, 3, now);
        join(&mut arena, 4, now);
        arena
            .get_mut("m-4")
            .unwrap()
            .heartbeat(3, now + TimeDelta::minutes(20))
            .unwrap();

        let later = now + horizon + TimeDelta::seconds(1);
        assert_eq!(arena.prune_abandoned(later, horizon), 1);
        assert!(matches!(arena.get("m-2"), Err(DuelError::MatchNotFound(_))));
        assert!(arena.get("m-4").is_ok());

        assert_eq!(join(&mut arena, 1, later), JoinOutcome::Queued { refreshed: false });
    }
}
