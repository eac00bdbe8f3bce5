use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use duel_core::protocol::{
    AnswerResponse, CheckResponse, JoinResponse, PlayerStatus, RosterEntry, StateResponse,
    SuccessResponse,
};
use duel_core::{
    Arena, ArenaStatus, Clock, DuelError, DuelRules, GoldSource, InventoryItem, JoinOutcome,
    Match, PlayerProfile, PlayerRef, ProfileBook, QuestionBank, RandomGold, Submission,
    SystemClock, Winner,
};

use crate::store::{
    ARENA_SNAPSHOT, Directory, DuelStore, Identity, PROFILES_SNAPSHOT, StoreError,
};

/// What a match mutation requires from the commit step.
enum Effect {
    /// Nothing changed; skip the write.
    Unchanged,
    Changed,
    /// The match just ended; the winner's profile is updated in the same commit.
    Finished(Winner),
}

fn encode<T: Serialize>(name: &'static str, value: &T) -> Result<(&'static str, String), StoreError> {
    Ok((name, serde_json::to_string(value)?))
}

async fn decode<T: serde::de::DeserializeOwned + Default>(
    store: &dyn DuelStore,
    name: &str,
) -> Result<T, StoreError> {
    match store.load(name).await? {
        Some(body) => Ok(serde_json::from_str(&body)?),
        None => Ok(T::default()),
    }
}

/// The duel state machine.
///
/// The arena (queue + matches) and the profile book each sit behind their
/// own mutex; when both are needed the arena is locked first. Every mutation
/// works on a copy which is committed to the store and only then swapped in,
/// so a failed commit changes nothing.
pub struct DuelEngine {
    arena: Mutex<Arena>,
    profiles: Mutex<ProfileBook>,
    questions: QuestionBank,
    rules: DuelRules,
    store: Arc<dyn DuelStore>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    gold: Arc<dyn GoldSource>,
}

pub struct EngineBuilder {
    store: Arc<dyn DuelStore>,
    directory: Arc<dyn Directory>,
    questions: QuestionBank,
    rules: DuelRules,
    clock: Arc<dyn Clock>,
    gold: Arc<dyn GoldSource>,
}

impl EngineBuilder {
    pub fn questions(mut self, questions: QuestionBank) -> Self {
        self.questions = questions;
        self
    }

    pub fn rules(mut self, rules: DuelRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gold(mut self, gold: Arc<dyn GoldSource>) -> Self {
        self.gold = gold;
        self
    }

    /// Restore persisted state and return the engine.
    pub async fn build(self) -> Result<DuelEngine, StoreError> {
        let arena: Arena = decode(self.store.as_ref(), ARENA_SNAPSHOT).await?;
        let profiles: ProfileBook = decode(self.store.as_ref(), PROFILES_SNAPSHOT).await?;
        info!(
            matches = arena.matches().len(),
            pending = arena.queue().len(),
            profiles = profiles.len(),
            questions = self.questions.len(),
            "duel engine loaded"
        );

        Ok(DuelEngine {
            arena: Mutex::new(arena),
            profiles: Mutex::new(profiles),
            questions: self.questions,
            rules: self.rules,
            store: self.store,
            directory: self.directory,
            clock: self.clock,
            gold: self.gold,
        })
    }
}

impl DuelEngine {
    pub fn builder(store: Arc<dyn DuelStore>, directory: Arc<dyn Directory>) -> EngineBuilder {
        EngineBuilder {
            store,
            directory,
            questions: QuestionBank::default(),
            rules: DuelRules::default(),
            clock: Arc::new(SystemClock),
            gold: Arc::new(RandomGold),
        }
    }

    async fn identity(&self, user_id: i64) -> Result<Identity, DuelError> {
        self.directory
            .lookup(user_id)
            .await?
            .ok_or(DuelError::UserNotFound(user_id))
    }

    // ── Matchmaking ─────────────────────────────────────────────────────

    /// Pair the player with a waiting opponent or queue them.
    pub async fn join(&self, user_id: i64) -> Result<JoinResponse, DuelError> {
        let identity = self.identity(user_id).await?;
        let player = PlayerRef {
            id: identity.id,
            display_name: identity.display_name,
        };

        let now = self.clock.now();
        let mut arena = self.arena.lock().await;
        let mut next = arena.clone();

        let pruned = next.prune_finished(now, self.rules.finished_retention);
        if pruned > 0 {
            debug!(pruned, "dropped finished matches past retention");
        }
        let abandoned = next.prune_abandoned(now, self.rules.abandoned_after);
        if abandoned > 0 {
            info!(abandoned, "dropped idle open matches");
        }
        let match_id = Uuid::new_v4().to_string();
        let outcome = next.join(player, &self.rules, self.questions.len(), match_id, now);

        if next != *arena {
            self.commit(&mut arena, next, None).await?;
        }

        Ok(match outcome {
            JoinOutcome::Matched {
                match_id,
                opponent,
                seat,
                created,
            } => {
                if created {
                    info!(%match_id, user_id, opponent_id = opponent.id, "match created");
                }
                JoinResponse {
                    matched: true,
                    match_id: Some(match_id),
                    opponent: Some(opponent),
                    seat: Some(seat),
                    message: None,
                }
            }
            JoinOutcome::Queued { refreshed } => {
                debug!(user_id, refreshed, "waiting for an opponent");
                JoinResponse {
                    matched: false,
                    match_id: None,
                    opponent: None,
                    seat: None,
                    message: Some("waiting for an opponent".to_string()),
                }
            }
        })
    }

    pub async fn check(&self, user_id: i64) -> Result<CheckResponse, DuelError> {
        self.identity(user_id).await?;
        let now = self.clock.now();
        let arena = self.arena.lock().await;

        Ok(match arena.status(user_id, now) {
            ArenaStatus::InMatch(match_id) => CheckResponse {
                in_match: true,
                matching: false,
                match_id: Some(match_id),
            },
            ArenaStatus::Matching => CheckResponse {
                in_match: false,
                matching: true,
                match_id: None,
            },
            ArenaStatus::Idle => CheckResponse {
                in_match: false,
                matching: false,
                match_id: None,
            },
        })
    }

    // ── Duel ────────────────────────────────────────────────────────────

    /// Poll a match. Runs the lazy timeout check and hands over the latest
    /// round result at most once per player.
    pub async fn state(&self, match_id: &str, user_id: i64) -> Result<StateResponse, DuelError> {
        let timeout = self.rules.heartbeat_timeout;
        let ((seat, poll), duel) = self
            .apply(match_id, |m, now| {
                let seat = m.seat_of(user_id)?;
                let poll = m.poll(user_id, now, timeout)?;
                let effect = match poll.timed_out {
                    Some(winner) => {
                        info!(match_id = %m.match_id, user_id, "opponent timed out");
                        Effect::Finished(winner)
                    }
                    None if poll.changed() => Effect::Changed,
                    None => Effect::Unchanged,
                };
                Ok(((seat, poll), effect))
            })
            .await?;

        let question = self
            .questions
            .get(duel.current_question_index)
            .map(|q| q.view());
        Ok(duel.state_for(seat, question, &poll))
    }

    /// Record an answer; resolves the round when it is the second one.
    /// Without an explicit `is_correct` the answer is graded against the
    /// current question.
    pub async fn answer(
        &self,
        match_id: &str,
        user_id: i64,
        answer: String,
        is_correct: Option<bool>,
    ) -> Result<AnswerResponse, DuelError> {
        let questions = &self.questions;
        let (submission, duel) = self
            .apply(match_id, |m, now| {
                let is_correct = is_correct.unwrap_or_else(|| {
                    questions
                        .get(m.current_question_index)
                        .is_some_and(|q| q.accepts(&answer))
                });
                let submission = m.submit_answer(user_id, answer, is_correct, now)?;
                let effect = match &submission {
                    Submission::AlreadyFinished | Submission::AlreadyAnswered => Effect::Unchanged,
                    Submission::Recorded => Effect::Changed,
                    Submission::Resolved(resolution) => {
                        info!(
                            match_id = %m.match_id,
                            question = resolution.report.question_index,
                            hp = ?resolution.report.hp,
                            "round resolved"
                        );
                        match resolution.finished {
                            Some(winner) => Effect::Finished(winner),
                            None => Effect::Changed,
                        }
                    }
                };
                Ok((submission, effect))
            })
            .await?;

        let (recorded, round_result) = match submission {
            Submission::AlreadyFinished => (false, None),
            Submission::AlreadyAnswered | Submission::Recorded => (true, None),
            Submission::Resolved(resolution) => (true, Some(resolution.report)),
        };
        Ok(AnswerResponse {
            recorded,
            game_over: duel.is_finished(),
            round_result,
        })
    }

    /// Forfeit the match. Repeated calls are no-ops.
    pub async fn quit(&self, match_id: &str, user_id: i64) -> Result<SuccessResponse, DuelError> {
        self.apply(match_id, |m, now| {
            let effect = match m.quit(user_id, now)? {
                Some(winner) => {
                    info!(match_id = %m.match_id, user_id, "player quit");
                    Effect::Finished(winner)
                }
                None => Effect::Unchanged,
            };
            Ok(((), effect))
        })
        .await?;
        Ok(SuccessResponse { success: true })
    }

    pub async fn heartbeat(&self, match_id: &str, user_id: i64) -> Result<SuccessResponse, DuelError> {
        self.apply(match_id, |m, now| {
            let effect = if m.heartbeat(user_id, now)? {
                Effect::Changed
            } else {
                Effect::Unchanged
            };
            Ok(((), effect))
        })
        .await?;
        Ok(SuccessResponse { success: true })
    }

    /// Run `op` against a copy of one match under the arena lock, commit the
    /// result if it changed, and return the op's value with the updated match.
    async fn apply<T>(
        &self,
        match_id: &str,
        op: impl FnOnce(&mut Match, DateTime<Utc>) -> Result<(T, Effect), DuelError>,
    ) -> Result<(T, Match), DuelError> {
        let now = self.clock.now();
        let mut arena = self.arena.lock().await;
        let mut working = arena.get(match_id)?.clone();

        let (value, effect) = op(&mut working, now)?;

        let finished = match effect {
            Effect::Unchanged => return Ok((value, working)),
            Effect::Changed => None,
            Effect::Finished(winner) => {
                info!(%match_id, winner = ?winner, "match finished");
                Some(winner)
            }
        };

        let mut next = arena.clone();
        *next.get_mut(match_id)? = working.clone();
        self.commit(&mut arena, next, finished).await?;
        Ok((value, working))
    }

    /// Write `next` (and, for a decided finish, the winner's updated
    /// profile) in one store commit, then swap it in.
    async fn commit(
        &self,
        arena: &mut MutexGuard<'_, Arena>,
        next: Arena,
        finished: Option<Winner>,
    ) -> Result<(), DuelError> {
        let mut bodies = vec![encode(ARENA_SNAPSHOT, &next)?];

        let Some(winner_id) = finished.and_then(|w| w.player_id()) else {
            self.write(&bodies).await?;
            **arena = next;
            return Ok(());
        };

        let fallback = next
            .matches()
            .iter()
            .flat_map(|m| m.players.iter())
            .find(|p| p.id == winner_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();
        let identity = self.directory.lookup(winner_id).await?;

        let mut profiles = self.profiles.lock().await;
        let mut book = profiles.clone();
        match &identity {
            Some(user) => book.get_or_create(user.id, &user.username, &user.display_name),
            None => book.get_or_create(winner_id, &fallback, &fallback),
        };
        let gold = book.record_outcome(winner_id, true, self.rules.gold_reward.clone(), self.gold.as_ref());
        bodies.push(encode(PROFILES_SNAPSHOT, &book)?);

        self.write(&bodies).await?;
        info!(user_id = winner_id, gold, "winner rewarded");
        **arena = next;
        *profiles = book;
        Ok(())
    }

    async fn write(&self, bodies: &[(&str, String)]) -> Result<(), DuelError> {
        self.store.commit(bodies).await.map_err(|e| {
            warn!(error = %e, "snapshot commit failed");
            DuelError::from(e)
        })
    }

    // ── Profiles ────────────────────────────────────────────────────────

    pub async fn player(&self, user_id: i64) -> Result<PlayerProfile, DuelError> {
        let identity = self.identity(user_id).await?;
        let mut profiles = self.profiles.lock().await;
        if let Some(existing) = profiles.get(user_id) {
            return Ok(existing.clone());
        }

        let mut book = profiles.clone();
        let (profile, _) = book.get_or_create(identity.id, &identity.username, &identity.display_name);
        let profile = profile.clone();
        self.write(&[encode(PROFILES_SNAPSHOT, &book)?]).await?;
        debug!(user_id, "profile created");
        *profiles = book;
        Ok(profile)
    }

    pub async fn set_inventory(
        &self,
        user_id: i64,
        inventory: Vec<InventoryItem>,
    ) -> Result<SuccessResponse, DuelError> {
        let identity = self.identity(user_id).await?;
        let mut profiles = self.profiles.lock().await;
        let mut book = profiles.clone();
        book.get_or_create(identity.id, &identity.username, &identity.display_name);
        book.set_inventory(user_id, inventory);

        self.write(&[encode(PROFILES_SNAPSHOT, &book)?]).await?;
        *profiles = book;
        Ok(SuccessResponse { success: true })
    }

    pub async fn leaderboard(&self) -> Vec<PlayerProfile> {
        self.profiles
            .lock()
            .await
            .leaderboard(self.rules.leaderboard_size)
    }

    /// Every student with their current duel status and medal count.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, DuelError> {
        let students = self.directory.students().await?;
        let now = self.clock.now();
        let arena = self.arena.lock().await;
        let profiles = self.profiles.lock().await;

        Ok(students
            .into_iter()
            .map(|s| {
                let status = match arena.status(s.id, now) {
                    ArenaStatus::InMatch(_) => PlayerStatus::Playing,
                    ArenaStatus::Matching => PlayerStatus::Matching,
                    ArenaStatus::Idle => PlayerStatus::Idle,
                };
                RosterEntry {
                    id: s.id,
                    medals: profiles.medals(s.id),
                    username: s.username,
                    display_name: s.display_name,
                    status,
                }
            })
            .collect())
    }
}
