use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::damage::{apply_damage, round_damage};
use crate::error::DuelError;
use crate::protocol::StateResponse;
use crate::question::QuestionView;
use crate::queue::PlayerRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Open,
    Finished,
}

/// Outcome of a finished match. Serialized as the winning player id, or the
/// string `"draw"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Player(i64),
    Draw,
}

impl Winner {
    pub fn player_id(&self) -> Option<i64> {
        match self {
            Winner::Player(id) => Some(*id),
            Winner::Draw => None,
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Winner::Player(id) => serializer.serialize_i64(*id),
            Winner::Draw => serializer.serialize_str("draw"),
        }
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Label(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Winner::Player(id)),
            Raw::Label(label) if label == "draw" => Ok(Winner::Draw),
            Raw::Label(other) => Err(de::Error::invalid_value(
                Unexpected::Str(&other),
                &"a player id or \"draw\"",
            )),
        }
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    Knockout,
    QuestionsExhausted,
    Quit { by: i64 },
    Timeout { absent: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub value: String,
    pub is_correct: bool,
}

/// What both players get to see about a resolved round. Arrays are indexed
/// by seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    pub question_index: usize,
    pub correct: [bool; 2],
    pub damage: [u32; 2],
    pub hp: [u32; 2],
}

/// The cached result of the latest resolved round, plus who has already
/// received it through polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub report: RoundReport,
    pub processed_by: BTreeSet<i64>,
}

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub report: RoundReport,
    /// Set when this round ended the match.
    pub finished: Option<Winner>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The match had already ended; nothing changed.
    AlreadyFinished,
    /// The player already answered this round; the first answer stands.
    AlreadyAnswered,
    /// Answer stored, waiting on the opponent.
    Recorded,
    /// This answer completed the round.
    Resolved(Resolution),
}

/// What a single poll did to the match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Poll {
    /// Round result delivered to this poller, at most once per round.
    pub round: Option<RoundReport>,
    /// Set when this poll detected an opponent timeout and ended the match.
    pub timed_out: Option<Winner>,
}

impl Poll {
    pub fn changed(&self) -> bool {
        self.round.is_some() || self.timed_out.is_some()
    }
}

/// State of one two-player duel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub players: [PlayerRef; 2],
    pub hp: [u32; 2],
    pub current_question_index: usize,
    pub total_questions: usize,
    pub answers: [Option<SubmittedAnswer>; 2],
    pub last_round_result: Option<RoundResult>,
    pub heartbeats: [Option<DateTime<Utc>>; 2],
    pub status: MatchStatus,
    pub winner: Option<Winner>,
    pub end_reason: Option<EndReason>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last answer or heartbeat from either side.
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(
        match_id: String,
        players: [PlayerRef; 2],
        starting_hp: u32,
        total_questions: usize,
        now: DateTime<Utc>,
    ) -> Self {
        debug_assert_ne!(players[0].id, players[1].id, "a match needs two distinct players");
        Self {
            match_id,
            players,
            hp: [starting_hp; 2],
            current_question_index: 0,
            total_questions,
            answers: [None, None],
            last_round_result: None,
            heartbeats: [None, None],
            status: MatchStatus::Open,
            winner: None,
            end_reason: None,
            created_at: now,
            finished_at: None,
            last_active_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn has_player(&self, user_id: i64) -> bool {
        self.players.iter().any(|p| p.id == user_id)
    }

    /// Still open, but neither player has answered or sent a heartbeat for
    /// longer than `horizon` (counted from creation if they never did).
    pub fn is_abandoned(&self, now: DateTime<Utc>, horizon: TimeDelta) -> bool {
        !self.is_finished() && now - self.last_active_at.unwrap_or(self.created_at) > horizon
    }

    /// Seat index (0 or 1) of a participant.
    pub fn seat_of(&self, user_id: i64) -> Result<usize, DuelError> {
        self.players
            .iter()
            .position(|p| p.id == user_id)
            .ok_or_else(|| DuelError::NotParticipant {
                match_id: self.match_id.clone(),
                user_id,
            })
    }

    pub fn submit_answer(
        &mut self,
        user_id: i64,
        value: String,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<Submission, DuelError> {
        let seat = self.seat_of(user_id)?;
        if self.is_finished() {
            return Ok(Submission::AlreadyFinished);
        }
        if self.answers[seat].is_some() {
            return Ok(Submission::AlreadyAnswered);
        }

        self.answers[seat] = Some(SubmittedAnswer { value, is_correct });
        self.last_active_at = Some(now);

        match (&self.answers[0], &self.answers[1]) {
            (Some(a), Some(b)) => {
                let correct = [a.is_correct, b.is_correct];
                Ok(Submission::Resolved(self.resolve_round(correct, now)))
            }
            _ => Ok(Submission::Recorded),
        }
    }

    fn resolve_round(&mut self, correct: [bool; 2], now: DateTime<Utc>) -> Resolution {
        let damage = round_damage(correct);
        for seat in 0..2 {
            self.hp[seat] = apply_damage(self.hp[seat], damage[seat]);
        }

        let report = RoundReport {
            question_index: self.current_question_index,
            correct,
            damage,
            hp: self.hp,
        };
        self.last_round_result = Some(RoundResult {
            report: report.clone(),
            processed_by: BTreeSet::new(),
        });
        self.answers = [None, None];
        self.current_question_index += 1;

        let knockout = self.hp.contains(&0);
        let exhausted = self.current_question_index >= self.total_questions;
        let finished = if knockout || exhausted {
            let winner = if self.hp[0] > self.hp[1] {
                Winner::Player(self.players[0].id)
            } else if self.hp[1] > self.hp[0] {
                Winner::Player(self.players[1].id)
            } else {
                Winner::Draw
            };
            let reason = if knockout {
                EndReason::Knockout
            } else {
                EndReason::QuestionsExhausted
            };
            self.finish(winner, reason, now);
            Some(winner)
        } else {
            None
        };

        Resolution { report, finished }
    }

    /// Transition to Finished. Returns `false` if the match had already ended.
    fn finish(&mut self, winner: Winner, reason: EndReason, now: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = MatchStatus::Finished;
        self.winner = Some(winner);
        self.end_reason = Some(reason);
        self.finished_at = Some(now);
        true
    }

    /// Run the lazy timeout check, then hand over the cached round result if
    /// this player has not received it yet.
    pub fn poll(
        &mut self,
        user_id: i64,
        now: DateTime<Utc>,
        heartbeat_timeout: TimeDelta,
    ) -> Result<Poll, DuelError> {
        let seat = self.seat_of(user_id)?;
        let other = 1 - seat;
        let mut poll = Poll::default();

        // No heartbeat from the opponent yet never counts as a timeout, even
        // when this player has already sent one.
        if !self.is_finished() {
            if let Some(last_seen) = self.heartbeats[other] {
                if now - last_seen > heartbeat_timeout {
                    let winner = Winner::Player(user_id);
                    let absent = self.players[other].id;
                    self.finish(winner, EndReason::Timeout { absent }, now);
                    poll.timed_out = Some(winner);
                }
            }
        }

        poll.round = self.deliver_round(user_id);
        Ok(poll)
    }

    fn deliver_round(&mut self, user_id: i64) -> Option<RoundReport> {
        let ids = [self.players[0].id, self.players[1].id];
        let result = self.last_round_result.as_mut()?;
        if !result.processed_by.insert(user_id) {
            return None;
        }

        let report = result.report.clone();
        if ids.iter().all(|id| result.processed_by.contains(id)) {
            self.last_round_result = None;
        }
        Some(report)
    }

    /// Forfeit on behalf of `user_id`. Returns the winner if this call ended
    /// the match, `None` if it was already over.
    pub fn quit(&mut self, user_id: i64, now: DateTime<Utc>) -> Result<Option<Winner>, DuelError> {
        let seat = self.seat_of(user_id)?;
        let winner = Winner::Player(self.players[1 - seat].id);
        if self.finish(winner, EndReason::Quit { by: user_id }, now) {
            Ok(Some(winner))
        } else {
            Ok(None)
        }
    }

    /// Record a liveness signal. Returns `false` on a finished match.
    pub fn heartbeat(&mut self, user_id: i64, now: DateTime<Utc>) -> Result<bool, DuelError> {
        let seat = self.seat_of(user_id)?;
        if self.is_finished() {
            return Ok(false);
        }
        self.heartbeats[seat] = Some(now);
        self.last_active_at = Some(now);
        Ok(true)
    }

    /// Build the view a participant sees when polling.
    pub fn state_for(
        &self,
        seat: usize,
        current_question: Option<QuestionView>,
        poll: &Poll,
    ) -> StateResponse {
        let other = 1 - seat;
        let opponent_id = self.players[other].id;
        let (opponent_left, timeout) = match self.end_reason {
            Some(EndReason::Timeout { absent }) if absent == opponent_id => (true, true),
            Some(EndReason::Quit { by }) if by == opponent_id => (true, false),
            _ => (false, false),
        };

        StateResponse {
            match_id: self.match_id.clone(),
            game_over: self.is_finished(),
            winner: self.winner,
            seat,
            opponent: self.players[other].clone(),
            hp: self.hp[seat],
            opponent_hp: self.hp[other],
            current_question: if self.is_finished() { None } else { current_question },
            current_question_index: self.current_question_index,
            total_questions: self.total_questions,
            both_answered: self.answers.iter().all(Option::is_some),
            player_answered: self.answers[seat].is_some(),
            round_result: poll.round.clone(),
            opponent_left,
            timeout,
        }
    }
}
