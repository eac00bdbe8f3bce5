use serde::{Deserialize, Serialize};

use crate::duel::{RoundReport, Winner};
use crate::profile::{InventoryItem, PlayerProfile};
use crate::question::QuestionView;
use crate::queue::PlayerRef;

fn is_false(value: &bool) -> bool {
    !*value
}

// ── Requests ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub user_id: i64,
}

/// Body of `quit` and `heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub match_id: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub match_id: String,
    pub user_id: i64,
    pub answer: String,
    /// Client-side grading. When absent the server grades the answer itself.
    #[serde(default)]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRequest {
    pub user_id: i64,
    pub inventory: Vec<InventoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateQuery {
    pub match_id: String,
    pub user_id: i64,
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<PlayerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub in_match: bool,
    pub matching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

/// A participant's view of a match, returned by every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    pub match_id: String,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub seat: usize,
    pub opponent: PlayerRef,
    pub hp: u32,
    pub opponent_hp: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<QuestionView>,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub both_answered: bool,
    pub player_answered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_result: Option<RoundReport>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub opponent_left: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timeout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub recorded: bool,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_result: Option<RoundReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<PlayerProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResponse {
    pub player: PlayerProfile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Idle,
    Matching,
    Playing,
}

/// One row of the classroom roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub status: PlayerStatus,
    pub medals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterResponse {
    pub students: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
