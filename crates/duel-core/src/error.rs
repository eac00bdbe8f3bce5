use thiserror::Error;

/// Errors surfaced by duel operations.
///
/// Operating on a finished match is not an error: those calls succeed as
/// no-ops and return the terminal snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    #[error("match {0} not found")]
    MatchNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("user {user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: String, user_id: i64 },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl DuelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DuelError::MatchNotFound(_) | DuelError::UserNotFound(_))
    }
}
