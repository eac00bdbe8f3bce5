use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use duel_core::DuelError;
use duel_core::protocol::{
    AnswerRequest, AnswerResponse, CheckResponse, ErrorResponse, InventoryRequest, JoinRequest,
    JoinResponse, LeaderboardResponse, MatchRequest, PlayerResponse, RosterResponse, StateQuery,
    StateResponse, SuccessResponse, UserQuery,
};

use crate::state::AppState;

/// A `DuelError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DuelError);

impl From<DuelError> for ApiError {
    fn from(error: DuelError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            DuelError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ── Matchmaking ─────────────────────────────────────────────────────────

pub async fn join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<JoinResponse> {
    Ok(Json(state.engine.join(req.user_id).await?))
}

pub async fn check(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> ApiResult<CheckResponse> {
    Ok(Json(state.engine.check(q.user_id).await?))
}

// ── Duel ────────────────────────────────────────────────────────────────

pub async fn game_state(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StateQuery>,
) -> ApiResult<StateResponse> {
    Ok(Json(state.engine.state(&q.match_id, q.user_id).await?))
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<AnswerResponse> {
    let resp = state
        .engine
        .answer(&req.match_id, req.user_id, req.answer, req.is_correct)
        .await?;
    Ok(Json(resp))
}

pub async fn quit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MatchRequest>,
) -> ApiResult<SuccessResponse> {
    Ok(Json(state.engine.quit(&req.match_id, req.user_id).await?))
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MatchRequest>,
) -> ApiResult<SuccessResponse> {
    Ok(Json(state.engine.heartbeat(&req.match_id, req.user_id).await?))
}

// ── Profiles ────────────────────────────────────────────────────────────

pub async fn leaderboard(State(state): State<Arc<AppState>>) -> Json<LeaderboardResponse> {
    Json(LeaderboardResponse {
        leaderboard: state.engine.leaderboard().await,
    })
}

pub async fn player(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> ApiResult<PlayerResponse> {
    let player = state.engine.player(q.user_id).await?;
    Ok(Json(PlayerResponse { player }))
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InventoryRequest>,
) -> ApiResult<SuccessResponse> {
    Ok(Json(state.engine.set_inventory(req.user_id, req.inventory).await?))
}

pub async fn students(State(state): State<Arc<AppState>>) -> ApiResult<RosterResponse> {
    let students = state.engine.roster().await?;
    Ok(Json(RosterResponse { students }))
}
