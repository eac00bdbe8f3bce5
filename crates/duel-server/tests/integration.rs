use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use duel_core::protocol::{
    AnswerResponse, CheckResponse, ErrorResponse, JoinResponse, LeaderboardResponse,
    PlayerResponse, RosterResponse, StateResponse, SuccessResponse,
};
use duel_core::{InventoryItem, Winner};
use duel_server::config::ServerConfig;
use duel_server::db;
use duel_server::state::AppState;

const U1: i64 = 8;
const U2: i64 = 9;

/// Spin up a test server on a random port, return the base URL.
async fn start_server() -> (String, Arc<AppState>) {
    // In-memory SQLite so tests don't clash.
    let config = ServerConfig {
        seed_users: true,
        ..ServerConfig::in_memory()
    };
    let (app, state) = duel_server::build_app(&config).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{}/api/game", port), state)
}

async fn join(client: &reqwest::Client, base: &str, user_id: i64) -> JoinResponse {
    client
        .post(format!("{}/join", base))
        .json(&json!({ "user_id": user_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn paired(client: &reqwest::Client, base: &str) -> String {
    assert!(!join(client, base, U1).await.matched);
    let resp = join(client, base, U2).await;
    assert!(resp.matched);
    resp.match_id.unwrap()
}

async fn state(client: &reqwest::Client, base: &str, match_id: &str, user_id: i64) -> StateResponse {
    client
        .get(format!("{}/state", base))
        .query(&[("match_id", match_id), ("user_id", &user_id.to_string())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn answer(
    client: &reqwest::Client,
    base: &str,
    match_id: &str,
    user_id: i64,
    mut body: Value,
) -> reqwest::Response {
    body["match_id"] = json!(match_id);
    body["user_id"] = json!(user_id);
    client
        .post(format!("{}/answer", base))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (base, _state) = start_server().await;
    let root = base.trim_end_matches("/api/game");
    let body = reqwest::get(format!("{}/health", root))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_matchmaking_flow() {
    let (base, _state) = start_server().await;
    let client = reqwest::Client::new();

    let first = join(&client, &base, U1).await;
    assert!(!first.matched);
    assert_eq!(first.message.as_deref(), Some("waiting for an opponent"));

    let check: CheckResponse = client
        .get(format!("{}/check", base))
        .query(&[("user_id", U1)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(check.matching);
    assert!(!check.in_match);

    let second = join(&client, &base, U2).await;
    assert!(second.matched);
    assert_eq!(second.seat, Some(1));
    assert_eq!(second.opponent.map(|o| o.id), Some(U1));

    let check: CheckResponse = client
        .get(format!("{}/check", base))
        .query(&[("user_id", U1)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(check.in_match);
    assert_eq!(check.match_id, second.match_id);

    // Joining again returns the open match.
    let again = join(&client, &base, U1).await;
    assert_eq!(again.match_id, second.match_id);
    assert_eq!(again.seat, Some(0));
}

#[tokio::test]
async fn test_full_duel_to_knockout() {
    let (base, _state) = start_server().await;
    let client = reqwest::Client::new();
    let match_id = paired(&client, &base).await;

    let view = state(&client, &base, &match_id, U1).await;
    assert_eq!(view.total_questions, 17);
    assert!(view.current_question.is_some());

    for round in 0..5 {
        let first: AnswerResponse = answer(&client, &base, &match_id, U1, json!({ "answer": "B", "is_correct": true }))
            .await
            .json()
            .await
            .unwrap();
        assert!(first.recorded);
        assert!(first.round_result.is_none());

        let second: AnswerResponse = answer(&client, &base, &match_id, U2, json!({ "answer": "A", "is_correct": false }))
            .await
            .json()
            .await
            .unwrap();
        let report = second.round_result.unwrap();
        assert_eq!(report.hp, [100, 80 - 20 * round as u32]);
        assert_eq!(second.game_over, round == 4);

        let seen = state(&client, &base, &match_id, U2).await;
        assert_eq!(seen.round_result, Some(report));
        assert!(state(&client, &base, &match_id, U2).await.round_result.is_none());
    }

    let raw: Value = client
        .get(format!("{}/state", base))
        .query(&[("match_id", match_id.as_str()), ("user_id", "8")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(raw["game_over"], json!(true));
    assert_eq!(raw["winner"], json!(U1));
    assert!(raw.get("current_question").is_none());

    let board: LeaderboardResponse = client
        .get(format!("{}/leaderboard", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board.leaderboard.len(), 1);
    assert_eq!(board.leaderboard[0].user_id, U1);
    assert_eq!(board.leaderboard[0].medals, 1);
}

#[tokio::test]
async fn test_answer_is_graded_when_correctness_omitted() {
    let (base, _state) = start_server().await;
    let client = reqwest::Client::new();
    let match_id = paired(&client, &base).await;

    answer(&client, &base, &match_id, U1, json!({ "answer": "b" })).await;
    let resolved: AnswerResponse = answer(&client, &base, &match_id, U2, json!({ "answer": "C" }))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(resolved.round_result.unwrap().correct, [true, false]);
}

#[tokio::test]
async fn test_quit_ends_match_for_both() {
    let (base, _state) = start_server().await;
    let client = reqwest::Client::new();
    let match_id = paired(&client, &base).await;

    for _ in 0..2 {
        let resp: SuccessResponse = client
            .post(format!("{}/quit", base))
            .json(&json!({ "match_id": match_id, "user_id": U2 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(resp.success);
    }

    let view = state(&client, &base, &match_id, U1).await;
    assert!(view.game_over);
    assert!(view.opponent_left);
    assert_eq!(view.winner, Some(Winner::Player(U1)));

    let quitter = state(&client, &base, &match_id, U2).await;
    assert!(quitter.game_over);
    assert!(!quitter.opponent_left);

    let player: PlayerResponse = client
        .get(format!("{}/player", base))
        .query(&[("user_id", U1)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(player.player.wins, 1);
    assert!((20..=30).contains(&player.player.gold));
}

#[tokio::test]
async fn test_error_statuses() {
    let (base, _state) = start_server().await;
    let client = reqwest::Client::new();
    let match_id = paired(&client, &base).await;

    let missing = client
        .get(format!("{}/state", base))
        .query(&[("match_id", "nope"), ("user_id", "8")])
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    let body: ErrorResponse = missing.json().await.unwrap();
    assert!(body.error.contains("nope"));

    let unknown_user = client
        .post(format!("{}/join", base))
        .json(&json!({ "user_id": 404 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_user.status(), reqwest::StatusCode::NOT_FOUND);

    let outsider = answer(&client, &base, &match_id, 3, json!({ "answer": "B", "is_correct": true })).await;
    assert_eq!(outsider.status(), reqwest::StatusCode::CONFLICT);

    let heartbeat = client
        .post(format!("{}/heartbeat", base))
        .json(&json!({ "match_id": match_id, "user_id": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(heartbeat.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_students_roster_and_inventory() {
    let (base, state) = start_server().await;
    let client = reqwest::Client::new();
    db::upsert_user(&state.db, 10, "U3", "Player Three", "student")
        .await
        .unwrap();

    paired(&client, &base).await;
    join(&client, &base, 10).await;

    let raw: Value = client
        .get(format!("{}/students", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(raw["students"][1]["status"], json!("playing"));

    let roster: RosterResponse = serde_json::from_value(raw).unwrap();
    let ids: Vec<i64> = roster.students.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![3, U1, U2, 10]);
    assert_eq!(roster.students[3].display_name, "Player Three");

    let items = vec![InventoryItem {
        emoji: "🛡".into(),
        kind: "defense".into(),
        name: "Shield".into(),
    }];
    let resp: SuccessResponse = client
        .post(format!("{}/inventory", base))
        .json(&json!({ "user_id": 10, "inventory": items }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(resp.success);

    let player: PlayerResponse = client
        .get(format!("{}/player", base))
        .query(&[("user_id", 10)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(player.player.inventory, items);
    assert_eq!(player.player.gold, 10);
}
