pub mod config;
pub mod db;
pub mod engine;
pub mod routes;
pub mod state;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use duel_core::QuestionBank;

use crate::config::ServerConfig;
use crate::engine::DuelEngine;
use crate::state::AppState;
use crate::store::{SqliteDirectory, SqliteStore};

/// Open the pool. Every connection to `:memory:` is its own database, so an
/// in-memory pool is pinned to a single connection that never recycles.
async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    options.connect(database_url).await
}

/// Build a fully configured Router + shared state.
pub async fn build_app(config: &ServerConfig) -> anyhow::Result<(Router, Arc<AppState>)> {
    let pool = connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", config.database_url))?;

    db::init_db(&pool)
        .await
        .context("failed to initialize database")?;

    if config.seed_users && db::seed_default_users(&pool).await? {
        info!("seeded default users");
    }

    let questions = match &config.question_file {
        Some(path) => QuestionBank::from_file(path)
            .with_context(|| format!("failed to load questions from {}", path.display()))?,
        None => QuestionBank::default(),
    };

    let engine = DuelEngine::builder(
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(SqliteDirectory::new(pool.clone())),
    )
    .questions(questions)
    .rules(config.rules.clone())
    .build()
    .await
    .context("failed to restore duel state")?;

    let state = Arc::new(AppState { db: pool, engine });

    let api = Router::new()
        .route("/join", post(routes::join))
        .route("/check", get(routes::check))
        .route("/state", get(routes::game_state))
        .route("/answer", post(routes::answer))
        .route("/quit", post(routes::quit))
        .route("/heartbeat", post(routes::heartbeat))
        .route("/leaderboard", get(routes::leaderboard))
        .route("/player", get(routes::player))
        .route("/inventory", post(routes::inventory))
        .route("/students", get(routes::students));

    let app = Router::new()
        .route("/health", get(routes::health))
        .nest("/api/game", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    Ok((app, state))
}
