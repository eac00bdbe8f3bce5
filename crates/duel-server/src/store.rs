use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::SqlitePool;
use thiserror::Error;

use duel_core::DuelError;

use crate::db;

/// Snapshot holding the pending queue and every match.
pub const ARENA_SNAPSHOT: &str = "arena";
/// Snapshot holding every player profile.
pub const PROFILES_SNAPSHOT: &str = "profiles";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DuelError {
    fn from(error: StoreError) -> Self {
        DuelError::ServiceUnavailable(error.to_string())
    }
}

/// Durable home of the engine's snapshots. A commit must be all-or-nothing:
/// after a failed commit the next load sees exactly what it saw before.
#[async_trait]
pub trait DuelStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<String>, StoreError>;
    async fn commit(&self, bodies: &[(&str, String)]) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DuelStore for SqliteStore {
    async fn load(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(db::load_snapshot(&self.pool, name).await?)
    }

    async fn commit(&self, bodies: &[(&str, String)]) -> Result<(), StoreError> {
        Ok(db::save_snapshots(&self.pool, bodies).await?)
    }
}

/// Process-local store. Commits can be switched to fail.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: DashMap<String, String>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self, name: &str) -> Option<String> {
        self.snapshots.get(name).map(|body| body.clone())
    }
}

#[async_trait]
impl DuelStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.snapshot(name))
    }

    async fn commit(&self, bodies: &[(&str, String)]) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        for (name, body) in bodies {
            self.snapshots.insert(name.to_string(), body.clone());
        }
        Ok(())
    }
}

/// Who a user id belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

impl From<db::UserRow> for Identity {
    fn from(row: db::UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            role: row.role,
        }
    }
}

/// Identity lookup, owned by the user-management side of the backend.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn lookup(&self, user_id: i64) -> Result<Option<Identity>, StoreError>;
    async fn students(&self) -> Result<Vec<Identity>, StoreError>;
}

pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn lookup(&self, user_id: i64) -> Result<Option<Identity>, StoreError> {
        Ok(db::get_user(&self.pool, user_id).await?.map(Identity::from))
    }

    async fn students(&self) -> Result<Vec<Identity>, StoreError> {
        let rows = db::list_students(&self.pool).await?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<i64, Identity>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: i64, username: &str, display_name: &str, role: &str) {
        self.users.insert(
            id,
            Identity {
                id,
                username: username.to_string(),
                display_name: display_name.to_string(),
                role: role.to_string(),
            },
        );
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn lookup(&self, user_id: i64) -> Result<Option<Identity>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn students(&self) -> Result<Vec<Identity>, StoreError> {
        let mut students: Vec<Identity> = self
            .users
            .iter()
            .filter(|u| u.role == "student")
            .map(|u| u.value().clone())
            .collect();
        students.sort_by_key(|u| u.id);
        Ok(students)
    }
}
