use sqlx::{Row, SqlitePool};

/// Create all tables if they don't exist.
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'student',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS snapshots (
            name TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert or update a user under a fixed id.
pub async fn upsert_user(
    pool: &SqlitePool,
    id: i64,
    username: &str,
    display_name: &str,
    role: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, username, display_name, role)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET username = ?2, display_name = ?3, role = ?4",
    )
    .bind(id)
    .bind(username)
    .bind(display_name)
    .bind(role)
    .execute(pool)
    .await?;

    Ok(())
}

/// Populate an empty users table with the demo classroom.
/// Returns `true` if anything was inserted.
pub async fn seed_default_users(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(pool)
        .await?;
    if row.get::<i64, _>("n") > 0 {
        return Ok(false);
    }

    let defaults = [
        (1, "admin", "Administrator", "admin"),
        (2, "teacher", "Teacher", "teacher"),
        (3, "student", "Student", "student"),
        (8, "U1", "Player One", "student"),
        (9, "U2", "Player Two", "student"),
    ];
    for (id, username, display_name, role) in defaults {
        upsert_user(pool, id, username, display_name, role).await?;
    }

    Ok(true)
}

/// Get a user by id.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query("SELECT id, username, display_name, role FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| UserRow::from_row(&r)))
}

/// Every user with the student role, by id.
pub async fn list_students(pool: &SqlitePool) -> Result<Vec<UserRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, username, display_name, role FROM users WHERE role = 'student' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(UserRow::from_row).collect())
}

/// Read a named snapshot body.
pub async fn load_snapshot(pool: &SqlitePool, name: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT body FROM snapshots WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<String, _>("body")))
}

/// Replace several snapshots in one transaction: either all bodies are
/// written or none are.
pub async fn save_snapshots(pool: &SqlitePool, bodies: &[(&str, String)]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for (name, body) in bodies {
        sqlx::query(
            "INSERT INTO snapshots (name, body, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(name) DO UPDATE SET body = ?2, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(*name)
        .bind(body)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

impl UserRow {
    fn from_row(r: &sqlx::sqlite::SqliteRow) -> Self {
        let username: String = r.get("username");
        let display_name: String = r.get("display_name");
        Self {
            id: r.get("id"),
            display_name: if display_name.is_empty() {
                username.clone()
            } else {
                display_name
            },
            username,
            role: r.get("role"),
        }
    }
}
