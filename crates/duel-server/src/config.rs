use std::path::PathBuf;

use chrono::TimeDelta;
use duel_core::DuelRules;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    /// JSON question file. The embedded bank is used when unset.
    pub question_file: Option<PathBuf>,
    /// Seed demo users into an empty users table.
    pub seed_users: bool,
    pub rules: DuelRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "sqlite:duel.db?mode=rwc".to_string(),
            question_file: None,
            seed_users: true,
            rules: DuelRules::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        config.question_file = lookup("DUEL_QUESTIONS").map(PathBuf::from);
        if let Some(flag) = lookup("DUEL_SEED_USERS") {
            config.seed_users = !matches!(flag.as_str(), "0" | "false" | "no");
        }

        let secs = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .map(TimeDelta::seconds)
        };
        if let Some(ttl) = secs("DUEL_PENDING_TTL_SECS") {
            config.rules.pending_ttl = ttl;
        }
        if let Some(timeout) = secs("DUEL_HEARTBEAT_TIMEOUT_SECS") {
            config.rules.heartbeat_timeout = timeout;
        }
        if let Some(retention) = secs("DUEL_FINISHED_RETENTION_SECS") {
            config.rules.finished_retention = retention;
        }
        if let Some(idle) = secs("DUEL_ABANDONED_AFTER_SECS") {
            config.rules.abandoned_after = idle;
        }

        config
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// A config for tests: in-memory database, no seeding.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            seed_users: false,
            ..Self::default()
        }
    }
}
