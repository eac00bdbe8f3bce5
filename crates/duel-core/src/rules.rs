use std::ops::RangeInclusive;

use chrono::TimeDelta;

/// Hit points each player starts a match with.
pub const STARTING_HP: u32 = 100;

/// Tunable constants of the duel.
#[derive(Debug, Clone)]
pub struct DuelRules {
    pub starting_hp: u32,
    /// How long a pending join stays eligible for pairing.
    pub pending_ttl: TimeDelta,
    /// Silence after which a player with a recorded heartbeat counts as gone.
    pub heartbeat_timeout: TimeDelta,
    /// How long finished matches are kept for late pollers.
    pub finished_retention: TimeDelta,
    /// Idle time after which an open match with no answers or heartbeats is dropped.
    pub abandoned_after: TimeDelta,
    pub gold_reward: RangeInclusive<u32>,
    pub leaderboard_size: usize,
}

impl Default for DuelRules {
    fn default() -> Self {
        Self {
            starting_hp: STARTING_HP,
            pending_ttl: TimeDelta::seconds(60),
            heartbeat_timeout: TimeDelta::seconds(90),
            finished_retention: TimeDelta::seconds(600),
            abandoned_after: TimeDelta::seconds(1800),
            gold_reward: 10..=20,
            leaderboard_size: 20,
        }
    }
}
