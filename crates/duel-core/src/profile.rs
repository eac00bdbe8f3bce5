use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Gold a fresh profile starts with.
pub const STARTING_GOLD: u32 = 10;

/// Source of the random gold reward a winner receives.
pub trait GoldSource: Send + Sync {
    fn roll(&self, range: RangeInclusive<u32>) -> u32;
}

/// Uniform reward from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGold;

impl GoldSource for RandomGold {
    fn roll(&self, range: RangeInclusive<u32>) -> u32 {
        use rand::RngExt;
        rand::rng().random_range(range)
    }
}

/// Always rolls the same amount, clamped into the requested range.
#[derive(Debug, Clone, Copy)]
pub struct FixedGold(pub u32);

impl GoldSource for FixedGold {
    fn roll(&self, range: RangeInclusive<u32>) -> u32 {
        self.0.clamp(*range.start(), *range.end())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub emoji: String,
    pub kind: String,
    pub name: String,
}

impl InventoryItem {
    pub fn starter() -> Self {
        Self {
            emoji: "🍎".to_string(),
            kind: "heal".to_string(),
            name: "Apple".to_string(),
        }
    }
}

/// Persistent per-user game stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub gold: u32,
    pub medals: u32,
    pub wins: u32,
    pub inventory: Vec<InventoryItem>,
}

impl PlayerProfile {
    pub fn new(user_id: i64, username: &str, display_name: &str) -> Self {
        Self {
            user_id,
            username: username.to_string(),
            display_name: display_name.to_string(),
            gold: STARTING_GOLD,
            medals: 0,
            wins: 0,
            inventory: vec![InventoryItem::starter()],
        }
    }
}

/// Every profile, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBook {
    profiles: Vec<PlayerProfile>,
}

impl ProfileBook {
    pub fn get(&self, user_id: i64) -> Option<&PlayerProfile> {
        self.profiles.iter().find(|p| p.user_id == user_id)
    }

    /// Return the existing profile or create one with default stats.
    /// The flag is `true` when a profile was created.
    pub fn get_or_create(
        &mut self,
        user_id: i64,
        username: &str,
        display_name: &str,
    ) -> (&mut PlayerProfile, bool) {
        match self.profiles.iter().position(|p| p.user_id == user_id) {
            Some(idx) => (&mut self.profiles[idx], false),
            None => {
                self.profiles
                    .push(PlayerProfile::new(user_id, username, display_name));
                let last = self.profiles.len() - 1;
                (&mut self.profiles[last], true)
            }
        }
    }

    /// Apply a match outcome. Losing leaves the profile untouched; winning
    /// adds a win, a medal and a random amount of gold. Returns the gold
    /// awarded.
    pub fn record_outcome(
        &mut self,
        user_id: i64,
        won: bool,
        reward: RangeInclusive<u32>,
        gold: &dyn GoldSource,
    ) -> u32 {
        if !won {
            return 0;
        }
        let Some(profile) = self.profiles.iter_mut().find(|p| p.user_id == user_id) else {
            return 0;
        };

        let amount = gold.roll(reward);
        profile.wins += 1;
        profile.medals += 1;
        profile.gold += amount;
        amount
    }

    pub fn set_inventory(&mut self, user_id: i64, inventory: Vec<InventoryItem>) -> bool {
        match self.profiles.iter_mut().find(|p| p.user_id == user_id) {
            Some(profile) => {
                profile.inventory = inventory;
                true
            }
            None => false,
        }
    }

    /// Top `limit` profiles by medals, ties kept in creation order.
    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerProfile> {
        let mut ranked: Vec<&PlayerProfile> = self.profiles.iter().collect();
        ranked.sort_by(|a, b| b.medals.cmp(&a.medals));
        ranked.into_iter().take(limit).cloned().collect()
    }

    pub fn medals(&self, user_id: i64) -> u32 {
        self.get(user_id).map(|p| p.medals).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
