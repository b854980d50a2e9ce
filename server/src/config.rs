//! Runtime configuration for the server and gameplay tuning for the simulation.

use arena_shared::{
    COLLISION_RANGE, CONTACT_DAMAGE, DEFAULT_PORT, ENEMY_HEALTH, ENEMY_SPAWN_EXTENT,
    ENEMY_SPAWN_INTERVAL_MS, KILL_SCORE, MOVE_STEP, PLAYER_BOUND, PLAYER_MAX_HEALTH,
    PROJECTILE_BOUND, PROJECTILE_DAMAGE, PROJECTILE_SPEED, SHOT_COOLDOWN_MS, TICK_RATE,
};
use std::time::Duration;

/// What the simulation does with a command for a player id it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPlayerPolicy {
    /// Drop the command.
    Ignore,
    /// Movement commands create a default player at the origin before moving it.
    /// Shots are still dropped.
    CreateOnMove,
}

/// Gameplay tuning. Defaults mirror the shared protocol constants.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub move_step: i32,
    pub player_bound: i32,
    pub player_max_health: i32,
    pub projectile_speed: i32,
    pub projectile_bound: i32,
    pub projectile_damage: i32,
    pub shot_cooldown: Duration,
    pub enemy_health: i32,
    pub enemy_spawn_interval: Duration,
    pub enemy_spawn_extent: i32,
    pub kill_score: u32,
    pub contact_damage: i32,
    pub collision_range: i32,
    pub unknown_player_policy: UnknownPlayerPolicy,
    /// Seed for enemy placement; `None` draws from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            move_step: MOVE_STEP,
            player_bound: PLAYER_BOUND,
            player_max_health: PLAYER_MAX_HEALTH,
            projectile_speed: PROJECTILE_SPEED,
            projectile_bound: PROJECTILE_BOUND,
            projectile_damage: PROJECTILE_DAMAGE,
            shot_cooldown: Duration::from_millis(SHOT_COOLDOWN_MS),
            enemy_health: ENEMY_HEALTH,
            enemy_spawn_interval: Duration::from_millis(ENEMY_SPAWN_INTERVAL_MS),
            enemy_spawn_extent: ENEMY_SPAWN_EXTENT,
            kill_score: KILL_SCORE,
            contact_damage: CONTACT_DAMAGE,
            collision_range: COLLISION_RANGE,
            unknown_player_policy: UnknownPlayerPolicy::Ignore,
            rng_seed: None,
        }
    }
}

/// Network and scheduler settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub tick_rate: u32,
    pub max_players: usize,
    pub game: GameConfig,
}

impl ServerConfig {
    /// Nominal time between ticks. A zero tick rate is treated as one tick per second.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            tick_rate: TICK_RATE,
            max_players: 16,
            game: GameConfig::default(),
        }
    }
}
