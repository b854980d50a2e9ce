//! Authoritative world simulation.
//!
//! `GameState` owns every player, enemy and projectile. It performs no I/O and never
//! fails: unknown ids and commands for dead players are absorbed as no-ops. Callers
//! are responsible for serializing access (see `hub::SharedGame`).

use crate::config::{GameConfig, UnknownPlayerPolicy};
use arena_shared::{chebyshev_distance, encode_snapshot, euclidean_distance, Command, EntityRecord};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    pub score: u32,
    pub alive: bool,
    /// When this player last fired; `None` until the first shot.
    pub last_shot: Option<Instant>,
}

impl Player {
    pub fn new(id: u32, health: i32) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            health,
            score: 0,
            alive: true,
            last_shot: None,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn record(&self) -> EntityRecord {
        EntityRecord::Player {
            id: self.id,
            x: self.x,
            y: self.y,
            health: self.health,
            score: self.score,
            alive: self.alive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enemy {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    /// Player pursued on the last AI step. Advisory only.
    pub target_player_id: Option<u32>,
}

impl Enemy {
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn record(&self) -> EntityRecord {
        EntityRecord::Enemy {
            id: self.id,
            x: self.x,
            y: self.y,
            health: self.health,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projectile {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
    /// May refer to a player that has since disconnected.
    pub owner_id: u32,
}

impl Projectile {
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn record(&self) -> EntityRecord {
        EntityRecord::Projectile {
            id: self.id,
            x: self.x,
            y: self.y,
            owner_id: self.owner_id,
        }
    }
}

pub struct GameState {
    pub tick: u64,
    config: GameConfig,
    players: BTreeMap<u32, Player>,
    enemies: Vec<Enemy>,
    projectiles: Vec<Projectile>,
    next_enemy_id: u64,
    next_projectile_id: u64,
    last_update: Instant,
    last_enemy_spawn: Instant,
    rng: StdRng,
}

impl GameState {
    pub fn new(config: GameConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates an empty world whose spawn timer starts at `now`.
    pub fn starting_at(config: GameConfig, now: Instant) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            tick: 0,
            config,
            players: BTreeMap::new(),
            enemies: Vec::new(),
            projectiles: Vec::new(),
            next_enemy_id: 1,
            next_projectile_id: 1,
            last_update: now,
            last_enemy_spawn: now,
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Adds a player at the origin with full health.
    ///
    /// Returns false, leaving the existing player untouched, if the id is taken.
    pub fn add_player(&mut self, id: u32) -> bool {
        if self.players.contains_key(&id) {
            warn!("Player {} already exists, ignoring duplicate add", id);
            return false;
        }

        self.players
            .insert(id, Player::new(id, self.config.player_max_health));
        info!("Added player {}", id);
        true
    }

    /// Removes a player. Projectiles it fired stay in flight.
    pub fn remove_player(&mut self, id: u32) -> bool {
        let removed = self.players.remove(&id).is_some();
        if removed {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Places an enemy directly, bypassing the spawn timer. Returns its id.
    pub fn spawn_enemy_at(&mut self, x: i32, y: i32) -> u64 {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        self.enemies.push(Enemy {
            id,
            x,
            y,
            health: self.config.enemy_health,
            target_player_id: None,
        });
        id
    }

    pub fn apply_command(&mut self, player_id: u32, command: Command, now: Instant) {
        if !self.players.contains_key(&player_id) {
            match (self.config.unknown_player_policy, command) {
                (UnknownPlayerPolicy::CreateOnMove, Command::Move(_)) => {
                    debug!("Creating player {} on first movement", player_id);
                    self.add_player(player_id);
                }
                _ => {
                    debug!("Dropping {} for unknown player {}", command, player_id);
                    return;
                }
            }
        }

        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if !player.alive {
            return;
        }

        match command {
            Command::Move(direction) => {
                let (dx, dy) = direction.delta();
                let bound = self.config.player_bound;
                let step = self.config.move_step;
                player.x = (player.x + dx * step).clamp(-bound, bound);
                player.y = (player.y + dy * step).clamp(-bound, bound);
            }
            Command::Shoot(direction) => {
                if let Some(last_shot) = player.last_shot {
                    if now.saturating_duration_since(last_shot) < self.config.shot_cooldown {
                        return;
                    }
                }
                player.last_shot = Some(now);

                let (dx, dy) = direction.delta();
                let speed = self.config.projectile_speed;
                let id = self.next_projectile_id;
                self.next_projectile_id += 1;
                self.projectiles.push(Projectile {
                    id,
                    x: player.x,
                    y: player.y,
                    dx: dx * speed,
                    dy: dy * speed,
                    owner_id: player_id,
                });
            }
        }
    }

    /// Advances the world by one frame. The step order is fixed and determines
    /// tie-breaks: spawn, projectiles, enemy AI, projectile hits, enemy contact.
    pub fn tick(&mut self, now: Instant) {
        self.tick += 1;
        self.spawn_enemies(now);
        self.move_projectiles();
        self.move_enemies();
        self.resolve_projectile_hits();
        self.resolve_enemy_contacts();
        self.last_update = now;
    }

    fn spawn_enemies(&mut self, now: Instant) {
        if self.players.is_empty() {
            return;
        }
        if now.saturating_duration_since(self.last_enemy_spawn) <= self.config.enemy_spawn_interval
        {
            return;
        }

        let extent = self.config.enemy_spawn_extent;
        let along = self.rng.gen_range(-extent..=extent);
        let (x, y) = match self.rng.gen_range(0..4) {
            0 => (along, -extent),
            1 => (along, extent),
            2 => (-extent, along),
            _ => (extent, along),
        };

        let id = self.spawn_enemy_at(x, y);
        self.last_enemy_spawn = now;
        debug!("Spawned enemy {} at ({}, {})", id, x, y);
    }

    fn move_projectiles(&mut self) {
        let bound = self.config.projectile_bound;
        for projectile in &mut self.projectiles {
            projectile.x = projectile.x.saturating_add(projectile.dx);
            projectile.y = projectile.y.saturating_add(projectile.dy);
        }
        self.projectiles
            .retain(|p| p.x.abs() <= bound && p.y.abs() <= bound);
    }

    fn move_enemies(&mut self) {
        for enemy in &mut self.enemies {
            let position = enemy.position();
            // min_by keeps the first of equally near players
            let nearest = self
                .players
                .values()
                .filter(|p| p.alive)
                .map(|p| (p, euclidean_distance(position, p.position())))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p);

            if let Some(target) = nearest {
                enemy.x += (target.x - enemy.x).signum();
                enemy.y += (target.y - enemy.y).signum();
                enemy.target_player_id = Some(target.id);
            }
        }
    }

    fn resolve_projectile_hits(&mut self) {
        let range = self.config.collision_range;

        // Newest projectile first; removing at `index` only shifts already visited entries.
        let mut index = self.projectiles.len();
        while index > 0 {
            index -= 1;
            let position = self.projectiles[index].position();
            let Some(enemy_index) = self
                .enemies
                .iter()
                .position(|e| chebyshev_distance(e.position(), position) <= range)
            else {
                continue;
            };

            let projectile = self.projectiles.remove(index);
            let enemy = &mut self.enemies[enemy_index];
            enemy.health -= self.config.projectile_damage;
            if enemy.health > 0 {
                continue;
            }

            let enemy = self.enemies.remove(enemy_index);
            match self.players.get_mut(&projectile.owner_id) {
                Some(owner) => {
                    owner.score = owner.score.saturating_add(self.config.kill_score);
                    info!(
                        "Enemy {} destroyed by player {} (score {})",
                        enemy.id, owner.id, owner.score
                    );
                }
                None => debug!(
                    "Enemy {} destroyed by departed player {}",
                    enemy.id, projectile.owner_id
                ),
            }
        }
    }

    fn resolve_enemy_contacts(&mut self) {
        let range = self.config.collision_range;
        for enemy in &self.enemies {
            for player in self.players.values_mut() {
                if !player.alive || chebyshev_distance(enemy.position(), player.position()) > range
                {
                    continue;
                }

                player.health = (player.health - self.config.contact_damage).max(0);
                if player.health == 0 {
                    player.alive = false;
                    info!("Player {} was killed by enemy {}", player.id, enemy.id);
                }
            }
        }
    }

    /// Every entity as a wire record: players by id, then enemies, then projectiles.
    pub fn records(&self) -> Vec<EntityRecord> {
        self.players
            .values()
            .map(Player::record)
            .chain(self.enemies.iter().map(Enemy::record))
            .chain(self.projectiles.iter().map(Projectile::record))
            .collect()
    }

    /// The `GAMESTATE` payload for the current world; empty when there are no entities.
    pub fn render_snapshot(&self) -> String {
        encode_snapshot(&self.records())
    }
}
