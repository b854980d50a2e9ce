//! Wire protocol and gameplay constants shared by the arena server and its clients.
//!
//! The protocol is line oriented: every message is one UTF-8 line terminated by `\n`.
//! Clients send single command tokens, the server answers with `PREFIX:body` lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 12345;
pub const TICK_RATE: u32 = 20;

pub const PLAYER_BOUND: i32 = 50;
pub const PROJECTILE_BOUND: i32 = 100;
pub const MOVE_STEP: i32 = 2;
pub const PROJECTILE_SPEED: i32 = 5;
pub const SHOT_COOLDOWN_MS: u64 = 300;

pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const ENEMY_HEALTH: i32 = 20;
pub const ENEMY_SPAWN_INTERVAL_MS: u64 = 2000;
/// Half the side of the square enemies spawn on.
pub const ENEMY_SPAWN_EXTENT: i32 = 60;
pub const PROJECTILE_DAMAGE: i32 = 10;
pub const KILL_SCORE: u32 = 10;
pub const CONTACT_DAMAGE: i32 = 1;
/// Entities collide when within this many units on both axes.
pub const COLLISION_RANGE: i32 = 2;

pub const CONTROLS_HINT: &str = "Controls: WASD to move, IJKL to shoot, Q to quit";
pub const OBJECTIVE_HINT: &str = "Survive against the enemies! Kill them for points!";

/// Unit step along one axis. Screen coordinates: `Up` decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A gameplay command issued by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Move(Direction),
    Shoot(Direction),
}

impl Command {
    /// Canonical token as accepted on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Move(Direction::Up) => "UP",
            Command::Move(Direction::Down) => "DOWN",
            Command::Move(Direction::Left) => "LEFT",
            Command::Move(Direction::Right) => "RIGHT",
            Command::Shoot(Direction::Up) => "SHOOT_UP",
            Command::Shoot(Direction::Down) => "SHOOT_DOWN",
            Command::Shoot(Direction::Left) => "SHOOT_LEFT",
            Command::Shoot(Direction::Right) => "SHOOT_RIGHT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    Command(Command),
    Quit,
    Empty,
    Unknown(String),
}

/// Decodes a raw client line. Tokens are case-insensitive and surrounding
/// whitespace is ignored; both full names and single-letter aliases are accepted.
pub fn parse_client_line(line: &str) -> ClientInput {
    let token = line.trim();
    if token.is_empty() {
        return ClientInput::Empty;
    }

    let command = match token.to_ascii_uppercase().as_str() {
        "W" | "UP" => Command::Move(Direction::Up),
        "S" | "DOWN" => Command::Move(Direction::Down),
        "A" | "LEFT" => Command::Move(Direction::Left),
        "D" | "RIGHT" => Command::Move(Direction::Right),
        "I" | "SHOOT_UP" => Command::Shoot(Direction::Up),
        "K" | "SHOOT_DOWN" => Command::Shoot(Direction::Down),
        "J" | "SHOOT_LEFT" => Command::Shoot(Direction::Left),
        "L" | "SHOOT_RIGHT" => Command::Shoot(Direction::Right),
        "Q" | "QUIT" | "EXIT" => return ClientInput::Quit,
        _ => return ClientInput::Unknown(token.to_string()),
    };

    ClientInput::Command(command)
}

/// Errors raised while decoding server lines or snapshot records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    UnknownPrefix(String),
    MalformedRecord(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownPrefix(line) => write!(f, "unknown message prefix in {line:?}"),
            ProtocolError::MalformedRecord(record) => write!(f, "malformed record {record:?}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Welcome { player_id: u32 },
    Info(String),
    GameState(String),
}

impl ServerMessage {
    pub fn unknown_command(token: &str) -> Self {
        ServerMessage::Info(format!("Unknown command: {token}"))
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { player_id } => {
                write!(f, "WELCOME:Connected as Player {player_id}")
            }
            ServerMessage::Info(text) => write!(f, "INFO:{text}"),
            ServerMessage::GameState(payload) => write!(f, "GAMESTATE:{payload}"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = line.strip_prefix("WELCOME:Connected as Player ") {
            let player_id = rest
                .trim()
                .parse()
                .map_err(|_| ProtocolError::MalformedRecord(line.to_string()))?;
            Ok(ServerMessage::Welcome { player_id })
        } else if let Some(text) = line.strip_prefix("INFO:") {
            Ok(ServerMessage::Info(text.to_string()))
        } else if let Some(payload) = line.strip_prefix("GAMESTATE:") {
            Ok(ServerMessage::GameState(payload.to_string()))
        } else {
            Err(ProtocolError::UnknownPrefix(line.to_string()))
        }
    }
}

/// One entity inside a `GAMESTATE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntityRecord {
    Player {
        id: u32,
        x: i32,
        y: i32,
        health: i32,
        score: u32,
        alive: bool,
    },
    Enemy {
        id: u64,
        x: i32,
        y: i32,
        health: i32,
    },
    Projectile {
        id: u64,
        x: i32,
        y: i32,
        owner_id: u32,
    },
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRecord::Player {
                id,
                x,
                y,
                health,
                score,
                alive,
            } => write!(f, "PLAYER:{id}:{x}:{y}:{health}:{score}:{alive}"),
            EntityRecord::Enemy { id, x, y, health } => write!(f, "ENEMY:{id}:{x}:{y}:{health}"),
            EntityRecord::Projectile { id, x, y, owner_id } => {
                write!(f, "PROJECTILE:{id}:{x}:{y}:{owner_id}")
            }
        }
    }
}

impl FromStr for EntityRecord {
    type Err = ProtocolError;

    fn from_str(record: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedRecord(record.to_string());
        let fields: Vec<&str> = record.split(':').collect();

        fn field<T: FromStr>(fields: &[&str], index: usize) -> Option<T> {
            fields.get(index).and_then(|v| v.parse().ok())
        }

        let parsed = match (fields.first().copied(), fields.len()) {
            (Some("PLAYER"), 7) => Some(EntityRecord::Player {
                id: field(&fields, 1).ok_or_else(malformed)?,
                x: field(&fields, 2).ok_or_else(malformed)?,
                y: field(&fields, 3).ok_or_else(malformed)?,
                health: field(&fields, 4).ok_or_else(malformed)?,
                score: field(&fields, 5).ok_or_else(malformed)?,
                alive: field(&fields, 6).ok_or_else(malformed)?,
            }),
            (Some("ENEMY"), 5) => Some(EntityRecord::Enemy {
                id: field(&fields, 1).ok_or_else(malformed)?,
                x: field(&fields, 2).ok_or_else(malformed)?,
                y: field(&fields, 3).ok_or_else(malformed)?,
                health: field(&fields, 4).ok_or_else(malformed)?,
            }),
            (Some("PROJECTILE"), 5) => Some(EntityRecord::Projectile {
                id: field(&fields, 1).ok_or_else(malformed)?,
                x: field(&fields, 2).ok_or_else(malformed)?,
                y: field(&fields, 3).ok_or_else(malformed)?,
                owner_id: field(&fields, 4).ok_or_else(malformed)?,
            }),
            _ => None,
        };

        parsed.ok_or_else(malformed)
    }
}

/// Joins records into a `GAMESTATE` payload. An empty world yields an empty string.
pub fn encode_snapshot(records: &[EntityRecord]) -> String {
    records
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// Splits a `GAMESTATE` payload back into records.
pub fn decode_snapshot(payload: &str) -> Result<Vec<EntityRecord>, ProtocolError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    payload.split('|').map(EntityRecord::from_str).collect()
}

/// Max of the absolute per-axis differences.
pub fn chebyshev_distance(a: (i32, i32), b: (i32, i32)) -> i32 {
    (a.0 - b.0).abs().max((a.1 - b.1).abs())
}

pub fn euclidean_distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = f64::from(b.0) - f64::from(a.0);
    let dy = f64::from(b.1) - f64::from(a.1);
    (dx * dx + dy * dy).sqrt()
}
