//! Integration tests for the arena server
//!
//! These tests validate cross-crate interactions and real TCP behavior.

use arena_server::config::{GameConfig, ServerConfig, UnknownPlayerPolicy};
use arena_server::game::GameState;
use arena_server::network::Server;
use arena_shared::{decode_snapshot, Command, Direction, EntityRecord, ServerMessage};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Snapshots rendered by the server decode back into the same records
    #[test]
    fn rendered_snapshot_decodes() {
        let t0 = Instant::now();
        let mut game = GameState::starting_at(seeded_game(), t0);
        game.add_player(1);
        game.add_player(2);
        game.spawn_enemy_at(-60, 12);
        game.apply_command(2, Command::Shoot(Direction::Left), t0);

        let records = decode_snapshot(&game.render_snapshot()).unwrap();

        assert_eq!(records, game.records());
        assert_eq!(records.len(), 4);
    }

    /// Every line the server emits carries a known prefix
    #[test]
    fn server_lines_parse() {
        for line in [
            "WELCOME:Connected as Player 12",
            "INFO:Unknown command: fly",
            "GAMESTATE:PLAYER:1:0:0:100:0:true",
        ] {
            let message: ServerMessage = line.parse().unwrap();
            assert_eq!(message.to_string(), line);
        }
    }
}

/// GAME LOGIC INTEGRATION TESTS
mod game_logic_tests {
    use super::*;

    /// Two players join, one moves right and fires; one tick later both players and
    /// the advanced projectile are present
    #[test]
    fn two_player_scenario() {
        let t0 = Instant::now();
        let mut game = GameState::starting_at(seeded_game(), t0);
        game.add_player(1);
        game.add_player(2);

        game.apply_command(1, Command::Move(Direction::Right), t0);
        game.apply_command(1, Command::Shoot(Direction::Right), t0);
        game.tick(t0 + Duration::from_millis(50));

        assert_eq!(
            game.render_snapshot(),
            "PLAYER:1:2:0:100:0:true|PLAYER:2:0:0:100:0:true|PROJECTILE:1:7:0:1"
        );
    }

    /// A player pinned by an enemy loses one health per tick until dead
    #[test]
    fn sustained_contact_kills() {
        let t0 = Instant::now();
        let mut game = GameState::starting_at(seeded_game(), t0);
        game.add_player(1);
        game.spawn_enemy_at(1, 1);

        // Stay below the spawn interval so only the placed enemy is involved.
        for tick in 1..=100u64 {
            game.tick(t0 + Duration::from_millis(tick * 10));
        }

        let player = game.player(1).unwrap();
        assert_eq!(player.health, 0);
        assert!(!player.alive);
        assert!(game
            .render_snapshot()
            .starts_with("PLAYER:1:0:0:0:0:false|ENEMY:1:0:0:20"));
    }

    /// Shooting across the arena clears an approaching enemy and scores once
    #[test]
    fn shooting_enemy_scores() {
        let t0 = Instant::now();
        let mut game = GameState::starting_at(seeded_game(), t0);
        game.add_player(1);
        game.spawn_enemy_at(40, 0);

        let mut now = t0;
        for _ in 0..40 {
            now += Duration::from_millis(50);
            game.apply_command(1, Command::Shoot(Direction::Right), now);
            game.tick(now);
        }

        assert!(game.enemies().is_empty());
        assert_eq!(game.player(1).unwrap().score, 10);
        assert_eq!(game.player(1).unwrap().health, 100);
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    /// A new client gets the greeting lines before any snapshot
    #[tokio::test]
    async fn greeting_then_snapshots() {
        let addr = start_server(local_config()).await;
        let mut client = TestClient::connect(addr).await;

        assert_eq!(client.next_line().await, "WELCOME:Connected as Player 1");
        assert_eq!(
            client.next_line().await,
            "INFO:Controls: WASD to move, IJKL to shoot, Q to quit"
        );
        assert_eq!(
            client.next_line().await,
            "INFO:Survive against the enemies! Kill them for points!"
        );
        assert!(client.next_line().await.starts_with("GAMESTATE:PLAYER:1:0:0:100:0:true"));
    }

    /// Commands sent over the wire move the player in later snapshots
    #[tokio::test]
    async fn movement_reaches_snapshot() {
        let addr = start_server(local_config()).await;
        let mut client = TestClient::connect(addr).await;
        client.skip_greeting().await;

        client.send("d").await;
        client.send("RIGHT").await;

        client
            .wait_for_snapshot(|records| player(records, 1).map(|p| p.0) == Some(4))
            .await;
    }

    /// Unknown tokens are answered, empty lines are not
    #[tokio::test]
    async fn unknown_command_reply() {
        let addr = start_server(local_config()).await;
        let mut client = TestClient::connect(addr).await;
        client.skip_greeting().await;

        client.send("").await;
        client.send("dance").await;

        let reply = client
            .wait_for_line(|line| line.starts_with("INFO:"))
            .await;
        assert_eq!(reply, "INFO:Unknown command: dance");
    }

    /// Quitting closes the connection and removes the player for everyone else
    #[tokio::test]
    async fn quit_removes_player() {
        let addr = start_server(local_config()).await;
        let mut first = TestClient::connect(addr).await;
        first.skip_greeting().await;
        let mut second = TestClient::connect(addr).await;
        second.skip_greeting().await;

        second
            .wait_for_snapshot(|records| player(records, 1).is_some())
            .await;

        first.send("q").await;
        first.expect_eof().await;

        second
            .wait_for_snapshot(|records| {
                player(records, 1).is_none() && player(records, 2).is_some()
            })
            .await;
    }

    /// An abrupt disconnect of one client does not disturb the others
    #[tokio::test]
    async fn disconnection_isolation() {
        let addr = start_server(local_config()).await;
        let mut a = TestClient::connect(addr).await;
        a.skip_greeting().await;
        let b = TestClient::connect(addr).await;
        let mut c = TestClient::connect(addr).await;
        c.skip_greeting().await;

        drop(b);

        a.wait_for_snapshot(|records| {
            player(records, 1).is_some()
                && player(records, 2).is_none()
                && player(records, 3).is_some()
        })
        .await;

        c.send("S").await;
        a.wait_for_snapshot(|records| player(records, 3) == Some((0, 2)))
            .await;
    }

    /// Player ids are never reused after a disconnect
    #[tokio::test]
    async fn ids_not_reused() {
        let addr = start_server(local_config()).await;

        let mut first = TestClient::connect(addr).await;
        assert_eq!(first.next_line().await, "WELCOME:Connected as Player 1");
        first.send("quit").await;
        first.expect_eof().await;

        let mut second = TestClient::connect(addr).await;
        assert_eq!(second.next_line().await, "WELCOME:Connected as Player 2");
    }
}

/// STRESS AND ERROR HANDLING TESTS
mod stress_tests {
    use super::*;

    /// Many concurrent clients all see each other in the shared snapshot
    #[tokio::test]
    async fn many_clients() {
        let addr = start_server(local_config()).await;

        let mut clients = Vec::new();
        for _ in 0..8 {
            let mut client = TestClient::connect(addr).await;
            client.skip_greeting().await;
            clients.push(client);
        }

        for client in &mut clients {
            client.send("w").await;
        }

        let last = clients.last_mut().unwrap();
        last.wait_for_snapshot(|records| {
            (1..=8).all(|id| player(records, id) == Some((0, -2)))
        })
        .await;
    }

    /// Garbage input never takes the connection down
    #[tokio::test]
    async fn garbage_input_survives() {
        let addr = start_server(local_config()).await;
        let mut client = TestClient::connect(addr).await;
        client.skip_greeting().await;

        for junk in ["", "   ", "::::", "SHOOT_", "é", "GAMESTATE:PLAYER:1:9:9:100:0:true"] {
            client.send(junk).await;
        }
        client.send("a").await;

        client
            .wait_for_snapshot(|records| player(records, 1) == Some((-2, 0)))
            .await;
    }

    /// With lazy join enabled the simulation recreates unknown movers
    #[test]
    fn lazy_join_policy() {
        let t0 = Instant::now();
        let config = GameConfig {
            unknown_player_policy: UnknownPlayerPolicy::CreateOnMove,
            ..seeded_game()
        };
        let mut game = GameState::starting_at(config, t0);

        game.apply_command(5, Command::Move(Direction::Down), t0);

        assert_eq!(game.render_snapshot(), "PLAYER:5:0:2:100:0:true");
    }
}

fn seeded_game() -> GameConfig {
    GameConfig {
        rng_seed: Some(42),
        ..GameConfig::default()
    }
}

fn local_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".to_string(),
        game: seeded_game(),
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> SocketAddr {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// Position of a player in a decoded snapshot
fn player(records: &[EntityRecord], id: u32) -> Option<(i32, i32)> {
    records.iter().find_map(|record| match record {
        EntityRecord::Player { id: pid, x, y, .. } if *pid == id => Some((*x, *y)),
        _ => None,
    })
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn next_line(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("connection closed")
    }

    async fn skip_greeting(&mut self) {
        for _ in 0..3 {
            self.next_line().await;
        }
    }

    async fn wait_for_line(&mut self, pred: impl Fn(&str) -> bool) -> String {
        loop {
            let line = self.next_line().await;
            if pred(&line) {
                return line;
            }
        }
    }

    async fn wait_for_snapshot(&mut self, pred: impl Fn(&[EntityRecord]) -> bool) {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            let line = self.next_line().await;
            if let Ok(ServerMessage::GameState(payload)) = line.parse() {
                if pred(&decode_snapshot(&payload).unwrap()) {
                    return;
                }
            }
        }
        panic!("no matching snapshot within {:?}", WAIT);
    }

    async fn expect_eof(&mut self) {
        loop {
            match timeout(WAIT, self.lines.next_line()).await {
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) | Ok(Err(_)) => return,
                Err(_) => panic!("connection was not closed"),
            }
        }
    }
}
