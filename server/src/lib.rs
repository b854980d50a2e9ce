//! # Arena Server Library
//!
//! Authoritative server for a small real-time arena shooter. Clients hold a
//! persistent newline-delimited TCP connection, send single-token commands and
//! receive the whole world as a `GAMESTATE` line every tick.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The authoritative simulation: players, enemies and projectiles, command
//! application and the fixed-order tick (spawn, projectiles, enemy AI, hits,
//! contact damage). It performs no I/O.
//!
//! ### Hub Module (`hub`)
//! Registry of live sessions and the fixed-rate scheduler. Each tick and its
//! snapshot render run under a single write guard on the shared world; the
//! snapshot is then fanned out and dead sessions are pruned.
//!
//! ### Session Module (`session`)
//! One task pair per connection. The reader turns lines into commands, the
//! writer drains the outbound queue. Teardown happens exactly once no matter
//! which side notices the disconnect first.
//!
//! ### Network Module (`network`)
//! TCP accept loop, player id assignment, capacity limit and the greeting.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use arena_server::config::ServerConfig;
//! use arena_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod hub;
pub mod network;
pub mod session;
