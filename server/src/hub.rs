//! Session registry and the fixed-rate tick scheduler.
//!
//! The hub owns the shared world and every live session's outbound sink. Each
//! scheduler cycle advances the world, renders one snapshot under the same write
//! guard and fans the resulting `GAMESTATE` line out to all registered sessions.
//! Sessions whose transport has gone away are pruned lazily during delivery.

use crate::game::GameState;
use arena_shared::ServerMessage;
use log::{debug, error, info};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, RwLock};

/// The world shared between the scheduler and every session task.
pub type SharedGame = Arc<RwLock<GameState>>;

/// Returned when a line can no longer be handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("session is closed")
    }
}

impl std::error::Error for SessionClosed {}

/// Outbound half of a session as seen by the hub.
pub trait SessionSink: Send + Sync {
    /// Queues one line for delivery. Best effort: a failure means the session is gone.
    fn push_line(&self, line: &str) -> Result<(), SessionClosed>;

    fn is_connected(&self) -> bool;
}

/// Lines a session may have queued before it counts as stalled.
pub const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Stall {
    flagged: AtomicBool,
    notify: Notify,
}

/// Sink backed by a bounded channel drained by the session's writer task.
///
/// Once the writer stops (write error or shutdown) the receiver is dropped and the
/// sink reports itself disconnected. A full queue means the peer stopped reading:
/// the line is refused, the sink reports itself disconnected and the writer is woken
/// through its `StallSignal` so the session can tear itself down.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    stall: Arc<Stall>,
}

/// Receiving half of a `ChannelSink`, owned by the session's writer.
#[derive(Debug)]
pub struct Outbound {
    rx: mpsc::Receiver<String>,
    stall: Arc<Stall>,
}

impl ChannelSink {
    pub fn new() -> (Self, Outbound) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stall = Arc::new(Stall::default());
        (
            Self {
                tx,
                stall: Arc::clone(&stall),
            },
            Outbound { rx, stall },
        )
    }
}

impl SessionSink for ChannelSink {
    fn push_line(&self, line: &str) -> Result<(), SessionClosed> {
        match self.tx.try_send(line.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if !self.stall.flagged.swap(true, Ordering::SeqCst) {
                    self.stall.notify.notify_one();
                }
                Err(SessionClosed)
            }
            Err(TrySendError::Closed(_)) => Err(SessionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed() && !self.stall.flagged.load(Ordering::SeqCst)
    }
}

impl Outbound {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    pub fn stall_signal(&self) -> StallSignal {
        StallSignal(Arc::clone(&self.stall))
    }
}

/// Fires once the matching sink has refused a line because the queue was full.
#[derive(Debug, Clone)]
pub struct StallSignal(Arc<Stall>);

impl StallSignal {
    pub fn is_stalled(&self) -> bool {
        self.0.flagged.load(Ordering::SeqCst)
    }

    pub async fn stalled(&self) {
        if self.is_stalled() {
            return;
        }
        self.0.notify.notified().await;
    }
}

pub struct BroadcastHub {
    game: SharedGame,
    sessions: RwLock<HashMap<u32, Arc<dyn SessionSink>>>,
}

impl BroadcastHub {
    pub fn new(game: SharedGame) -> Self {
        Self {
            game,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    pub async fn register(&self, player_id: u32, sink: Arc<dyn SessionSink>) {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(player_id, sink).is_some() {
            debug!("Replaced existing session for player {}", player_id);
        }
    }

    /// Drops the session and removes its player from the world.
    ///
    /// Safe to call more than once and for sessions already pruned by `deliver`.
    pub async fn unregister(&self, player_id: u32) {
        self.sessions.write().await.remove(&player_id);
        self.game.write().await.remove_player(player_id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Sends `line` to every registered session and returns how many accepted it.
    ///
    /// Sessions that report themselves disconnected, or reject the line, are pruned.
    pub async fn deliver(&self, line: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (&player_id, sink) in sessions.iter() {
                if !sink.is_connected() || sink.push_line(line).is_err() {
                    dead.push((player_id, Arc::clone(sink)));
                    continue;
                }
                delivered += 1;
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write().await;
            for (player_id, sink) in dead {
                // The slot may have been re-registered since the read pass.
                if sessions
                    .get(&player_id)
                    .map_or(false, |current| same_sink(current, &sink))
                {
                    sessions.remove(&player_id);
                    debug!("Pruned disconnected session for player {}", player_id);
                }
            }
        }

        delivered
    }

    /// Runs one simulation step and broadcasts the resulting snapshot.
    ///
    /// Returns the number of sessions that received a `GAMESTATE` line. A panic inside
    /// the simulation is logged and the cycle is skipped.
    pub async fn run_tick(&self, now: Instant) -> usize {
        let payload = {
            let mut game = self.game.write().await;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                game.tick(now);
                if game.tick % 100 == 0 {
                    debug!(
                        "Tick {}: {} players, {} enemies, {} projectiles",
                        game.tick,
                        game.player_count(),
                        game.enemies().len(),
                        game.projectiles().len()
                    );
                }
                game.render_snapshot()
            }));

            match outcome {
                Ok(payload) => payload,
                Err(_) => {
                    error!("Simulation panicked during tick {}, skipping", game.tick);
                    return 0;
                }
            }
        };

        if payload.is_empty() {
            return 0;
        }

        let line = ServerMessage::GameState(payload).to_string();
        self.deliver(&line).await
    }

    /// Fixed-rate scheduler: measure, tick, sleep the remainder of the period.
    ///
    /// Overruns are not caught up; the next cycle starts immediately instead.
    pub async fn run_tick_loop(self: Arc<Self>, period: Duration) {
        info!("Tick loop started ({:?} per tick)", period);

        loop {
            let started = Instant::now();
            self.run_tick(started).await;

            match period.checked_sub(started.elapsed()) {
                Some(remaining) => tokio::time::sleep(remaining).await,
                None => {
                    debug!("Tick overran its {:?} budget", period);
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

fn same_sink(a: &Arc<dyn SessionSink>, b: &Arc<dyn SessionSink>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
