//! One client connection: inbound command lines and the outbound line queue.

use crate::hub::{BroadcastHub, Outbound, SessionSink};
use arena_shared::{parse_client_line, ClientInput, ServerMessage};
use log::{debug, info, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::time::timeout;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// What the reader should do after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Quit,
}

pub struct Session {
    player_id: u32,
    hub: Arc<BroadcastHub>,
    sink: Arc<dyn SessionSink>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Session {
    pub fn new(player_id: u32, hub: Arc<BroadcastHub>, sink: Arc<dyn SessionSink>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            player_id,
            hub,
            sink,
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queues a line for this client only.
    pub fn send(&self, message: &ServerMessage) -> bool {
        self.sink.push_line(&message.to_string()).is_ok()
    }

    /// Parses one inbound line and applies it.
    pub async fn handle_line(&self, line: &str) -> LineOutcome {
        match parse_client_line(line) {
            ClientInput::Command(command) => {
                let mut game = self.hub.game().write().await;
                game.apply_command(self.player_id, command, Instant::now());
            }
            ClientInput::Empty => {}
            ClientInput::Unknown(token) => {
                debug!("Player {} sent unknown command {:?}", self.player_id, token);
                if !self.send(&ServerMessage::unknown_command(&token)) {
                    debug!("Player {} went away before the reply was queued", self.player_id);
                }
            }
            ClientInput::Quit => return LineOutcome::Quit,
        }
        LineOutcome::Continue
    }

    /// Tears the session down: unregisters it and removes its player.
    ///
    /// Only the first call does anything; it returns whether this call did the work.
    pub async fn close(&self, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Player {} disconnected ({})", self.player_id, reason);
        self.shutdown.send_replace(true);
        self.hub.unregister(self.player_id).await;
        true
    }

    /// Reads lines until EOF, a read error, a quit command or an external close.
    pub async fn read_inbound<R>(&self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut shutdown = self.shutdown.subscribe();
        let mut lines = BufReader::new(reader).lines();

        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                _ = shutdown.changed() => return,
                next = lines.next_line() => match next {
                    Ok(Some(line)) => {
                        if self.handle_line(&line).await == LineOutcome::Quit {
                            self.close("quit").await;
                            return;
                        }
                    }
                    Ok(None) => {
                        self.close("connection closed").await;
                        return;
                    }
                    Err(e) => {
                        warn!("Read error from player {}: {}", self.player_id, e);
                        self.close("read error").await;
                        return;
                    }
                },
            }
        }
    }

    /// Writes queued lines until the session closes, then flushes what is left.
    ///
    /// A stalled queue or a failed write tears the session down.
    pub async fn write_outbound<W>(&self, mut writer: W, mut outbound: Outbound)
    where
        W: AsyncWrite + Unpin,
    {
        let mut shutdown = self.shutdown.subscribe();
        let stall = outbound.stall_signal();

        let result: io::Result<()> = async {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let line = tokio::select! {
                    biased;
                    _ = stall.stalled() => return Err(queue_full()),
                    _ = shutdown.changed() => break,
                    line = outbound.recv() => match line {
                        Some(line) => line,
                        None => break,
                    },
                };

                tokio::select! {
                    biased;
                    written = write_line(&mut writer, line) => written?,
                    _ = stall.stalled() => return Err(queue_full()),
                    _ = shutdown.changed() => return Ok(()),
                }
            }

            // Never wait on a peer that stopped reading.
            let flushed = timeout(FLUSH_TIMEOUT, async {
                while let Some(line) = outbound.try_recv() {
                    write_line(&mut writer, line).await?;
                }
                writer.shutdown().await
            })
            .await;
            flushed.unwrap_or(Ok(()))
        }
        .await;

        if let Err(e) = result {
            warn!("Dropping player {}: {}", self.player_id, e);
            self.close("write error").await;
        }
    }
}

fn queue_full() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "outbound queue full")
}

async fn write_line<W>(writer: &mut W, mut line: String) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Drives a session over a split transport until it closes.
pub async fn serve<R, W>(
    session: Arc<Session>,
    reader: R,
    writer: W,
    outbound: Outbound,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.write_outbound(writer, outbound).await }
    });

    session.read_inbound(reader).await;

    if let Err(e) = writer_task.await {
        warn!("Writer task for player {} failed: {}", session.player_id(), e);
    }
}
