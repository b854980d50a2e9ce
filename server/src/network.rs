//! Server network layer: TCP accept loop, player assignment and task wiring

use crate::config::ServerConfig;
use crate::game::GameState;
use crate::hub::{BroadcastHub, ChannelSink, SessionSink};
use crate::session::{self, Session};
use arena_shared::{ServerMessage, CONTROLS_HINT, OBJECTIVE_HINT};
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

/// Lines every client receives right after connecting, before any snapshot.
pub fn welcome_messages(player_id: u32) -> [ServerMessage; 3] {
    [
        ServerMessage::Welcome { player_id },
        ServerMessage::Info(CONTROLS_HINT.to_string()),
        ServerMessage::Info(OBJECTIVE_HINT.to_string()),
    ]
}

/// Main server coordinating connections and the tick scheduler
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    next_player_id: u32,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self::from_listener(listener, config))
    }

    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        let game = GameState::new(config.game.clone());
        let hub = Arc::new(BroadcastHub::new(Arc::new(RwLock::new(game))));

        Self {
            listener,
            config,
            hub,
            next_player_id: 1,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        Arc::clone(&self.hub)
    }

    /// Starts the tick scheduler and accepts clients until the process exits.
    ///
    /// Accept errors are logged and retried, so this only returns if the runtime stops it.
    pub async fn run(mut self) -> io::Result<()> {
        tokio::spawn(Arc::clone(&self.hub).run_tick_loop(self.config.tick_period()));
        info!(
            "Server started successfully ({} Hz, max {} players)",
            self.config.tick_rate, self.config.max_players
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.handle_connection(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn handle_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.hub.len().await >= self.config.max_players {
            warn!("Rejecting connection from {}: server full", addr);
            tokio::spawn(reject(stream));
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;
        info!("Player {} connected from {}", player_id, addr);

        let (reader, writer) = stream.into_split();
        let (sink, outbound) = ChannelSink::new();
        let sink: Arc<dyn SessionSink> = Arc::new(sink);
        let session = Arc::new(Session::new(
            player_id,
            Arc::clone(&self.hub),
            Arc::clone(&sink),
        ));

        self.hub.game().write().await.add_player(player_id);
        // Queued before registering so no snapshot can overtake the greeting.
        for message in welcome_messages(player_id) {
            if !session.send(&message) {
                debug!("Greeting for player {} was not queued", player_id);
            }
        }
        self.hub.register(player_id, sink).await;

        tokio::spawn(session::serve(session, reader, writer, outbound));
    }
}

async fn reject(mut stream: TcpStream) {
    let line = format!("{}\n", ServerMessage::Info("Server full".to_string()));
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        warn!("Failed to notify rejected client: {}", e);
    }
    if let Err(e) = stream.shutdown().await {
        debug!("Failed to shut down rejected connection: {}", e);
    }
}
