//! WebSocket signal server implementation

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use tandem_core::{IdGenerator, RelayConfig, RelayError};

use crate::http;
use crate::outbox::Outbox;
use crate::router::{RelayStats, Session, SignalRouter};

/// State shared by every connection task
struct Shared {
    router: SignalRouter,
    ids: IdGenerator,
    outbound_queue: usize,
    public_dir: PathBuf,
}

/// Signal server
pub struct SignalServer {
    shared: Arc<Shared>,
}

impl SignalServer {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                router: SignalRouter::from_config(config),
                ids: IdGenerator::new(),
                outbound_queue: config.outbound_queue,
                public_dir: config.public_dir.clone(),
            }),
        }
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), RelayError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let shared = self.shared.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, &shared).await {
                    debug!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    /// Registered connections and publishers (for monitoring)
    pub fn stats(&self) -> RelayStats {
        self.shared.router.stats()
    }
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    shared: &Shared,
) -> Result<(), RelayError> {
    let head = http::peek_head(&stream).await?;
    if head.is_empty() {
        return Ok(());
    }

    if !http::is_websocket_upgrade(&head) || http::head_too_large(&head) {
        return http::handle_http_request(&mut stream, &head, &shared.router, &shared.public_dir)
            .await;
    }

    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| RelayError::WebSocket(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let id = shared.ids.next_id()?;
    let (outbox, mut outbound) = Outbox::channel(shared.outbound_queue);
    let mut session = Session::new(id.clone(), outbox);
    debug!("New connection from {} as {}", peer_addr, id);

    // Ends when every sender is gone (connection left or was evicted) or the socket fails
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match msg.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode {}: {}", msg.kind(), e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.router.handle_frame(&mut session, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("WebSocket error from {}: {}", id, e);
                    break;
                }
            },
            _ = &mut writer => {
                debug!("Writer for {} finished", id);
                break;
            }
        }
    }

    let role = session.role().map_or("unjoined", |r| r.as_str());
    shared.router.disconnect(session);
    debug!("Connection closed: {} ({})", id, role);
    Ok(())
}
