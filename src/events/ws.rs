//! WebSocket feed server
//!
//! Fans the event bus out to WebSocket subscribers. Strictly one-way:
//! inbound frames other than close are ignored. A subscriber that falls
//! behind the broadcast buffer is disconnected rather than allowed to
//! apply backpressure to the trading loop.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use super::{EventBus, FeedEvent};

pub struct FeedServer {
    bus: EventBus,
    listener: TcpListener,
}

impl FeedServer {
    /// Bind the feed listener. Failing to bind is a startup error; the
    /// trading loop does not depend on this server.
    pub async fn bind(bus: EventBus, bind_addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Event feed listening");
        Ok(Self { bus, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept subscribers until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let rx = self.bus.subscribe();
                            tokio::spawn(handle_subscriber(stream, peer, rx));
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Feed accept failed");
                        }
                    }
                }
            }
        }
        tracing::info!("Event feed stopped");
    }
}

async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<FeedEvent>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    tracing::info!(%peer, "Feed subscriber connected");
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::debug!(error = %e, "Failed to serialize feed event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(%peer, missed = n, "Subscriber too slow, dropping");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    tracing::info!(%peer, "Feed subscriber disconnected");
}
