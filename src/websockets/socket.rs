use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::warn;

use crate::event::EventMessage;

/// What the client sent us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame for the frame handler
    Text(String),
    /// A ping or pong; proves the peer is alive and nothing more
    Heartbeat,
    /// The client closed the connection
    Closed,
}

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text frame to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Send a keep-alive ping
    async fn send_ping(&mut self) -> Result<(), SocketError>;

    /// Receive the next frame of interest from the client
    async fn receive_message(&mut self) -> Result<Inbound, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for incoming text frames
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, client_id: &str, frame: String);
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
    #[error("no pong from client for {0:?}")]
    Unresponsive(Duration),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), SocketError> {
        self.send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Inbound, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Inbound::Text(text)),
                // Pings are answered by axum itself
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                    return Ok(Inbound::Heartbeat)
                }
                Some(Ok(Message::Close(_))) => return Ok(Inbound::Closed),
                Some(Ok(Message::Binary(_))) => continue,
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
                None => return Ok(Inbound::Closed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// Keep-alive timings for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How often a ping is sent
    pub ping_interval: Duration,
    /// Silence after which the peer is considered gone
    pub pong_timeout: Duration,
    /// Upper bound on a single socket write
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// A managed client connection
///
/// Drains the client's hub queue onto the socket, one JSON message per text
/// frame, and feeds inbound frames to the frame handler. The loop ends when
/// the client disconnects, the hub drops the client's queue, a write stalls
/// past the write timeout, or the client stays silent past the pong timeout.
pub struct Connection {
    pub client_id: String,
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::Receiver<Arc<EventMessage>>,
    frame_handler: Arc<dyn FrameHandler>,
    settings: ConnectionSettings,
}

impl Connection {
    pub fn new(
        client_id: String,
        socket: Box<dyn SocketWrapper>,
        outbound_receiver: mpsc::Receiver<Arc<EventMessage>>,
        frame_handler: Arc<dyn FrameHandler>,
        settings: ConnectionSettings,
    ) -> Self {
        let floor = Duration::from_millis(1);
        Self {
            client_id,
            socket,
            outbound_receiver,
            frame_handler,
            settings: ConnectionSettings {
                ping_interval: settings.ping_interval.max(floor),
                pong_timeout: settings.pong_timeout.max(floor),
                write_timeout: settings.write_timeout.max(floor),
            },
        }
    }

    /// Run the connection - handles both sending and receiving until disconnect
    pub async fn run(mut self) -> Result<(), SocketError> {
        let ConnectionSettings {
            ping_interval,
            pong_timeout,
            write_timeout,
        } = self.settings;
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_heard = Instant::now();

        loop {
            tokio::select! {
                // Messages routed to this client by the hub
                msg = self.outbound_receiver.recv() => {
                    match msg {
                        Some(message) => match serde_json::to_string(message.as_ref()) {
                            Ok(text) => {
                                bounded_write(write_timeout, self.socket.send_message(text)).await?
                            }
                            Err(e) => warn!(
                                client_id = %self.client_id,
                                message_id = %message.id,
                                error = %e,
                                "Failed to serialize outbound message"
                            ),
                        },
                        None => break, // Hub dropped this client
                    }
                }

                _ = ping.tick() => {
                    if last_heard.elapsed() > pong_timeout {
                        return Err(SocketError::Unresponsive(pong_timeout));
                    }
                    bounded_write(write_timeout, self.socket.send_ping()).await?;
                }

                // Frames sent by the client
                msg = self.socket.receive_message() => {
                    match msg? {
                        Inbound::Text(frame) => {
                            last_heard = Instant::now();
                            self.frame_handler.handle_frame(&self.client_id, frame).await;
                        }
                        Inbound::Heartbeat => last_heard = Instant::now(),
                        Inbound::Closed => break, // Client disconnected
                    }
                }
            }
        }

        // Clean disconnect
        let _ = timeout(write_timeout, self.socket.close()).await;
        Ok(())
    }
}

async fn bounded_write<F>(limit: Duration, write: F) -> Result<(), SocketError>
where
    F: Future<Output = Result<(), SocketError>>,
{
    timeout(limit, write)
        .await
        .map_err(|_| SocketError::WriteTimeout(limit))?
}
