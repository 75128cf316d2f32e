//! Event-stream supervision: one live connection at a time, reconnected
//! with exponential backoff until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use relay_core::BackoffState;
use relay_mattermost::{MattermostApiClient, MattermostWebSocket, PostedEvent};

use crate::shutdown::ShutdownSignal;

/// One physical event-stream connection.
#[async_trait]
pub trait EventConnection: Send {
    /// Next posted event; `Ok(None)` when the peer ended the stream.
    async fn next_event(&mut self) -> Result<Option<PostedEvent>>;

    /// Closes the connection deliberately.
    async fn close(&mut self);
}

#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventConnection>>;
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: PostedEvent);
}

#[async_trait]
impl EventConnection for MattermostWebSocket {
    async fn next_event(&mut self) -> Result<Option<PostedEvent>> {
        Ok(self.next_posted().await?)
    }

    async fn close(&mut self) {
        MattermostWebSocket::close(self).await;
    }
}

/// Opens authenticated websocket sessions with the REST client's token.
pub struct MattermostEventConnector {
    client: Arc<MattermostApiClient>,
}

impl MattermostEventConnector {
    pub fn new(client: Arc<MattermostApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventStreamConnector for MattermostEventConnector {
    async fn connect(&self) -> Result<Box<dyn EventConnection>> {
        let token = self
            .client
            .token()
            .ok_or_else(|| anyhow!("event stream requires an authenticated chat session"))?;
        let socket = MattermostWebSocket::connect(self.client.server_url(), &token)
            .await
            .context("failed to open chat websocket")?;
        Ok(Box::new(socket))
    }
}

/// What the supervisor did before it returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub connections: u32,
    pub failed_attempts: u32,
    /// Every wait taken before a reconnect attempt, in order.
    pub reconnect_delays: Vec<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Dropped,
    ShutdownRequested,
}

/// Keeps exactly one event-stream connection alive.
///
/// Sessions run strictly one after another: a new connection is only opened
/// after the previous receive loop has returned. Events are handled inline,
/// so handlers never run concurrently with each other; a shutdown abandons
/// the handler that is running.
pub struct EventStreamSupervisor {
    connector: Arc<dyn EventStreamConnector>,
    handler: Arc<dyn EventHandler>,
    backoff: BackoffState,
    shutdown: ShutdownSignal,
}

impl EventStreamSupervisor {
    pub fn new(
        connector: Arc<dyn EventStreamConnector>,
        handler: Arc<dyn EventHandler>,
        backoff: BackoffState,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            connector,
            handler,
            backoff,
            shutdown,
        }
    }

    /// Runs until shutdown (`Ok`) or until the backoff policy gives up
    /// without a shutdown having been requested (`Err`).
    pub async fn run(mut self) -> Result<StreamSummary> {
        let mut summary = StreamSummary::default();
        loop {
            if self.shutdown.is_triggered() {
                return Ok(summary);
            }
            tracing::info!(attempt = self.backoff.attempt() + 1, "connecting event stream");
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(summary),
                connected = self.connector.connect() => connected,
            };

            let failure = match connected {
                Ok(mut connection) => {
                    summary.connections += 1;
                    self.backoff.record_success();
                    tracing::info!(connections = summary.connections, "event stream connected");
                    match self.receive(connection.as_mut()).await {
                        SessionEnd::ShutdownRequested => {
                            connection.close().await;
                            tracing::info!("event stream closed for shutdown");
                            return Ok(summary);
                        }
                        SessionEnd::Dropped => anyhow!("event stream connection lost"),
                    }
                }
                Err(error) => {
                    summary.failed_attempts += 1;
                    error
                }
            };

            if self.shutdown.is_triggered() {
                return Ok(summary);
            }
            let Some(delay) = self.backoff.record_failure() else {
                return Err(failure.context(format!(
                    "event stream reconnect gave up after {} attempts",
                    self.backoff.attempt()
                )));
            };
            summary.reconnect_delays.push(delay);
            tracing::warn!(
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                error = %format!("{failure:#}"),
                "event stream down, reconnecting"
            );
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(summary),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn receive(&self, connection: &mut dyn EventConnection) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return SessionEnd::ShutdownRequested,
                next = connection.next_event() => next,
            };
            match next {
                Ok(Some(event)) => {
                    // In-flight handlers are abandoned on shutdown.
                    tokio::select! {
                        biased;
                        _ = self.shutdown.wait() => return SessionEnd::ShutdownRequested,
                        _ = self.handler.handle_event(event) => {}
                    }
                }
                Ok(None) => return SessionEnd::Dropped,
                Err(error) => {
                    tracing::warn!(error = %format!("{error:#}"), "event stream read failed");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}
