//! Bus session with persistent connection and automatic reconnection

use futures::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};
use udpu_shared::codec;
use udpu_shared::state_machine::{
    SessionEvent, SessionState, SessionStateMachine, TransitionResult,
};
use udpu_shared::{timing, OutboundFrame};

use crate::backoff::Backoff;
use crate::error::{AgentError, AgentResult};
use crate::transport::{TransportConnector, TransportStream};

/// Events emitted by the bus session
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Subscribed and ready to receive commands
    Connected { transport: &'static str },
    /// Connection dropped; a reconnect is scheduled
    Disconnected { reason: String },
    /// Raw text frame received from the bus
    Received(String),
}

/// Configuration for the bus session
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Topic to subscribe to (the server-assigned subscriber id)
    pub subscriber_id: String,
    /// Bound on each write, including the handshake
    pub write_timeout: Duration,
    /// Outbound queue depth within one connection
    pub outbound_capacity: usize,
    /// Event queue depth
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            subscriber_id: String::new(),
            write_timeout: Duration::from_millis(timing::WRITE_TIMEOUT_MS),
            outbound_capacity: 100,
            event_capacity: 100,
        }
    }
}

/// Cloneable handle for publishing through the session
#[derive(Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::Sender<String>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Queue a frame for the active connection.
    ///
    /// Returns `false` when the frame was dropped: the session is not active,
    /// the frame could not be encoded, or the session task is gone.
    pub async fn send(&self, frame: &OutboundFrame) -> bool {
        if self.state() != SessionState::Active {
            warn!(
                call_id = %frame.request.call_id,
                state = %self.state(),
                "Bus not active, dropping frame"
            );
            return false;
        }

        let text = match codec::encode_result(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(call_id = %frame.request.call_id, "Failed to encode frame: {}", e);
                return false;
            }
        };

        self.outbound_tx.send(text).await.is_ok()
    }

    /// Wait until the session reaches `state`
    #[cfg(test)]
    pub async fn wait_for(&self, state: SessionState) -> bool {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|s| *s == state).await.is_ok();
        reached
    }

    /// Handle wired to a bare channel instead of a live session
    #[cfg(test)]
    pub fn detached(state: SessionState) -> (Self, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let (_state_tx, state_rx) = watch::channel(state);
        (
            Self {
                outbound_tx,
                state_rx,
            },
            outbound_rx,
        )
    }
}

/// Owns the bus connection for the lifetime of the process
pub struct BusSession {
    config: ConnectionConfig,
    handle: SessionHandle,
    /// Channel to receive session events
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl BusSession {
    /// Create a new session and start the connection loop
    pub fn new<C>(config: ConnectionConfig, connector: C, backoff: Box<dyn Backoff>) -> Self
    where
        C: TransportConnector,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(config.outbound_capacity);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        // Spawn the connection loop
        let config_clone = config.clone();
        tokio::spawn(async move {
            connection_loop(config_clone, connector, backoff, outbound_rx, event_tx, state_tx)
                .await;
        });

        Self {
            config,
            handle: SessionHandle {
                outbound_tx,
                state_rx,
            },
            event_rx,
        }
    }

    /// Receive the next session event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Get a clone of the publish handle
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn subscriber_id(&self) -> &str {
        &self.config.subscriber_id
    }
}

/// Apply an event to the state machine and publish the resulting state
fn transition(
    fsm: &mut SessionStateMachine,
    state_tx: &watch::Sender<SessionState>,
    event: SessionEvent,
) -> TransitionResult {
    let result = fsm.process_event(event);
    match &result {
        TransitionResult::Invalid { from, event } => {
            error!("Invalid session transition from {} on {:?}", from, event);
        }
        _ => {
            state_tx.send_replace(fsm.state());
        }
    }
    result
}

/// Drop frames queued for a connection that no longer exists
fn discard_stale(outbound_rx: &mut mpsc::Receiver<String>) -> usize {
    let mut dropped = 0;
    while outbound_rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Main connection loop with reconnection logic
async fn connection_loop<C>(
    config: ConnectionConfig,
    connector: C,
    mut backoff: Box<dyn Backoff>,
    mut outbound_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    state_tx: watch::Sender<SessionState>,
) where
    C: TransportConnector,
{
    let mut fsm = SessionStateMachine::new();

    loop {
        transition(&mut fsm, &state_tx, SessionEvent::ConnectStarted);
        info!("Connecting to bus via {}", connector.name());

        let reason = match connector.connect().await {
            Ok(stream) => {
                transition(&mut fsm, &state_tx, SessionEvent::TransportOpened);

                let stale = discard_stale(&mut outbound_rx);
                if stale > 0 {
                    warn!("Dropped {} frames queued before reconnect", stale);
                }

                match handle_connection(
                    stream,
                    connector.name(),
                    &config,
                    &mut fsm,
                    &state_tx,
                    &mut outbound_rx,
                    &event_tx,
                )
                .await
                {
                    Ok(()) => "session closed".to_string(),
                    Err(e) => e.to_string(),
                }
            }
            Err(e) => e.to_string(),
        };

        if fsm.is_active() {
            backoff.reset();
        }
        transition(
            &mut fsm,
            &state_tx,
            SessionEvent::TransportFailed {
                reason: reason.clone(),
            },
        );

        // Lifecycle events are advisory; never stall reconnecting on a slow consumer
        let _ = event_tx.try_send(ConnectionEvent::Disconnected {
            reason: reason.clone(),
        });

        // Wait before reconnecting
        let delay = backoff.next_delay();
        warn!("Bus connection lost: {}. Reconnecting in {:?}", reason, delay);
        tokio::time::sleep(delay).await;
    }
}

/// Write one message, bounded by the write timeout
async fn write<S>(sink: &mut S, message: Message, limit: Duration) -> AgentResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match timeout(limit, sink.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(AgentError::Transport(format!(
            "write timed out after {:?}",
            limit
        ))),
    }
}

/// Handshake, then run the active loop until the connection fails
async fn handle_connection<S>(
    stream: S,
    transport: &'static str,
    config: &ConnectionConfig,
    fsm: &mut SessionStateMachine,
    state_tx: &watch::Sender<SessionState>,
    outbound_rx: &mut mpsc::Receiver<String>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> AgentResult<()>
where
    S: TransportStream,
{
    let (mut writer, mut reader) = stream.split();

    // Subscribe handshake
    let subscribe = codec::encode_subscribe(&config.subscriber_id)?;
    write(&mut writer, Message::Text(subscribe.into()), config.write_timeout).await?;
    transition(fsm, state_tx, SessionEvent::SubscribeSent);

    info!(subscriber_id = %config.subscriber_id, "Subscribed to bus topic");
    let _ = event_tx.try_send(ConnectionEvent::Connected { transport });

    loop {
        tokio::select! {
            // Send outbound frames
            Some(text) = outbound_rx.recv() => {
                write(&mut writer, Message::Text(text.into()), config.write_timeout).await?;
            }

            // Read incoming frames
            msg = reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received frame ({} bytes)", text.len());
                        let _ = event_tx
                            .send(ConnectionEvent::Received(text.as_str().to_owned()))
                            .await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write(&mut writer, Message::Pong(data), config.write_timeout).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(AgentError::Transport("Server closed connection".into()));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(AgentError::Transport("stream ended".into()));
                    }
                    _ => {} // Binary, Pong
                }
            }
        }
    }
}
