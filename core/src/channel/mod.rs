//! Realtime push channel
//!
//! A [`RealtimeChannel`] keeps at most one live transport open for one
//! identity and reconnects on its own after a fixed delay when the transport
//! drops. Connection work and the reconnect timer run as spawned tasks that
//! report back over an internal queue; every report carries the generation of
//! the connection attempt that produced it, and bumping the generation is how
//! the channel detaches from an attempt. [`RealtimeChannel::close`] bumps the
//! generation and cancels the timer before aborting the transport, so a close
//! notification that was already in flight is discarded instead of scheduling
//! a reconnect.
//!
//! Transport failures never reach the caller: they only show up as status
//! updates. There is no retry cap.

mod frame;
mod transport;

pub use frame::{NewEmail, PushEvent, NEW_EMAIL};
pub use transport::{FrameStream, Transport, WebSocketTransport};

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Observable connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal
    Closed,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Disconnected => write!(f, "disconnected"),
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Connected => write!(f, "connected"),
            ChannelStatus::Reconnecting => write!(f, "reconnecting"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// What the owner of a channel gets back from [`RealtimeChannel::next_update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelUpdate {
    Status(ChannelStatus),
    Push(PushEvent),
}

/// Task driving one connection attempt; aborted on drop
#[derive(Debug)]
struct ConnectionTask(JoinHandle<()>);

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Pending reconnect; cancelled on drop
#[derive(Debug)]
struct ReconnectTimer(JoinHandle<()>);

impl ReconnectTimer {
    fn cancel(self) {
        drop(self);
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
enum ChannelState {
    Disconnected,
    Connecting {
        identity: String,
        connection: ConnectionTask,
    },
    Connected {
        identity: String,
        connection: ConnectionTask,
    },
    Reconnecting {
        identity: String,
        timer: ReconnectTimer,
    },
    Closed,
}

impl ChannelState {
    fn status(&self) -> ChannelStatus {
        match self {
            ChannelState::Disconnected => ChannelStatus::Disconnected,
            ChannelState::Connecting { .. } => ChannelStatus::Connecting,
            ChannelState::Connected { .. } => ChannelStatus::Connected,
            ChannelState::Reconnecting { .. } => ChannelStatus::Reconnecting,
            ChannelState::Closed => ChannelStatus::Closed,
        }
    }

    fn identity(&self) -> Option<&str> {
        match self {
            ChannelState::Connecting { identity, .. }
            | ChannelState::Connected { identity, .. }
            | ChannelState::Reconnecting { identity, .. } => Some(identity),
            ChannelState::Disconnected | ChannelState::Closed => None,
        }
    }
}

#[derive(Debug)]
enum TransportEvent {
    Opened,
    Frame(String),
    Dropped(Option<String>),
    ReconnectDue,
}

#[derive(Debug)]
struct ChannelEvent {
    generation: u64,
    kind: TransportEvent,
}

/// Push channel for one session
pub struct RealtimeChannel {
    transport: Arc<dyn Transport>,
    reconnect_delay: Duration,
    state: ChannelState,
    generation: u64,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl RealtimeChannel {
    /// Create a disconnected channel
    pub fn new(transport: Arc<dyn Transport>, reconnect_delay: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            reconnect_delay,
            state: ChannelState::Disconnected,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.state.status()
    }

    /// Identity currently served, if any
    pub fn identity(&self) -> Option<&str> {
        self.state.identity()
    }

    /// Start serving `identity`.
    ///
    /// No-op when that identity is already being served. Switching identity
    /// tears the current transport down first. A closed channel stays closed.
    pub fn open(&mut self, identity: &str) {
        match &self.state {
            ChannelState::Closed => {
                warn!("Ignoring open({}) on a closed realtime channel", identity);
                return;
            }
            ChannelState::Disconnected => {}
            state if state.identity() == Some(identity) => {
                debug!("Realtime channel already serving {}", identity);
                return;
            }
            _ => {
                info!("Realtime channel switching identity to {}", identity);
                self.detach();
                self.state = ChannelState::Disconnected;
            }
        }

        self.connect(identity.to_string());
    }

    /// Close the channel for good. Idempotent.
    pub fn close(&mut self) {
        if matches!(self.state, ChannelState::Closed) {
            return;
        }

        self.detach();
        match std::mem::replace(&mut self.state, ChannelState::Closed) {
            ChannelState::Reconnecting { timer, .. } => timer.cancel(),
            ChannelState::Connecting { connection, .. } | ChannelState::Connected { connection, .. } => {
                drop(connection)
            }
            ChannelState::Disconnected | ChannelState::Closed => {}
        }
        info!("Realtime channel closed");
    }

    /// Wait for the next status change or push event.
    ///
    /// Cancel-safe. Never resolves once the channel is closed.
    pub async fn next_update(&mut self) -> ChannelUpdate {
        loop {
            let event = match self.events_rx.recv().await {
                Some(event) => event,
                // `self` holds a sender, so the queue cannot close
                None => std::future::pending().await,
            };
            if let Some(update) = self.handle(event) {
                return update;
            }
        }
    }

    /// Stop listening to every task spawned so far
    fn detach(&mut self) {
        self.generation += 1;
    }

    fn connect(&mut self, identity: String) {
        self.detach();
        let generation = self.generation;
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.transport),
            identity.clone(),
            generation,
            self.events_tx.clone(),
        ));
        debug!("Realtime channel connecting as {} (attempt {})", identity, generation);
        self.state = ChannelState::Connecting {
            identity,
            connection: ConnectionTask(task),
        };
    }

    fn schedule_reconnect(&self) -> ReconnectTimer {
        let generation = self.generation;
        let delay = self.reconnect_delay;
        let events = self.events_tx.clone();
        ReconnectTimer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ChannelEvent {
                generation,
                kind: TransportEvent::ReconnectDue,
            });
        }))
    }

    fn handle(&mut self, event: ChannelEvent) -> Option<ChannelUpdate> {
        if event.generation != self.generation {
            trace!("Discarding event from detached attempt {}", event.generation);
            return None;
        }

        match event.kind {
            TransportEvent::Opened => {
                match std::mem::replace(&mut self.state, ChannelState::Disconnected) {
                    ChannelState::Connecting { identity, connection } => {
                        info!("Realtime channel connected as {}", identity);
                        self.state = ChannelState::Connected { identity, connection };
                        Some(ChannelUpdate::Status(ChannelStatus::Connected))
                    }
                    other => {
                        self.state = other;
                        None
                    }
                }
            }
            TransportEvent::Frame(text) => {
                if !matches!(self.state, ChannelState::Connected { .. }) {
                    return None;
                }
                match PushEvent::parse(&text) {
                    Ok(Some(event)) => Some(ChannelUpdate::Push(event)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Dropping push frame: {}", e);
                        None
                    }
                }
            }
            TransportEvent::Dropped(reason) => {
                match std::mem::replace(&mut self.state, ChannelState::Disconnected) {
                    ChannelState::Connecting { identity, .. } | ChannelState::Connected { identity, .. } => {
                        warn!(
                            "Realtime channel for {} dropped ({}), reconnecting in {:?}",
                            identity,
                            reason.as_deref().unwrap_or("closed by server"),
                            self.reconnect_delay
                        );
                        let timer = self.schedule_reconnect();
                        self.state = ChannelState::Reconnecting { identity, timer };
                        Some(ChannelUpdate::Status(ChannelStatus::Reconnecting))
                    }
                    other => {
                        self.state = other;
                        None
                    }
                }
            }
            TransportEvent::ReconnectDue => {
                match std::mem::replace(&mut self.state, ChannelState::Disconnected) {
                    ChannelState::Reconnecting { identity, .. } => {
                        self.connect(identity);
                        Some(ChannelUpdate::Status(ChannelStatus::Connecting))
                    }
                    other => {
                        self.state = other;
                        None
                    }
                }
            }
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    transport: Arc<dyn Transport>,
    identity: String,
    generation: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let send = |kind| events.send(ChannelEvent { generation, kind }).is_ok();

    let mut frames = match transport.connect(&identity).await {
        Ok(frames) => frames,
        Err(e) => {
            send(TransportEvent::Dropped(Some(e.to_string())));
            return;
        }
    };

    if !send(TransportEvent::Opened) {
        return;
    }

    let reason = loop {
        match frames.next().await {
            Some(Ok(text)) => {
                if !send(TransportEvent::Frame(text)) {
                    return;
                }
            }
            Some(Err(e)) => break Some(e.to_string()),
            None => break None,
        }
    };

    send(TransportEvent::Dropped(reason));
}
