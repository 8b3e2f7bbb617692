//! Sync coordinator binding the session lifecycle to the push channel and
//! the mailbox store

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::api::MailApi;
use crate::channel::{ChannelStatus, ChannelUpdate, RealtimeChannel, Transport};
use crate::config::SyncConfig;
use crate::error::{MailError, MailResult};
use crate::store::{LoadOutcome, LoadTicket, MailboxStore};
use crate::types::{EmailSummary, FullEmail, ReplyRequest, Session};

/// Capacity of the notice broadcast; slow subscribers lag rather than block
const NOTICE_CAPACITY: usize = 64;

/// Observable state for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxView {
    /// Username of the active session
    pub identity: Option<String>,
    /// Current snapshot, server order
    pub emails: Vec<EmailSummary>,
    /// A full fetch is outstanding
    pub loading: bool,
    /// Push channel status
    pub connection: ChannelStatus,
    /// Error of the most recent failed fetch, cleared by the next applied one
    pub last_error: Option<String>,
}

impl Default for MailboxView {
    fn default() -> Self {
        Self {
            identity: None,
            emails: Vec::new(),
            loading: false,
            connection: ChannelStatus::Disconnected,
            last_error: None,
        }
    }
}

impl MailboxView {
    pub fn unread_count(&self) -> usize {
        self.emails.iter().filter(|e| !e.is_read).count()
    }
}

/// Side events worth surfacing to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// The server announced new mail; `sender` is a display hint only
    NewEmail { sender: String },
    /// A full fetch failed and the previous snapshot was kept. A recoverable
    /// failure is expected to clear on the next refresh.
    RefreshFailed { error: String, recoverable: bool },
    ConnectionChanged(ChannelStatus),
}

enum Command {
    Connect {
        session: Session,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Refresh {
        reply: oneshot::Sender<MailResult<LoadOutcome>>,
    },
    MarkRead {
        identity: String,
        id: String,
    },
    UpsertFull {
        identity: String,
        full: FullEmail,
    },
    Shutdown,
}

struct FetchDone {
    ticket: LoadTicket,
    result: MailResult<Vec<EmailSummary>>,
    reply: Option<oneshot::Sender<MailResult<LoadOutcome>>>,
}

/// Sole owner of the channel and store for the active session.
///
/// Runs as a single task; every mutation happens inside [`run`](Self::run),
/// so handlers never overlap even when fetches complete out of order.
pub struct SyncCoordinator {
    /// Mail API used for full fetches
    api: Arc<dyn MailApi>,
    /// Transport handed to each new channel
    transport: Arc<dyn Transport>,
    /// Fixed reconnect delay for channels
    reconnect_delay: Duration,
    /// Load the mailbox when a session is acquired
    initial_load: bool,
    /// Active session
    session: Option<Session>,
    /// Snapshot of the active session
    store: MailboxStore,
    /// Push channel of the active session
    channel: Option<RealtimeChannel>,
    /// Outstanding full fetches
    fetches: FuturesUnordered<BoxFuture<'static, FetchDone>>,
    /// Error of the last failed fetch
    last_error: Option<String>,
    commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<MailboxView>,
    notices: broadcast::Sender<SyncNotice>,
}

impl SyncCoordinator {
    /// Create a coordinator and the handle that drives it
    pub fn new(
        api: Arc<dyn MailApi>,
        transport: Arc<dyn Transport>,
        sync: &SyncConfig,
    ) -> (Self, CoordinatorHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(MailboxView::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = CoordinatorHandle {
            commands: commands_tx,
            view: view_rx,
            notices: notices.clone(),
            api: Arc::clone(&api),
        };

        let coordinator = Self {
            api,
            transport,
            reconnect_delay: sync.reconnect_delay(),
            initial_load: sync.initial_load,
            session: None,
            store: MailboxStore::new(),
            channel: None,
            fetches: FuturesUnordered::new(),
            last_error: None,
            commands,
            view,
            notices,
        };

        (coordinator, handle)
    }

    /// Spawn a coordinator on the current runtime
    pub fn spawn(api: Arc<dyn MailApi>, transport: Arc<dyn Transport>, sync: &SyncConfig) -> CoordinatorHandle {
        let (coordinator, handle) = Self::new(api, transport, sync);
        tokio::spawn(coordinator.run());
        handle
    }

    /// Process commands, channel updates and fetch results until shut down
    /// or until every handle is dropped
    pub async fn run(mut self) {
        debug!("Sync coordinator started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                update = next_channel_update(&mut self.channel) => self.handle_update(update),
                Some(done) = self.fetches.next(), if !self.fetches.is_empty() => self.finish_fetch(done),
            }
        }

        self.disconnect();
        debug!("Sync coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { session, done } => {
                self.connect(session);
                let _ = done.send(());
            }
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Refresh { reply } => {
                if self.session.is_none() {
                    let _ = reply.send(Err(MailError::invalid_state("no active session")));
                    return;
                }
                self.issue_load(Some(reply));
                self.publish();
            }
            Command::MarkRead { identity, id } => {
                if self.active_identity() != Some(identity.as_str()) {
                    debug!("Dropping read-mark of {} issued for a previous session", id);
                    return;
                }
                if self.store.mark_read(&id) {
                    self.publish();
                }
            }
            Command::UpsertFull { identity, full } => {
                if self.active_identity() != Some(identity.as_str()) {
                    debug!("Dropping detail of {} fetched for a previous session", full.id());
                    return;
                }
                if self.store.upsert_full(&full) {
                    self.publish();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn handle_update(&mut self, update: ChannelUpdate) {
        match update {
            ChannelUpdate::Status(status) => {
                self.notify(SyncNotice::ConnectionChanged(status));
            }
            ChannelUpdate::Push(event) => {
                let sender = event.sender_hint().unwrap_or_default().to_string();
                info!("New mail announced (from {}), refreshing", sender);
                self.issue_load(None);
                self.notify(SyncNotice::NewEmail { sender });
            }
        }
        self.publish();
    }

    fn connect(&mut self, session: Session) {
        if self.active_identity() == Some(session.username.as_str()) {
            debug!("Session for {} already active", session.username);
            self.session = Some(session);
            return;
        }

        // Closing is synchronous, so the old channel is fully detached here
        if self.session.is_some() {
            self.disconnect();
        }

        info!("Session acquired for {}", session.username);
        let username = session.username.clone();
        self.session = Some(session);

        if self.initial_load {
            self.issue_load(None);
        }

        let mut channel = RealtimeChannel::new(Arc::clone(&self.transport), self.reconnect_delay);
        channel.open(&username);
        self.channel = Some(channel);

        self.publish();
    }

    fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        if let Some(session) = self.session.take() {
            info!("Session cleared for {}", session.username);
        }

        self.store.reset();
        self.fetches = FuturesUnordered::new();
        self.last_error = None;
        self.publish();
    }

    fn issue_load(&mut self, reply: Option<oneshot::Sender<MailResult<LoadOutcome>>>) {
        let Some(session) = &self.session else {
            return;
        };

        let ticket = self.store.begin_load();
        let api = Arc::clone(&self.api);
        let username = session.username.clone();
        debug!("Fetching mailbox of {} ({:?})", username, ticket);

        self.fetches.push(
            async move {
                let result = api.list_emails(&username).await;
                FetchDone { ticket, result, reply }
            }
            .boxed(),
        );
    }

    fn finish_fetch(&mut self, done: FetchDone) {
        let outcome = self.store.finish_load(done.ticket, done.result);
        match &outcome {
            LoadOutcome::Applied { emails } => {
                debug!("Mailbox snapshot replaced ({} emails)", emails);
                self.last_error = None;
            }
            LoadOutcome::Failed { error, recoverable } => {
                self.last_error = Some(error.clone());
                self.notify(SyncNotice::RefreshFailed {
                    error: error.clone(),
                    recoverable: *recoverable,
                });
            }
            LoadOutcome::Superseded => {}
        }
        self.publish();

        if let Some(reply) = done.reply {
            let _ = reply.send(Ok(outcome));
        }
    }

    fn active_identity(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    fn publish(&self) {
        self.view.send_replace(MailboxView {
            identity: self.active_identity().map(str::to_string),
            emails: self.store.emails().to_vec(),
            loading: self.store.is_loading(),
            connection: self
                .channel
                .as_ref()
                .map(RealtimeChannel::status)
                .unwrap_or(ChannelStatus::Disconnected),
            last_error: self.last_error.clone(),
        });
    }

    fn notify(&self, notice: SyncNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

async fn next_channel_update(channel: &mut Option<RealtimeChannel>) -> ChannelUpdate {
    match channel {
        Some(channel) => channel.next_update().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`SyncCoordinator`]
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<MailboxView>,
    notices: broadcast::Sender<SyncNotice>,
    api: Arc<dyn MailApi>,
}

impl CoordinatorHandle {
    /// Session acquired. Resolves once the previous session is torn down and
    /// the new one's load and channel are started.
    pub async fn connect(&self, session: Session) -> MailResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Connect { session, done })?;
        rx.await.map_err(|_| stopped())
    }

    /// Session cleared. Resolves once the channel is closed and the store emptied.
    pub async fn disconnect(&self) -> MailResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Disconnect { done })?;
        rx.await.map_err(|_| stopped())
    }

    /// Full refetch. A session change before the fetch completes yields
    /// [`LoadOutcome::Superseded`].
    pub async fn refresh(&self) -> MailResult<LoadOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Refresh { reply })?;
        rx.await.unwrap_or(Ok(LoadOutcome::Superseded))
    }

    /// Optimistically mark an email read. No-op without a session.
    pub fn mark_read(&self, id: &str) -> MailResult<()> {
        match self.require_identity() {
            Ok(identity) => self.mark_read_as(identity, id),
            Err(_) => Ok(()),
        }
    }

    /// Mark an email read, fetch its full record and merge it into the snapshot
    pub async fn open_email(&self, id: &str) -> MailResult<FullEmail> {
        let identity = self.require_identity()?;
        self.mark_read_as(identity.clone(), id)?;

        let full = self.api.get_email(id).await?;
        self.send(Command::UpsertFull {
            identity,
            full: full.clone(),
        })?;
        Ok(full)
    }

    fn mark_read_as(&self, identity: String, id: &str) -> MailResult<()> {
        self.send(Command::MarkRead {
            identity,
            id: id.to_string(),
        })
    }

    /// Reply to `email` as the active session. Failures are returned, never retried.
    pub async fn send_reply(&self, email: &EmailSummary, body: &str) -> MailResult<()> {
        let identity = self.require_identity()?;
        let reply = ReplyRequest::new(&identity, email, body);
        self.api.send_reply(&reply).await?;
        info!("Reply to {} sent", email.sender);
        Ok(())
    }

    /// Current view
    pub fn view(&self) -> MailboxView {
        self.view.borrow().clone()
    }

    /// Watch the view for changes
    pub fn subscribe(&self) -> watch::Receiver<MailboxView> {
        self.view.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Stop the coordinator, closing the channel of the active session
    pub fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            warn!("Sync coordinator already stopped");
        }
    }

    fn require_identity(&self) -> MailResult<String> {
        self.view
            .borrow()
            .identity
            .clone()
            .ok_or_else(|| MailError::invalid_state("no active session"))
    }

    fn send(&self, command: Command) -> MailResult<()> {
        self.commands.send(command).map_err(|_| stopped())
    }
}

fn stopped() -> MailError {
    MailError::invalid_state("sync coordinator has stopped")
}
