//! In-crate fakes for the transport and the mail API

use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::api::MailApi;
use crate::channel::{FrameStream, Transport};
use crate::error::{MailError, MailResult};
use crate::types::{EmailSummary, FullEmail, ReplyRequest, Session};

/// Server end of one fake push connection. Dropping it (or calling
/// [`ServerConn::close`]) ends the client's frame stream.
pub struct ServerConn {
    pub identity: String,
    frames: frames::UnboundedSender<MailResult<String>>,
}

impl ServerConn {
    pub fn push(&self, text: &str) {
        let _ = self.frames.unbounded_send(Ok(text.to_string()));
    }

    pub fn push_new_email(&self, sender: &str) {
        self.push(&format!(r#"{{"type":"NEW_EMAIL","data":{{"sender":"{}"}}}}"#, sender));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.frames.unbounded_send(Err(MailError::transport(reason)));
    }

    pub fn close(self) {}

    /// Whether the client side has torn the connection down
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}

pub struct FakeTransport {
    conns: mpsc::UnboundedSender<ServerConn>,
    attempts: AtomicUsize,
    failures: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (conns, server) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            conns,
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        });
        (transport, server)
    }

    /// Number of connect calls so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect calls fail
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, identity: &str) -> MailResult<FrameStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(MailError::transport("connection refused"));
        }

        let (tx, rx) = frames::unbounded();
        let _ = self.conns.send(ServerConn {
            identity: identity.to_string(),
            frames: tx,
        });
        Ok(rx.boxed())
    }
}

/// A list request held until the test answers it
pub struct PendingList {
    pub username: String,
    respond: oneshot::Sender<MailResult<Vec<EmailSummary>>>,
}

impl PendingList {
    pub fn respond(self, emails: Vec<EmailSummary>) {
        let _ = self.respond.send(Ok(emails));
    }

    pub fn fail(self) {
        let _ = self.respond.send(Err(MailError::status("GET /emails", 500)));
    }
}

#[derive(Default)]
pub struct FakeApi {
    mailboxes: Mutex<HashMap<String, Vec<EmailSummary>>>,
    full: Mutex<HashMap<String, FullEmail>>,
    replies: Mutex<Vec<ReplyRequest>>,
    gate: Mutex<Option<mpsc::UnboundedSender<PendingList>>>,
    list_calls: AtomicUsize,
    fail_lists: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_mailbox(&self, username: &str, emails: Vec<EmailSummary>) {
        self.mailboxes.lock().unwrap().insert(username.to_string(), emails);
    }

    pub fn insert_full(&self, email: FullEmail) {
        self.full.lock().unwrap().insert(email.summary.id.clone(), email);
    }

    /// From now on, list requests wait for the test to answer them
    pub fn gate(&self) -> mpsc::UnboundedReceiver<PendingList> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.gate.lock().unwrap() = Some(tx);
        rx
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn replies(&self) -> Vec<ReplyRequest> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailApi for FakeApi {
    async fn list_emails(&self, username: &str) -> MailResult<Vec<EmailSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let (respond, rx) = oneshot::channel();
            let _ = gate.send(PendingList {
                username: username.to_string(),
                respond,
            });
            return rx
                .await
                .unwrap_or_else(|_| Err(MailError::transport("request dropped")));
        }

        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(MailError::status("GET /emails", 500));
        }

        Ok(self
            .mailboxes
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_email(&self, id: &str) -> MailResult<FullEmail> {
        self.full
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MailError::not_found(format!("Email {}", id)))
    }

    async fn send_reply(&self, reply: &ReplyRequest) -> MailResult<()> {
        if reply.body.is_empty() {
            return Err(MailError::status("POST /reply", 400));
        }
        self.replies.lock().unwrap().push(reply.clone());
        Ok(())
    }

    async fn generate_identity(&self) -> MailResult<Session> {
        Ok(Session::new("swift-fox-42", "swift-fox-42@example.com").with_password("generated"))
    }

    async fn login(&self, username: &str, password: &str) -> MailResult<Session> {
        if password == "secret" {
            Ok(Session::new(username, format!("{}@example.com", username)))
        } else {
            Err(MailError::status("POST /login", 401))
        }
    }
}

pub fn email(id: &str, is_read: bool, created_at: i64) -> EmailSummary {
    let mut email = EmailSummary::new(id, "bob@example.com", format!("Subject {}", id), created_at);
    email.is_read = is_read;
    email
}
