//! Session-scoped mailbox snapshot
//!
//! The store never fetches anything itself: the owner asks for a
//! [`LoadTicket`] when it issues a full fetch and hands the result back with
//! [`MailboxStore::finish_load`]. Tickets are sequence-stamped, so when
//! several fetches overlap the most recently issued one that completes wins
//! and older results arriving later are discarded.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::MailResult;
use crate::types::{EmailSummary, FullEmail};

/// Identifies one issued full fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

/// Result of completing a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The snapshot was replaced
    Applied { emails: usize },
    /// A newer fetch already landed, or the session changed meanwhile
    Superseded,
    /// The fetch failed; the previous snapshot is kept
    Failed { error: String, recoverable: bool },
}

impl LoadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoadOutcome::Failed { .. })
    }
}

/// In-memory snapshot of one session's mailbox
#[derive(Debug, Default)]
pub struct MailboxStore {
    /// Server order, newest first
    emails: Vec<EmailSummary>,
    /// Ids marked read locally; reapplied after every load
    read_marks: HashSet<String>,
    in_flight: BTreeSet<u64>,
    next_seq: u64,
    applied_seq: u64,
}

impl MailboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emails(&self) -> &[EmailSummary] {
        &self.emails
    }

    pub fn get(&self, id: &str) -> Option<&EmailSummary> {
        self.emails.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.emails.iter().filter(|e| !e.is_read).count()
    }

    /// Whether any issued fetch has not completed yet
    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Register a full fetch that is about to be issued
    pub fn begin_load(&mut self) -> LoadTicket {
        self.next_seq += 1;
        self.in_flight.insert(self.next_seq);
        LoadTicket(self.next_seq)
    }

    /// Complete a fetch issued with [`begin_load`](Self::begin_load)
    pub fn finish_load(&mut self, ticket: LoadTicket, result: MailResult<Vec<EmailSummary>>) -> LoadOutcome {
        if !self.in_flight.remove(&ticket.0) {
            debug!("Ignoring result of fetch {} from a previous session", ticket.0);
            return LoadOutcome::Superseded;
        }

        let emails = match result {
            Ok(emails) => emails,
            Err(e) => {
                warn!("Mailbox fetch {} failed, keeping last snapshot: {}", ticket.0, e);
                return LoadOutcome::Failed {
                    error: e.to_string(),
                    recoverable: e.is_recoverable(),
                };
            }
        };

        if ticket.0 < self.applied_seq {
            debug!(
                "Discarding fetch {} (fetch {} already applied)",
                ticket.0, self.applied_seq
            );
            return LoadOutcome::Superseded;
        }

        self.applied_seq = ticket.0;
        self.replace(emails);
        LoadOutcome::Applied {
            emails: self.emails.len(),
        }
    }

    /// Optimistically mark `id` read. Returns whether the snapshot changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        self.read_marks.insert(id.to_string());
        match self.emails.iter_mut().find(|e| e.id == id) {
            Some(email) if !email.is_read => {
                email.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Merge a fetched detail record into its summary. Returns whether a
    /// summary with that id exists.
    pub fn upsert_full(&mut self, full: &FullEmail) -> bool {
        let incoming = &full.summary;
        let Some(email) = self.emails.iter_mut().find(|e| e.id == incoming.id) else {
            return false;
        };

        email.sender = incoming.sender.clone();
        email.subject = incoming.subject.clone();
        email.snippet = incoming.snippet.clone();
        email.has_attachments = incoming.has_attachments;
        if incoming.ai_summary.is_some() {
            email.ai_summary = incoming.ai_summary.clone();
        }
        email.is_read = email.is_read || incoming.is_read || self.read_marks.contains(&incoming.id);
        true
    }

    /// Forget everything about the current session. Fetches still in flight
    /// will be reported as superseded.
    pub fn reset(&mut self) {
        self.emails.clear();
        self.read_marks.clear();
        self.in_flight.clear();
        self.applied_seq = self.next_seq;
    }

    fn replace(&mut self, incoming: Vec<EmailSummary>) {
        let previous: HashMap<&str, (bool, i64)> = self
            .emails
            .iter()
            .map(|e| (e.id.as_str(), (e.is_read, e.created_at)))
            .collect();

        let mut seen = HashSet::with_capacity(incoming.len());
        let mut emails = Vec::with_capacity(incoming.len());
        for mut email in incoming {
            if !seen.insert(email.id.clone()) {
                warn!("Dropping duplicate email id {} from server listing", email.id);
                continue;
            }
            if let Some(&(was_read, created_at)) = previous.get(email.id.as_str()) {
                email.is_read |= was_read;
                email.created_at = created_at;
            }
            if self.read_marks.contains(&email.id) {
                email.is_read = true;
            }
            emails.push(email);
        }

        self.emails = emails;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailError;
    use crate::testing::email;

    fn loaded(emails: Vec<EmailSummary>) -> MailboxStore {
        let mut store = MailboxStore::new();
        let ticket = store.begin_load();
        store.finish_load(ticket, Ok(emails));
        store
    }

    fn ids(store: &MailboxStore) -> Vec<&str> {
        store.emails().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_load_replaces_snapshot_in_server_order() {
        let mut store = loaded(vec![email("3", false, 300), email("1", false, 100)]);
        assert_eq!(ids(&store), vec!["3", "1"]);

        let ticket = store.begin_load();
        assert!(store.is_loading());
        let outcome = store.finish_load(
            ticket,
            Ok(vec![email("4", false, 400), email("3", false, 300), email("1", false, 100)]),
        );
        assert_eq!(outcome, LoadOutcome::Applied { emails: 3 });
        assert_eq!(ids(&store), vec!["4", "3", "1"]);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let store = loaded(vec![
            email("2", false, 200),
            email("1", false, 100),
            email("2", true, 200),
        ]);
        assert_eq!(ids(&store), vec!["2", "1"]);
        assert!(!store.get("2").unwrap().is_read);
    }

    #[test]
    fn test_failed_load_keeps_snapshot() {
        let mut store = loaded(vec![email("1", false, 100)]);
        let ticket = store.begin_load();
        let outcome = store.finish_load(ticket, Err(MailError::status("GET /emails", 502)));

        assert!(outcome.is_failure());
        assert!(matches!(outcome, LoadOutcome::Failed { recoverable: true, .. }));
        assert_eq!(ids(&store), vec!["1"]);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut store = loaded(vec![email("1", false, 100), email("2", false, 200)]);
        assert!(store.mark_read("1"));
        let once = store.emails().to_vec();

        assert!(!store.mark_read("1"));
        assert_eq!(store.emails(), once.as_slice());
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_mark_read_survives_load_issued_before_mark() {
        let mut store = loaded(vec![email("1", false, 100)]);

        let in_flight = store.begin_load();
        store.mark_read("1");
        assert!(store.get("1").unwrap().is_read);

        let outcome = store.finish_load(in_flight, Ok(vec![email("1", false, 100)]));
        assert_eq!(outcome, LoadOutcome::Applied { emails: 1 });
        assert!(store.get("1").unwrap().is_read);

        let later = store.begin_load();
        store.finish_load(later, Ok(vec![email("1", false, 100)]));
        assert!(store.get("1").unwrap().is_read);
    }

    #[test]
    fn test_mark_before_email_arrives() {
        let mut store = MailboxStore::new();
        let ticket = store.begin_load();
        assert!(!store.mark_read("9"));
        store.finish_load(ticket, Ok(vec![email("9", false, 900)]));
        assert!(store.get("9").unwrap().is_read);
    }

    #[test]
    fn test_read_never_reverts() {
        let mut store = loaded(vec![email("1", true, 100)]);
        let ticket = store.begin_load();
        store.finish_load(ticket, Ok(vec![email("1", false, 100)]));
        assert!(store.get("1").unwrap().is_read);
    }

    #[test]
    fn test_created_at_is_immutable() {
        let mut store = loaded(vec![email("1", false, 100)]);
        let ticket = store.begin_load();
        store.finish_load(ticket, Ok(vec![email("1", false, 999)]));
        assert_eq!(store.get("1").unwrap().created_at, 100);
    }

    #[test]
    fn test_older_fetch_resolving_late_is_discarded() {
        let mut store = loaded(vec![email("1", false, 100)]);

        let slow = store.begin_load();
        let fast = store.begin_load();

        let outcome = store.finish_load(fast, Ok(vec![email("2", false, 200), email("1", false, 100)]));
        assert_eq!(outcome, LoadOutcome::Applied { emails: 2 });
        assert!(store.is_loading());

        let outcome = store.finish_load(slow, Ok(vec![email("1", false, 100)]));
        assert_eq!(outcome, LoadOutcome::Superseded);
        assert_eq!(ids(&store), vec!["2", "1"]);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_upsert_full_merges_fields() {
        let mut store = loaded(vec![email("1", false, 100)]);
        let mut detail = email("1", false, 555);
        detail.snippet = "full snippet".to_string();
        detail.ai_summary = Some("A friendly hello".to_string());
        detail.has_attachments = true;
        let full = FullEmail {
            summary: detail,
            raw_content: r#"{"text":"hello"}"#.to_string(),
        };

        store.mark_read("1");
        assert!(store.upsert_full(&full));

        let merged = store.get("1").unwrap();
        assert_eq!(merged.snippet, "full snippet");
        assert_eq!(merged.ai_summary.as_deref(), Some("A friendly hello"));
        assert!(merged.has_attachments);
        assert!(merged.is_read);
        assert_eq!(merged.created_at, 100);

        let unknown = FullEmail {
            summary: email("42", false, 1),
            raw_content: String::new(),
        };
        assert!(!store.upsert_full(&unknown));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reset_discards_session_state() {
        let mut store = loaded(vec![email("1", false, 100)]);
        store.mark_read("1");
        let in_flight = store.begin_load();

        store.reset();
        assert!(store.is_empty());
        assert!(!store.is_loading());

        let outcome = store.finish_load(in_flight, Ok(vec![email("1", false, 100)]));
        assert_eq!(outcome, LoadOutcome::Superseded);
        assert!(store.is_empty());

        let ticket = store.begin_load();
        store.finish_load(ticket, Ok(vec![email("1", false, 100)]));
        assert!(!store.get("1").unwrap().is_read);
    }
}
