//! Session acquisition and persistence

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::api::MailApi;
use crate::error::{MailError, MailResult};
use crate::types::Session;

/// Where the active session is kept between runs
pub trait SessionStore: Send + Sync {
    fn load(&self) -> MailResult<Option<Session>>;
    fn save(&self, session: &Session) -> MailResult<()>;
    fn clear(&self) -> MailResult<()>;
}

/// Session persisted as a JSON file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> MailResult<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session: &Session) -> MailResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn clear(&self) -> MailResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session kept in memory only
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MailResult<std::sync::MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|_| MailError::generic("session store lock poisoned"))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> MailResult<Option<Session>> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, session: &Session) -> MailResult<()> {
        *self.slot()? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> MailResult<()> {
        *self.slot()? = None;
        Ok(())
    }
}

/// Supplies the active identity
pub struct SessionContext {
    api: Arc<dyn MailApi>,
    store: Box<dyn SessionStore>,
    current: Option<Session>,
}

impl SessionContext {
    pub fn new(api: Arc<dyn MailApi>, store: Box<dyn SessionStore>) -> Self {
        Self {
            api,
            store,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Pick up the session saved by a previous run
    pub fn restore(&mut self) -> MailResult<Option<&Session>> {
        self.current = self.store.load()?;
        if let Some(session) = &self.current {
            debug!("Restored session for {}", session.username);
        }
        Ok(self.current.as_ref())
    }

    /// Ask the server for a fresh ephemeral identity
    pub async fn generate_identity(&mut self) -> MailResult<&Session> {
        let session = self.api.generate_identity().await?;
        info!("Generated identity {}", session.address);
        self.acquire(session)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> MailResult<&Session> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MailError::validation("username must not be empty"));
        }

        let session = self.api.login(username, password).await?;
        info!("Logged in as {}", session.username);
        self.acquire(session)
    }

    /// Forget the active session. Returns the session that was active.
    pub fn logout(&mut self) -> MailResult<Option<Session>> {
        self.store.clear()?;
        let previous = self.current.take();
        if let Some(session) = &previous {
            info!("Signed out {}", session.username);
        }
        Ok(previous)
    }

    fn acquire(&mut self, session: Session) -> MailResult<&Session> {
        self.store.save(&session)?;
        let session: &Session = self.current.insert(session);
        Ok(session)
    }
}
