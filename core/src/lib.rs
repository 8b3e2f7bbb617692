//! AI Mail Core Library
//!
//! This crate contains the client-side realtime mailbox synchronization
//! subsystem for AI Mail, including:
//! - Wire types (Session, EmailSummary, FullEmail) and body decoding
//! - The REST client for the mail API
//! - The realtime push channel with automatic reconnection
//! - The session-scoped mailbox store with optimistic read-marks
//! - The sync coordinator binding session lifecycle to channel and store
//! - The thin session context (identity generation, login, persistence)

pub mod api;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use api::{HttpMailApi, MailApi};
pub use channel::{ChannelStatus, PushEvent, RealtimeChannel, Transport, WebSocketTransport};
pub use config::Config;
pub use coordinator::{CoordinatorHandle, MailboxView, SyncCoordinator, SyncNotice};
pub use error::{MailError, MailResult};
pub use session::{FileSessionStore, MemorySessionStore, SessionContext, SessionStore};
pub use store::{LoadOutcome, MailboxStore};
pub use types::{EmailContent, EmailSummary, FullEmail, ReplyRequest, Session};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "AI Mail";

/// Default configuration directory name
pub const CONFIG_DIR_NAME: &str = "aimail";

/// Persisted session filename
pub const SESSION_FILENAME: &str = "session.json";

/// Default mail server origin
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8787";

/// Default reconnect delay in seconds
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;

/// Get the default configuration directory
pub fn get_config_dir() -> MailResult<std::path::PathBuf> {
    let config_dir = std::env::var("AIMAIL_CONFIG_DIR")
        .map(std::path::PathBuf::from)
        .or_else(|_| {
            directories::ProjectDirs::from("", "", CONFIG_DIR_NAME)
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| fallback_dir("config"));

    std::fs::create_dir_all(&config_dir)
        .map_err(|_| MailError::DirCreateFailed(config_dir.clone()))?;

    Ok(config_dir)
}

/// Get the default data directory
pub fn get_data_dir() -> MailResult<std::path::PathBuf> {
    let data_dir = std::env::var("AIMAIL_DATA_DIR")
        .map(std::path::PathBuf::from)
        .or_else(|_| {
            directories::ProjectDirs::from("", "", CONFIG_DIR_NAME)
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| fallback_dir("data"));

    std::fs::create_dir_all(&data_dir)
        .map_err(|_| MailError::DirCreateFailed(data_dir.clone()))?;

    Ok(data_dir)
}

/// Directory used when the platform reports no home directory
pub(crate) fn fallback_dir(leaf: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(CONFIG_DIR_NAME).join(leaf)
}
