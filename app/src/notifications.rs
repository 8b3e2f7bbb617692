//! Desktop notifications for AI Mail

use aimail_core::config::NotificationConfig;
use notify_rust::{Notification, Timeout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Notification manager for the watch loop
#[derive(Clone)]
pub struct NotificationManager {
    /// Notification state
    state: Arc<Mutex<NotificationState>>,
}

/// Internal notification state
struct NotificationState {
    /// Whether notifications are enabled
    enabled: bool,
    /// Whether new-mail toasts are enabled
    new_mail: bool,
    /// Last notification time
    last_notification: Option<Instant>,
    /// Minimum gap between two toasts
    cooldown: Duration,
}

impl NotificationState {
    fn ready(&self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_notification {
            Some(last) => now.duration_since(last) >= self.cooldown,
            None => true,
        }
    }
}

impl NotificationManager {
    /// Create a new notification manager
    pub fn new(config: &NotificationConfig) -> Self {
        let state = NotificationState {
            enabled: config.enable_notifications,
            new_mail: config.show_new_message_notifications,
            last_notification: None,
            cooldown: Duration::from_secs(config.notification_timeout.into()),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Show a notification. Returns whether one was shown.
    pub async fn show_notification(&self, title: &str, body: &str) -> bool {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if !state.ready(now) {
            return false;
        }

        let shown = Notification::new()
            .summary(title)
            .body(body)
            .icon("mail-message-new")
            .appname(aimail_core::APP_NAME)
            .timeout(Timeout::Milliseconds(state.cooldown.as_millis() as u32))
            .show();

        match shown {
            Ok(_) => {
                state.last_notification = Some(now);
                tracing::debug!("Notification shown: {}", title);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to show notification: {}", e);
                false
            }
        }
    }

    /// Toast for a push announcement; `sender` is only a hint
    pub async fn show_new_email_notification(&self, sender: &str) -> bool {
        if !self.state.lock().await.new_mail {
            return false;
        }
        let body = if sender.is_empty() {
            "You have new mail".to_string()
        } else {
            format!("From: {}", sender)
        };
        self.show_notification("New Email", &body).await
    }

    pub async fn show_error_notification(&self, error: &str) -> bool {
        self.show_notification("Mail sync error", error).await
    }
}
