//! Subcommand implementations

use aimail_core::{
    Config, EmailSummary, MailApi, MailboxView, ReplyRequest, Session, SessionContext, SyncCoordinator, SyncNotice,
    WebSocketTransport,
};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::notifications::NotificationManager;

pub async fn generate(sessions: &mut SessionContext) -> anyhow::Result<()> {
    let session = sessions.generate_identity().await.context("failed to generate identity")?;
    println!("New identity: {}", session.address);
    if let Some(password) = &session.password {
        println!("Password:     {}", password);
    }
    Ok(())
}

pub async fn login(sessions: &mut SessionContext, username: &str, password: &str) -> anyhow::Result<()> {
    let session = sessions.login(username, password).await.context("invalid credentials")?;
    println!("Signed in as {}", session.address);
    Ok(())
}

pub fn logout(sessions: &mut SessionContext) -> anyhow::Result<()> {
    match sessions.logout()? {
        Some(session) => println!("Signed out {}", session.address),
        None => println!("No active session"),
    }
    Ok(())
}

fn require_session(sessions: &mut SessionContext) -> anyhow::Result<Session> {
    sessions
        .restore()?
        .cloned()
        .ok_or_else(|| anyhow!("not signed in; run `aimail generate` or `aimail login` first"))
}

pub async fn inbox(api: &dyn MailApi, sessions: &mut SessionContext) -> anyhow::Result<()> {
    let session = require_session(sessions)?;
    let emails = api
        .list_emails(&session.username)
        .await
        .context("failed to load inbox")?;

    println!("{} ({} emails)", session.address, emails.len());
    for email in &emails {
        println!("{}", format_summary(email));
    }
    Ok(())
}

pub async fn show(api: &dyn MailApi, id: &str) -> anyhow::Result<()> {
    let full = api.get_email(id).await?;
    let content = full.content();

    println!("From:    {}", full.summary.sender);
    println!("Subject: {}", full.summary.subject);
    println!("Date:    {}", format_timestamp(full.summary.created_at));
    if let Some(summary) = &full.summary.ai_summary {
        println!("Summary: {}", summary);
    }
    println!();
    println!("{}", content.body());

    if content.has_attachments() {
        println!();
        for attachment in &content.attachments {
            match &attachment.content_type {
                Some(content_type) => println!("[attachment] {} ({})", attachment.filename, content_type),
                None => println!("[attachment] {}", attachment.filename),
            }
        }
    }
    Ok(())
}

pub async fn reply(api: &dyn MailApi, sessions: &mut SessionContext, id: &str, body: &str) -> anyhow::Result<()> {
    if body.trim().is_empty() {
        return Err(anyhow!("reply body must not be empty"));
    }

    let session = require_session(sessions)?;
    let original = api.get_email(id).await?;
    let request = ReplyRequest::new(&session.username, &original.summary, body);
    api.send_reply(&request).await.context("failed to send reply")?;
    println!("Reply sent to {}", original.summary.sender);
    Ok(())
}

/// Live sync until Ctrl-C
pub async fn watch(config: &Config, api: Arc<dyn MailApi>, sessions: &mut SessionContext) -> anyhow::Result<()> {
    let session = require_session(sessions)?;
    let transport = WebSocketTransport::from_config(&config.server)?;
    let handle = SyncCoordinator::spawn(api, Arc::new(transport), &config.sync);
    let notifier = NotificationManager::new(&config.notifications);

    let mut views = handle.subscribe();
    let mut notices = handle.notices();
    handle.connect(session.clone()).await?;
    info!("Watching {} (Ctrl-C to stop)", session.address);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed: Option<Vec<EmailSummary>> = None;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if printed.as_ref() != Some(&view.emails) && !view.loading {
                    print_view(&view);
                    printed = Some(view.emails);
                }
            }
            notice = notices.recv() => match notice {
                Ok(SyncNotice::NewEmail { sender }) => {
                    notifier.show_new_email_notification(&sender).await;
                }
                Ok(SyncNotice::RefreshFailed { error, recoverable }) => {
                    warn!("Inbox refresh failed: {}", error);
                    if should_alert(recoverable) {
                        notifier.show_error_notification(&error).await;
                    }
                }
                Ok(SyncNotice::ConnectionChanged(status)) => info!("Connection {}", status),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} sync notices", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.disconnect().await?;
    handle.shutdown();
    Ok(())
}

/// Transient failures clear on the next push or refresh; only the rest
/// deserve a desktop alert
fn should_alert(recoverable: bool) -> bool {
    !recoverable
}

fn print_view(view: &MailboxView) {
    println!();
    println!(
        "{} emails, {} unread ({})",
        view.emails.len(),
        view.unread_count(),
        view.connection
    );
    for email in &view.emails {
        println!("{}", format_summary(email));
    }
}

fn format_timestamp(created_at: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp(created_at)
        .ok()
        .and_then(|date| date.format(&format).ok())
        .unwrap_or_else(|| created_at.to_string())
}

fn format_summary(email: &EmailSummary) -> String {
    let marker = if email.is_read { ' ' } else { '*' };
    let clip = if email.has_attachments { " [+]" } else { "" };
    let mut line = format!(
        "{} {:<8} {}  {:<28} {}{}",
        marker,
        email.id,
        format_timestamp(email.created_at),
        email.sender,
        email.subject,
        clip
    );
    if let Some(summary) = &email.ai_summary {
        line.push_str(&format!("\n             {}", summary));
    }
    line
}
