//! Wire and domain types shared by the sync core

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Placeholder body shown when a message body cannot be decoded
pub const CONTENT_UNAVAILABLE: &str = "Content unavailable";

/// Active identity scoping all mailbox state
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Session {
    pub fn new(username: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            address: address.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Email summary as listed by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    /// Unix timestamp in seconds, never changes after creation
    pub created_at: i64,
}

impl EmailSummary {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            snippet: String::new(),
            has_attachments: false,
            is_read: false,
            ai_summary: None,
            created_at,
        }
    }
}

/// Email summary plus its raw body, fetched per id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullEmail {
    #[serde(flatten)]
    pub summary: EmailSummary,
    /// JSON-encoded body: `{text, html, attachments}`
    #[serde(default)]
    pub raw_content: String,
}

impl FullEmail {
    pub fn id(&self) -> &str {
        &self.summary.id
    }

    /// Decode the raw body, degrading to a placeholder on malformed input
    pub fn content(&self) -> EmailContent {
        EmailContent::parse(&self.raw_content)
    }
}

/// Attachment descriptor inside a message body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "contentType", alias = "content_type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Decoded message body
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<AttachmentInfo>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl EmailContent {
    /// Parse a raw JSON body. Never fails: malformed input yields the placeholder.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<EmailContent>(raw) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Malformed message body, using placeholder: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self {
            text: Some(CONTENT_UNAVAILABLE.to_string()),
            html: None,
            attachments: Vec::new(),
        }
    }

    /// Text body, falling back to html, then to an empty string
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.html.as_deref())
            .unwrap_or("")
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Body of `POST /api/reply`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub username: String,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

impl ReplyRequest {
    /// Build a reply to `email` sent as `username`
    pub fn new(username: &str, email: &EmailSummary, body: impl Into<String>) -> Self {
        Self {
            username: username.to_string(),
            reply_to: email.sender.clone(),
            subject: email.subject.clone(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_deserialize_with_defaults() {
        let json = r#"{"id":"1","sender":"bob@example.com","subject":"Hi","created_at":100}"#;
        let email: EmailSummary = serde_json::from_str(json).unwrap();
        assert_eq!(email.id, "1");
        assert!(!email.is_read);
        assert!(email.snippet.is_empty());
        assert_eq!(email.ai_summary, None);
    }

    #[test]
    fn test_full_email_flattens_summary() {
        let json = r#"{
            "id": "7",
            "sender": "carol@example.com",
            "subject": "Report",
            "snippet": "see attached",
            "has_attachments": true,
            "is_read": false,
            "ai_summary": "Quarterly report",
            "created_at": 1700000000,
            "raw_content": "{\"text\":\"Hello\",\"attachments\":[{\"filename\":\"q3.pdf\"}]}"
        }"#;
        let full: FullEmail = serde_json::from_str(json).unwrap();
        assert_eq!(full.id(), "7");
        assert_eq!(full.summary.ai_summary.as_deref(), Some("Quarterly report"));

        let content = full.content();
        assert_eq!(content.body(), "Hello");
        assert_eq!(content.attachments.len(), 1);
        assert_eq!(content.attachments[0].filename, "q3.pdf");
    }

    #[test]
    fn test_malformed_content_degrades_to_placeholder() {
        let content = EmailContent::parse("{not json");
        assert_eq!(content.body(), CONTENT_UNAVAILABLE);
        assert!(!content.has_attachments());

        assert_eq!(EmailContent::parse("").body(), CONTENT_UNAVAILABLE);
    }

    #[test]
    fn test_null_attachments_keep_the_body() {
        let content = EmailContent::parse(r#"{"text":"Hello Alice","attachments":null}"#);
        assert_eq!(content.body(), "Hello Alice");
        assert!(!content.has_attachments());
    }

    #[test]
    fn test_attachment_without_filename_keeps_the_body() {
        let content = EmailContent::parse(r#"{"text":"See attached","attachments":[{"name":"x.pdf","size":12}]}"#);
        assert_eq!(content.body(), "See attached");
        assert_eq!(content.attachments.len(), 1);
        assert_eq!(content.attachments[0].filename, "");
        assert_eq!(content.attachments[0].size, Some(12));
    }

    #[test]
    fn test_content_body_prefers_text_over_html() {
        let content = EmailContent::parse(r#"{"html":"<p>hi</p>"}"#);
        assert_eq!(content.body(), "<p>hi</p>");

        let content = EmailContent::parse(r#"{"text":"hi","html":"<p>hi</p>"}"#);
        assert_eq!(content.body(), "hi");
    }

    #[test]
    fn test_reply_request_uses_camel_case() {
        let email = EmailSummary::new("1", "bob@example.com", "Lunch?", 100);
        let reply = ReplyRequest::new("alice", &email, "Sure");

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["replyTo"], "bob@example.com");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["subject"], "Lunch?");
    }

    #[test]
    fn test_session_debug_redacts_password() {
        let session = Session::new("alice", "alice@example.com").with_password("hunter2");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }
}
