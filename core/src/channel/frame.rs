//! Push frame decoding

use serde::Deserialize;

use crate::error::{MailError, MailResult};

/// Frame type announcing that new mail arrived
pub const NEW_EMAIL: &str = "NEW_EMAIL";

/// Envelope of every server-to-client frame: `{type, data}`
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of a `NEW_EMAIL` frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEmail {
    /// Display hint only; never written into the mailbox
    pub sender: String,
}

/// Known push events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    NewEmail(NewEmail),
}

impl PushEvent {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames of a type this client does not
    /// know, so new server events never break older clients.
    pub fn parse(text: &str) -> MailResult<Option<Self>> {
        let raw: RawFrame = serde_json::from_str(text)
            .map_err(|e| MailError::parse(format!("invalid push frame: {}", e)))?;

        match raw.kind.as_str() {
            NEW_EMAIL => {
                let payload: NewEmail = serde_json::from_value(raw.data)
                    .map_err(|e| MailError::parse(format!("invalid {} payload: {}", NEW_EMAIL, e)))?;
                Ok(Some(PushEvent::NewEmail(payload)))
            }
            other => {
                tracing::debug!("Ignoring push frame of unknown type {:?}", other);
                Ok(None)
            }
        }
    }

    /// Sender shown in "new mail" toasts
    pub fn sender_hint(&self) -> Option<&str> {
        match self {
            PushEvent::NewEmail(payload) => Some(&payload.sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new_email() {
        let event = PushEvent::parse(r#"{"type":"NEW_EMAIL","data":{"sender":"bob@example.com"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            PushEvent::NewEmail(NewEmail {
                sender: "bob@example.com".to_string()
            })
        );
        assert_eq!(event.sender_hint(), Some("bob@example.com"));
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let event = PushEvent::parse(
            r#"{"type":"NEW_EMAIL","data":{"sender":"bob@example.com","subject":"hi"},"ts":1}"#,
        )
        .unwrap();
        assert!(event.is_some());
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let event = PushEvent::parse(r#"{"type":"EMAIL_DELETED","data":{"id":"1"}}"#).unwrap();
        assert_eq!(event, None);

        let event = PushEvent::parse(r#"{"type":"PING"}"#).unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(PushEvent::parse("not json").is_err());
        assert!(PushEvent::parse(r#"{"data":{"sender":"x"}}"#).is_err());
        assert!(PushEvent::parse(r#"{"type":"NEW_EMAIL","data":{}}"#).is_err());
        assert!(PushEvent::parse(r#"{"type":"NEW_EMAIL"}"#).is_err());
    }
}
