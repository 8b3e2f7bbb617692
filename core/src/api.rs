//! REST client for the mail API

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ServerConfig;
use crate::error::{MailError, MailResult};
use crate::types::{EmailSummary, FullEmail, ReplyRequest, Session};

/// Mail API consumed by the sync core and the session context
#[async_trait]
pub trait MailApi: Send + Sync {
    /// List summaries for an identity, newest first
    async fn list_emails(&self, username: &str) -> MailResult<Vec<EmailSummary>>;

    /// Fetch one message with its raw body
    async fn get_email(&self, id: &str) -> MailResult<FullEmail>;

    /// Send a reply; never retried
    async fn send_reply(&self, reply: &ReplyRequest) -> MailResult<()>;

    /// Create a new ephemeral identity
    async fn generate_identity(&self) -> MailResult<Session>;

    /// Log in to an existing identity
    async fn login(&self, username: &str, password: &str) -> MailResult<Session>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// `MailApi` over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpMailApi {
    client: Client,
    api_url: Url,
}

impl HttpMailApi {
    /// Create a client for the given server configuration
    pub fn new(server: &ServerConfig) -> MailResult<Self> {
        Ok(Self::with_client(Client::new(), server.api_url()?))
    }

    /// Create a client from an existing `reqwest::Client` and API base URL
    pub fn with_client(client: Client, api_url: Url) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    fn endpoint(&self, segments: &[&str]) -> MailResult<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| MailError::config(format!("API URL cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response, endpoint: &str) -> MailResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            debug!("{} failed with HTTP {}", endpoint, status);
            Err(MailError::status(endpoint, status.as_u16()))
        }
    }
}

#[async_trait]
impl MailApi for HttpMailApi {
    async fn list_emails(&self, username: &str) -> MailResult<Vec<EmailSummary>> {
        let url = self.endpoint(&["emails", username])?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, "GET /emails").await?;
        Ok(response.json().await?)
    }

    async fn get_email(&self, id: &str) -> MailResult<FullEmail> {
        let url = self.endpoint(&["email", id])?;
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MailError::not_found(format!("Email {}", id)));
        }
        let response = Self::check(response, "GET /email").await?;
        Ok(response.json().await?)
    }

    async fn send_reply(&self, reply: &ReplyRequest) -> MailResult<()> {
        let url = self.endpoint(&["reply"])?;
        let response = self.client.post(url).json(reply).send().await?;
        Self::check(response, "POST /reply").await?;
        Ok(())
    }

    async fn generate_identity(&self) -> MailResult<Session> {
        let url = self.endpoint(&["generate"])?;
        let response = self.client.post(url).send().await?;
        let response = Self::check(response, "POST /generate").await?;
        Ok(response.json().await?)
    }

    async fn login(&self, username: &str, password: &str) -> MailResult<Session> {
        let url = self.endpoint(&["login"])?;
        let response = self
            .client
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let response = Self::check(response, "POST /login").await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpMailApi {
        let server = ServerConfig {
            base_url: base.to_string(),
            ..Default::default()
        };
        HttpMailApi::new(&server).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let api = api("https://mail.example.com");
        assert_eq!(
            api.endpoint(&["emails", "alice"]).unwrap().as_str(),
            "https://mail.example.com/api/emails/alice"
        );
        assert_eq!(
            api.endpoint(&["reply"]).unwrap().as_str(),
            "https://mail.example.com/api/reply"
        );
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let api = api("https://mail.example.com");
        assert_eq!(
            api.endpoint(&["email", "a/b c"]).unwrap().as_str(),
            "https://mail.example.com/api/email/a%2Fb%20c"
        );
    }
}
