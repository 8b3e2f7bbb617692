//! Push transports

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::config::ServerConfig;
use crate::error::{MailError, MailResult};

/// Text frames of one live connection. The stream ending means the server
/// closed the connection; an `Err` item means it failed.
pub type FrameStream = BoxStream<'static, MailResult<String>>;

/// Opens push connections for an identity
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection; resolves once the transport is ready
    async fn connect(&self, identity: &str) -> MailResult<FrameStream>;
}

/// WebSocket transport; the identity travels as the `username` query parameter
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn from_config(server: &ServerConfig) -> MailResult<Self> {
        Ok(Self::new(server.ws_url()?))
    }

    fn url_for(&self, identity: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("username", identity);
        url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, identity: &str) -> MailResult<FrameStream> {
        let url = self.url_for(identity);
        debug!("Opening push socket {}", url);

        let (socket, _response) = connect_async(url.as_str()).await?;

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        trace!("Skipping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(MailError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}
