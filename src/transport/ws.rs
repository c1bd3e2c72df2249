//! WebSocket transport to the control-plane bus

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use udpu_shared::{pubsub, timing};

use crate::discovery::Endpoint;
use crate::error::{AgentError, AgentResult};
use crate::transport::traits::TransportConnector;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector for the bus endpoint of a control-plane instance
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for `ws://{host}:{port}/api/v1.0/pubsub`
    pub fn new(endpoint: &Endpoint) -> Self {
        Self::with_url(endpoint.ws_url(pubsub::PUBSUB_PATH))
    }

    pub fn with_url(url: String) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
        }
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransportConnector for WsConnector {
    type Stream = WsStream;

    async fn connect(&self) -> AgentResult<Self::Stream> {
        debug!("Connecting to {}", self.url);
        match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(AgentError::Transport(format!("dial {}: {}", self.url, e))),
            Err(_) => Err(AgentError::Transport(format!(
                "dial {}: timed out after {:?}",
                self.url, self.connect_timeout
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "WebSocket"
    }
}
