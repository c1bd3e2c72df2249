//! Transport trait abstraction for pluggable bus backends

use async_trait::async_trait;
use futures::{Sink, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::AgentResult;

/// A duplex stream of bus messages
pub trait TransportStream:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin + 'static
{
}

impl<T> TransportStream for T where
    T: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Send
        + Unpin
        + 'static
{
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    async fn connect(&self) -> AgentResult<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
