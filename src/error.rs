//! Agent error taxonomy

use thiserror::Error;
use udpu_shared::codec::CodecError;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Connect/read/write failure on HTTP or the bus
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed JSON body or frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Command could not be run, or did not finish
    #[error("Execution error: {0}")]
    Execution(String),

    /// Discovery found no healthy instance
    #[error("No healthy {0} instance found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Identity error: {0}")]
    Identity(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AgentError::Decode(e.to_string())
        } else {
            AgentError::Transport(e.to_string())
        }
    }
}

impl From<CodecError> for AgentError {
    fn from(e: CodecError) -> Self {
        AgentError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AgentError::Transport(e.to_string())
    }
}
