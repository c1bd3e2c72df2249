//! Bus session management
//!
//! This module handles:
//! - One persistent WebSocket connection to the control-plane bus
//! - The subscribe handshake for this device's topic
//! - Automatic reconnection with a fresh handshake after any transport error
//! - Serialized outbound publishing through a single owner of the socket

mod manager;

pub use manager::{BusSession, ConnectionConfig, ConnectionEvent, SessionHandle};
