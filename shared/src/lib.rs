//! uDPU Shared Protocol Types
//!
//! This crate provides the pub/sub frame types and JSON codec used between
//! the field agent, the discovery registry, and the control-plane bus.

pub mod codec;
pub mod message;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use message::*;

/// Current local time formatted as RFC 3339, as carried in result frames
pub fn now_rfc3339() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Control-plane HTTP and bus paths
pub mod pubsub {
    /// Discovery registry: candidate list for a service class
    pub const SERVICES_PATH: &str = "/api/v1.0/services";

    /// Health probe path on every control-plane instance
    pub const HEALTH_PATH: &str = "/api/v1.0/health";

    /// Bus endpoint path
    pub const PUBSUB_PATH: &str = "/api/v1.0/pubsub";

    /// Topic every command result is published to
    pub const RESULT_TOPIC: &str = "server";

    /// Correlation id carried by every subscribe request
    pub const SUBSCRIBE_CALL_ID: &str = "4140dd17a18c45db8a98ba155cbfa";

    /// Method names
    pub const METHOD_SUBSCRIBE: &str = "subscribe";
    pub const METHOD_PUBLISH: &str = "publish";

    /// Per-device registration resource
    pub fn registration_path(identity: &str) -> String {
        format!("/api/v1.0/adapter/{}/udpu", identity)
    }
}

/// Timing parameters for the agent
pub mod timing {
    /// Fixed delay between retries of discovery, registration and bus connect
    pub const RETRY_DELAY_MS: u64 = 5000;

    /// Health probe timeout (also bounds the candidate list request)
    pub const PROBE_TIMEOUT_MS: u64 = 2000;

    /// Registration request timeout
    pub const REGISTRATION_TIMEOUT_MS: u64 = 10000;

    /// Bus connect timeout
    pub const CONNECT_TIMEOUT_MS: u64 = 10000;

    /// Bound on a single bus write, including the subscribe handshake
    pub const WRITE_TIMEOUT_MS: u64 = 10000;

    /// Default bound on a single command execution
    pub const COMMAND_TIMEOUT_MS: u64 = 300_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_path() {
        assert_eq!(
            pubsub::registration_path("00:1B:44:11:3A:18"),
            "/api/v1.0/adapter/00:1B:44:11:3A:18/udpu"
        );
    }

    #[test]
    fn test_now_rfc3339_parses() {
        let stamp = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
