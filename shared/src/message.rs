//! Typed records for every message the agent exchanges
//!
//! Bus frames share one envelope:
//! ```text
//! {"request": {"method": ..., "arguments": {...}, "call_id": ...}, "response": ...}
//! ```
//! The `arguments` shape differs per message kind, so the envelope is generic
//! over it and each kind gets its own arguments record.

use serde::{Deserialize, Deserializer, Serialize};

use crate::pubsub;

/// Treat a JSON `null` string field as empty
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ========== HTTP records ==========

/// Port as served by the discovery registry (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    /// Numeric port, if the value is a valid one
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            PortValue::Number(p) => Some(*p),
            PortValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One candidate returned by the discovery registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub host: String,
    pub port: PortValue,
    #[serde(default, deserialize_with = "nullable_string")]
    pub service_type: String,
}

/// Registration response for this device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    #[serde(default, deserialize_with = "nullable_string")]
    pub subscriber_uid: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub location: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub mac_address: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub role: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub upstream_qos: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub downstream_qos: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub hostname: String,
}

impl SubscriberRecord {
    /// A record is usable only once the server has assigned an id
    pub fn is_assigned(&self) -> bool {
        !self.subscriber_uid.trim().is_empty()
    }
}

// ========== Bus frames ==========

/// Request half of a bus frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<A> {
    pub method: String,
    pub arguments: A,
    pub call_id: String,
}

/// Bus frame envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusFrame<A> {
    pub request: Request<A>,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

/// Arguments of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeArguments {
    pub topics: Vec<String>,
}

/// Subscription a command frame was delivered through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, deserialize_with = "nullable_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub subscriber_id: String,
    pub topic: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub notifier_id: String,
}

/// Command payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandData {
    #[serde(default, deserialize_with = "nullable_string")]
    pub action_type: String,
    pub command: String,
}

/// Arguments of an inbound command frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArguments {
    pub subscription: Subscription,
    pub data: CommandData,
}

/// Captured command output as published back to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    pub stdout: String,
    pub stderr: String,
    pub datetime: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Arguments of a publish request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishArguments {
    pub topics: Vec<String>,
    pub data: ResultData,
    pub sync: bool,
}

pub type SubscribeFrame = BusFrame<SubscribeArguments>;
pub type InboundFrame = BusFrame<CommandArguments>;
pub type OutboundFrame = BusFrame<PublishArguments>;

impl SubscribeFrame {
    /// Subscribe request for a single topic
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            request: Request {
                method: pubsub::METHOD_SUBSCRIBE.into(),
                arguments: SubscribeArguments {
                    topics: vec![topic.into()],
                },
                call_id: pubsub::SUBSCRIBE_CALL_ID.into(),
            },
            response: None,
        }
    }
}

impl InboundFrame {
    /// Topic this frame was delivered on
    pub fn topic(&self) -> &str {
        &self.request.arguments.subscription.topic
    }

    /// Command text to execute
    pub fn command(&self) -> &str {
        &self.request.arguments.data.command
    }

    pub fn action_type(&self) -> &str {
        &self.request.arguments.data.action_type
    }

    pub fn call_id(&self) -> &str {
        &self.request.call_id
    }
}

impl OutboundFrame {
    /// Result publish correlated to the triggering request
    pub fn result(call_id: impl Into<String>, data: ResultData) -> Self {
        Self {
            request: Request {
                method: pubsub::METHOD_PUBLISH.into(),
                arguments: PublishArguments {
                    topics: vec![pubsub::RESULT_TOPIC.into()],
                    data,
                    sync: true,
                },
                call_id: call_id.into(),
            },
            response: None,
        }
    }
}
