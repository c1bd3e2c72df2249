//! JSON text-frame codec for the pub/sub bus
//!
//! Every bus message is a single WebSocket text frame holding one JSON
//! envelope (see [`crate::message::BusFrame`]). Decoding is strict: a frame
//! that does not match the expected record type is rejected rather than
//! partially accepted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{InboundFrame, OutboundFrame, SubscribeFrame};

/// Maximum frame size (1 MiB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("JSON decode error: {0}")]
    DecodeError(#[source] serde_json::Error),

    #[error("JSON encode error: {0}")]
    EncodeError(#[source] serde_json::Error),
}

/// Encode any frame into its JSON text form
pub fn encode<T: Serialize>(frame: &T) -> Result<String, CodecError> {
    let text = serde_json::to_string(frame).map_err(CodecError::EncodeError)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a frame of the given type from its JSON text form
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(CodecError::DecodeError)
}

/// Decode an inbound command frame
pub fn decode_inbound(text: &str) -> Result<InboundFrame, CodecError> {
    decode(text)
}

/// Encode the subscribe handshake for a topic
pub fn encode_subscribe(topic: &str) -> Result<String, CodecError> {
    encode(&SubscribeFrame::subscribe(topic))
}

/// Encode a result publish
pub fn encode_result(frame: &OutboundFrame) -> Result<String, CodecError> {
    encode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultData;

    const COMMAND_FRAME: &str = r#"{
        "request": {
            "method": "publish",
            "arguments": {
                "subscription": {"id": "1", "subscriber_id": "srv", "topic": "sub-1", "notifier_id": "n"},
                "data": {"action_type": "shell", "command": "echo hi"}
            },
            "call_id": "c-1"
        },
        "response": null
    }"#;

    #[test]
    fn test_decode_command_frame() {
        let frame = decode_inbound(COMMAND_FRAME).expect("decode failed");
        assert_eq!(frame.topic(), "sub-1");
        assert_eq!(frame.command(), "echo hi");
        assert_eq!(frame.call_id(), "c-1");
    }

    #[test]
    fn test_decode_rejects_missing_command() {
        let text = r#"{"request":{"method":"publish","arguments":{"subscription":{"topic":"sub-1"},"data":{"action_type":"shell"}},"call_id":"c"},"response":null}"#;
        assert!(matches!(
            decode_inbound(text),
            Err(CodecError::DecodeError(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(CodecError::DecodeError(_))
        ));
    }

    #[test]
    fn test_decode_subscribe_ack_is_not_a_command() {
        // The broker echoes subscribe requests; they carry no command payload.
        let ack = encode_subscribe("sub-1").unwrap();
        assert!(decode_inbound(&ack).is_err());
    }

    #[test]
    fn test_frame_too_large() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            decode_inbound(&big),
            Err(CodecError::FrameTooLarge(_))
        ));

        let frame = OutboundFrame::result(
            "c",
            ResultData {
                stdout: big,
                stderr: String::new(),
                datetime: String::new(),
                kind: String::new(),
            },
        );
        assert!(matches!(
            encode_result(&frame),
            Err(CodecError::FrameTooLarge(_))
        ));
    }
}
