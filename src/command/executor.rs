//! Command dispatcher - filters inbound frames, runs commands, reports results

use super::runner::CommandRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use udpu_shared::codec::{CodecError, MAX_FRAME_SIZE};
use udpu_shared::{codec, now_rfc3339, timing, InboundFrame, OutboundFrame, ResultData};

use crate::connection::SessionHandle;

/// Dispatcher limits
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Commands allowed to execute at once
    pub max_concurrent: usize,
    pub command_timeout: Duration,
    /// Cap on each captured stream so a result always fits in one frame
    pub max_output_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            command_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
            max_output_bytes: 256 * 1024,
        }
    }
}

/// Turns inbound command frames into result frames
pub struct Dispatcher {
    subscriber_id: String,
    runner: Arc<dyn CommandRunner>,
    permits: Semaphore,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        subscriber_id: String,
        runner: Arc<dyn CommandRunner>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            subscriber_id,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            runner,
            config,
        }
    }

    /// Decode a raw frame and keep it only if it targets this device
    pub fn accept(&self, raw: &str) -> Option<InboundFrame> {
        let frame = match codec::decode_inbound(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Discarding malformed frame: {}", e);
                return None;
            }
        };

        if frame.topic() != self.subscriber_id {
            debug!(topic = %frame.topic(), call_id = %frame.call_id(), "Ignoring frame for another topic");
            return None;
        }

        Some(frame)
    }

    /// Run the frame's command and build the correlated result
    pub async fn execute(&self, frame: &InboundFrame) -> OutboundFrame {
        info!(
            call_id = %frame.call_id(),
            action_type = %frame.action_type(),
            "Executing command"
        );

        let (stdout, stderr) = match self.runner.run(frame.command()).await {
            Ok(output) if output.success() => (output.stdout, output.stderr),
            Ok(output) => {
                warn!(call_id = %frame.call_id(), exit_code = output.exit_code, "Command failed");
                let stderr = if output.stderr.trim().is_empty() {
                    format!("command exited with status {}", output.exit_code)
                } else {
                    output.stderr
                };
                (output.stdout, stderr)
            }
            Err(e) => {
                warn!(call_id = %frame.call_id(), "Command could not run: {}", e);
                (String::new(), e.to_string())
            }
        };

        fit_to_frame(OutboundFrame::result(
            frame.call_id(),
            ResultData {
                stdout: truncate(stdout, self.config.max_output_bytes),
                stderr: truncate(stderr, self.config.max_output_bytes),
                datetime: now_rfc3339(),
                kind: frame.action_type().to_string(),
            },
        ))
    }

    /// Accept, then execute. `None` when the frame was discarded.
    #[cfg(test)]
    pub async fn process(&self, raw: &str) -> Option<OutboundFrame> {
        let frame = self.accept(raw)?;
        Some(self.execute(&frame).await)
    }

    /// Handle a frame off the receive path.
    ///
    /// Accepted frames run on their own task once a permit is free; the
    /// result goes out through `session`. Returns `None` for discarded frames.
    pub fn dispatch(self: &Arc<Self>, raw: &str, session: SessionHandle) -> Option<JoinHandle<()>> {
        let frame = self.accept(raw)?;
        let dispatcher = Arc::clone(self);

        Some(tokio::spawn(async move {
            let _permit = match dispatcher.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(call_id = %frame.call_id(), "Dispatcher closed, skipping command");
                    return;
                }
            };

            let result = dispatcher.execute(&frame).await;
            if session.send(&result).await {
                info!(call_id = %frame.call_id(), "Result published");
            } else {
                warn!(call_id = %frame.call_id(), "Result not published");
            }
        }))
    }

    /// Permits currently free
    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

const TRUNCATED_MARKER: &str = "\n[output truncated]";

/// Shrink stdout/stderr until the encoded frame fits in `MAX_FRAME_SIZE`.
///
/// JSON escaping can grow a byte up to six, so the raw-length cap alone does
/// not bound the encoded frame. Each pass cuts the stream with the longer
/// encoded form by at least the overshoot, measured in encoded bytes.
fn fit_to_frame(mut frame: OutboundFrame) -> OutboundFrame {
    for _ in 0..3 {
        let overshoot = match codec::encode_result(&frame) {
            Err(CodecError::FrameTooLarge(len)) => len - MAX_FRAME_SIZE,
            _ => return frame,
        };

        let data = &mut frame.request.arguments.data;
        let field = if escaped_len(&data.stdout) >= escaped_len(&data.stderr) {
            &mut data.stdout
        } else {
            &mut data.stderr
        };

        let mut raw = strip_marker(std::mem::take(field));
        let budget = escaped_len(&raw)
            .saturating_sub(overshoot + escaped_len(TRUNCATED_MARKER));
        warn!(
            call_id = %frame.request.call_id,
            overshoot,
            "Result frame too large, cutting output"
        );
        raw.truncate(escaped_prefix(&raw, budget));
        raw.push_str(TRUNCATED_MARKER);
        *field = raw;
    }
    frame
}

/// Bytes `c` takes inside a JSON string
fn escaped_char_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

fn escaped_len(text: &str) -> usize {
    text.chars().map(escaped_char_len).sum()
}

/// Longest prefix (in bytes) whose escaped form fits in `budget`
fn escaped_prefix(text: &str, budget: usize) -> usize {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        used += escaped_char_len(c);
        if used > budget {
            return idx;
        }
    }
    text.len()
}

fn strip_marker(mut text: String) -> String {
    if text.ends_with(TRUNCATED_MARKER) {
        text.truncate(text.len() - TRUNCATED_MARKER.len());
    }
    text
}

/// Cut `text` to at most `max` bytes on a char boundary
fn truncate(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(TRUNCATED_MARKER);
    text
}
