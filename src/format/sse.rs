use tracing::warn;

use super::anthropic::StreamEvent;
use crate::error::ApiError;

/// Incremental decoder for a Messages API `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(4096),
        }
    }

    /// Feed a chunk and get every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<Result<StreamEvent, ApiError>> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        loop {
            // Frames end with a blank line, CRLF or LF, whichever comes first.
            let crlf = self.buffer.find("\r\n\r\n").map(|p| (p, 4));
            let lf = self.buffer.find("\n\n").map(|p| (p, 2));
            let boundary = match (crlf, lf) {
                (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
                (a, b) => a.or(b),
            };

            let Some((pos, skip)) = boundary else {
                break;
            };
            let frame: String = self.buffer.drain(..pos + skip).collect();
            if let Some(event) = parse_frame(&frame[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(mut self) -> Option<Result<StreamEvent, ApiError>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(rest.trim_end_matches(['\r', '\n']))
    }
}

fn parse_frame(frame: &str) -> Option<Result<StreamEvent, ApiError>> {
    let mut data = String::new();
    for line in frame.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(value.strip_prefix(' ').unwrap_or(value));
    }

    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(serde_json::from_str::<StreamEvent>(data).map_err(|e| {
        let raw: String = data.chars().take(300).collect();
        warn!(error = %e, raw = %raw, "Failed to parse stream event");
        ApiError::InvalidResponse(format!("undecodable stream event: {e}"))
    }))
}
