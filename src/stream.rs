//! Folds Messages API stream events into a complete message, surfacing text
//! and thinking deltas as partial responses along the way.

use std::collections::HashMap;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{ApiError, Error, Result, StreamError};
use crate::format::anthropic::{ContentBlock, ContentDelta, MessagesResponse, StreamEvent};
use crate::format::genai::LlmResponse;
use crate::format::to_genai::{convert_response, partial_text_response, partial_thought_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
}

/// Per-call accumulation state. Consumed by [`StreamAccumulator::finish`].
#[derive(Debug)]
pub struct StreamAccumulator {
    message: MessagesResponse,
    /// Raw `input_json_delta` fragments per tool_use block, parsed on block stop.
    tool_inputs: HashMap<usize, String>,
    state: StreamState,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            message: MessagesResponse::default(),
            tool_inputs: HashMap::new(),
            state: StreamState::Open,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// The message as accumulated so far.
    pub fn message(&self) -> &MessagesResponse {
        &self.message
    }

    /// Apply one event. Returns a partial response for text and thinking deltas.
    pub fn push(&mut self, event: StreamEvent) -> Result<Option<LlmResponse>> {
        if self.is_closed() {
            return Err(StreamError::Closed.into());
        }

        match event {
            StreamEvent::MessageStart { message } => {
                let content = std::mem::take(&mut self.message.content);
                self.message = *message;
                if self.message.content.is_empty() {
                    self.message.content = content;
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let expected = self.message.content.len();
                if index != expected {
                    return Err(StreamError::UnexpectedBlockIndex { index, expected }.into());
                }
                if matches!(content_block, ContentBlock::ToolUse { .. }) {
                    self.tool_inputs.insert(index, String::new());
                }
                self.message.content.push(content_block);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                return self.apply_delta(index, delta);
            }
            StreamEvent::ContentBlockStop { index } => {
                if index >= self.message.content.len() {
                    return Err(StreamError::UnknownBlockIndex(index).into());
                }
                self.finalize_tool_input(index)?;
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.message.stop_reason = delta.stop_reason.or(self.message.stop_reason);
                if delta.stop_sequence.is_some() {
                    self.message.stop_sequence = delta.stop_sequence;
                }
                let totals = &mut self.message.usage;
                totals.output_tokens = usage.output_tokens;
                if let Some(input_tokens) = usage.input_tokens {
                    totals.input_tokens = input_tokens;
                }
                if usage.cache_creation_input_tokens.is_some() {
                    totals.cache_creation_input_tokens = usage.cache_creation_input_tokens;
                }
                if usage.cache_read_input_tokens.is_some() {
                    totals.cache_read_input_tokens = usage.cache_read_input_tokens;
                }
            }
            StreamEvent::MessageStop => {
                self.state = StreamState::Closed;
            }
            StreamEvent::Error { error } => {
                self.state = StreamState::Closed;
                return Err(Error::Stream(ApiError::from_error_data(&error)));
            }
            StreamEvent::Ping | StreamEvent::Unknown => {}
        }

        Ok(None)
    }

    fn apply_delta(&mut self, index: usize, delta: ContentDelta) -> Result<Option<LlmResponse>> {
        let len = self.message.content.len();
        if index == len {
            // Delta for the next block without a start event.
            let block = match &delta {
                ContentDelta::Text { .. } => ContentBlock::text(""),
                ContentDelta::Thinking { .. } => ContentBlock::Thinking {
                    thinking: String::new(),
                    signature: String::new(),
                },
                _ => return Err(StreamError::UnknownBlockIndex(index).into()),
            };
            self.message.content.push(block);
        }

        let Some(block) = self.message.content.get_mut(index) else {
            return Err(StreamError::UnknownBlockIndex(index).into());
        };

        let partial = match (block, delta) {
            (ContentBlock::Text { text }, ContentDelta::Text { text: chunk }) => {
                text.push_str(&chunk);
                (!chunk.is_empty()).then(|| partial_text_response(&chunk))
            }
            (ContentBlock::Thinking { thinking, .. }, ContentDelta::Thinking { thinking: chunk }) => {
                thinking.push_str(&chunk);
                (!chunk.is_empty()).then(|| partial_thought_response(&chunk))
            }
            (ContentBlock::Thinking { signature, .. }, ContentDelta::Signature { signature: chunk }) => {
                signature.push_str(&chunk);
                None
            }
            (ContentBlock::ToolUse { .. }, ContentDelta::InputJson { partial_json }) => {
                self.tool_inputs
                    .entry(index)
                    .or_default()
                    .push_str(&partial_json);
                None
            }
            (ContentBlock::Unknown, _) | (_, ContentDelta::Other) => None,
            (_, delta) => {
                return Err(StreamError::MismatchedDelta {
                    index,
                    delta: delta.kind(),
                }
                .into());
            }
        };

        Ok(partial)
    }

    fn finalize_tool_input(&mut self, index: usize) -> Result<()> {
        let Some(raw) = self.tool_inputs.remove(&index) else {
            return Ok(());
        };
        if raw.trim().is_empty() {
            return Ok(());
        }
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|source| StreamError::InvalidToolInput { index, source })?;
        if let Some(ContentBlock::ToolUse { input, .. }) = self.message.content.get_mut(index) {
            *input = parsed;
        }
        Ok(())
    }

    /// Convert the accumulated message into the final, turn-complete response.
    pub fn finish(mut self) -> Result<LlmResponse> {
        let mut pending: Vec<usize> = self.tool_inputs.keys().copied().collect();
        pending.sort_unstable();
        for index in pending {
            self.finalize_tool_input(index)?;
        }

        let mut response = convert_response(&self.message).map_err(Error::Response)?;
        response.turn_complete = true;
        Ok(response)
    }
}

/// Drive an accumulator over an event stream.
///
/// Yields one partial per text or thinking delta, then the complete response.
/// Stops at the first error. Dropping the returned stream stops consumption.
pub fn accumulate<S>(events: S) -> impl Stream<Item = Result<LlmResponse>> + Send
where
    S: Stream<Item = std::result::Result<StreamEvent, ApiError>> + Send + 'static,
{
    try_stream! {
        let mut accumulator = StreamAccumulator::new();
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            let event = event.map_err(Error::Stream)?;
            if let Some(partial) = accumulator.push(event)? {
                yield partial;
            }
            if accumulator.is_closed() {
                break;
            }
        }

        yield accumulator.finish()?;
    }
}
