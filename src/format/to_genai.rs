use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use tracing::debug;

use super::anthropic::{ContentBlock, MessagesResponse, StopReason, Usage};
use super::genai::{Content, FinishReason, LlmResponse, Part, ROLE_MODEL, UsageMetadata};
use crate::error::ConvertError;

/// Convert a complete message. The caller decides whether it completes the turn.
pub fn convert_response(response: &MessagesResponse) -> Result<LlmResponse, ConvertError> {
    let mut parts = Vec::with_capacity(response.content.len());
    for block in &response.content {
        if let Some(part) = convert_block(block)? {
            parts.push(part);
        }
    }

    Ok(LlmResponse {
        content: Some(Content::new(ROLE_MODEL, parts)),
        partial: false,
        turn_complete: false,
        finish_reason: response.stop_reason.map(convert_stop_reason),
        usage_metadata: Some(convert_usage(&response.usage)),
    })
}

fn convert_block(block: &ContentBlock) -> Result<Option<Part>, ConvertError> {
    match block {
        ContentBlock::Text { text } => Ok(Some(Part::text(text.as_str()))),
        ContentBlock::Thinking {
            thinking,
            signature,
        } => {
            let signature = if signature.is_empty() {
                None
            } else {
                Some(STANDARD.decode(signature)?)
            };
            Ok(Some(Part::thought(thinking.as_str(), signature)))
        }
        ContentBlock::ToolUse { id, name, input } => {
            let args = match input {
                Value::Object(map) => map.clone(),
                Value::Null => Map::new(),
                _ => return Err(ConvertError::InvalidToolInput { name: name.clone() }),
            };
            Ok(Some(Part::function_call(id.as_str(), name.as_str(), Some(args))))
        }
        other => {
            debug!(block = other.kind(), "Skipping response block with no UCM equivalent");
            Ok(None)
        }
    }
}

pub fn convert_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn
        | StopReason::StopSequence
        | StopReason::ToolUse
        | StopReason::PauseTurn => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::MaxTokens,
        StopReason::Refusal => FinishReason::Safety,
    }
}

pub fn convert_usage(usage: &Usage) -> UsageMetadata {
    let cache_read = usage.cache_read_input_tokens.unwrap_or(0);
    let cache_creation = usage.cache_creation_input_tokens.unwrap_or(0);
    let prompt = usage
        .input_tokens
        .saturating_add(cache_read)
        .saturating_add(cache_creation);

    UsageMetadata {
        prompt_token_count: prompt,
        candidates_token_count: usage.output_tokens,
        total_token_count: prompt.saturating_add(usage.output_tokens),
        cached_content_token_count: cache_read,
    }
}

pub fn partial_text_response(text: &str) -> LlmResponse {
    partial_response(Part::text(text))
}

pub fn partial_thought_response(thinking: &str) -> LlmResponse {
    partial_response(Part::thought(thinking, None))
}

fn partial_response(part: Part) -> LlmResponse {
    LlmResponse {
        content: Some(Content::new(ROLE_MODEL, vec![part])),
        partial: true,
        ..LlmResponse::default()
    }
}
