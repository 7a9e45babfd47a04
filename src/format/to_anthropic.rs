use tracing::debug;

use super::anthropic::{
    ApiSurface, ContentBlock, Message, MessagesRequest, OutputFormat, Role,
    STRUCTURED_OUTPUTS_BETA, SystemPrompt, ThinkingConfig,
};
use super::content::convert_part;
use super::genai::{Content, GenerationConfig, Part, ThinkingConfig as GenaiThinkingConfig, ThinkingLevel};
use super::schema::schema_to_map;
use super::structured::embed_schema_in_system_instruction;
use super::tools::{convert_tool_choice, convert_tools};
use crate::config::Variant;
use crate::error::ConvertError;

const HIGH_THINKING_BUDGET: u32 = 10000;
const LOW_THINKING_BUDGET: u32 = 1024;

/// Per-model settings the request builder needs beyond the UCM request itself.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub model: String,
    pub default_max_tokens: u32,
    pub variant: Variant,
}

/// A request ready to send, plus how its response must be post-processed.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: MessagesRequest,
    pub surface: ApiSurface,
    /// Set on the prompt-embedded schema path: the reply text may be fenced.
    pub strip_fences: bool,
}

/// Pick the API surface and build the request.
///
/// A response schema uses the native structured-output surface where the
/// variant supports it, otherwise the schema is moved into the system
/// instruction of a copied config.
pub fn build_request(
    contents: &[Content],
    config: Option<&GenerationConfig>,
    options: &RequestOptions,
) -> Result<PreparedRequest, ConvertError> {
    let wants_schema = config.is_some_and(|c| c.response_schema.is_some());
    let native = options.variant.supports_structured_output();

    let prepared = match (wants_schema, native, config) {
        (true, true, _) => PreparedRequest {
            request: convert_request(
                contents,
                config,
                &options.model,
                options.default_max_tokens,
                ApiSurface::StructuredOutput,
            )?,
            surface: ApiSurface::StructuredOutput,
            strip_fences: false,
        },
        (true, false, Some(config)) => {
            let embedded = embed_schema_in_system_instruction(config)?;
            PreparedRequest {
                request: convert_request(
                    contents,
                    Some(&embedded),
                    &options.model,
                    options.default_max_tokens,
                    ApiSurface::Standard,
                )?,
                surface: ApiSurface::Standard,
                strip_fences: true,
            }
        }
        _ => PreparedRequest {
            request: convert_request(
                contents,
                config,
                &options.model,
                options.default_max_tokens,
                ApiSurface::Standard,
            )?,
            surface: ApiSurface::Standard,
            strip_fences: false,
        },
    };

    debug!(
        model = %options.model,
        variant = ?options.variant,
        surface = ?prepared.surface,
        strip_fences = prepared.strip_fences,
        messages = prepared.request.messages.len(),
        "Built messages request"
    );

    Ok(prepared)
}

/// Build a request for a fixed surface. `max_output_tokens` of zero or unset
/// falls back to `default_max_tokens`.
pub fn convert_request(
    contents: &[Content],
    config: Option<&GenerationConfig>,
    model: &str,
    default_max_tokens: u32,
    surface: ApiSurface,
) -> Result<MessagesRequest, ConvertError> {
    let max_tokens = config
        .and_then(|c| c.max_output_tokens)
        .filter(|&n| n > 0)
        .unwrap_or(default_max_tokens);

    let mut request = MessagesRequest::new(model, max_tokens);
    request.messages = convert_contents(contents, surface)?;

    let Some(config) = config else {
        return Ok(request);
    };

    if let Some(system) = &config.system_instruction {
        request.system = convert_system_instruction(system)?;
    }
    request.temperature = config.temperature;
    request.top_p = config.top_p;
    request.top_k = config.top_k;
    request.stop_sequences = config.stop_sequences.clone();
    request.tools = convert_tools(&config.tools)?;
    if let Some(tool_config) = &config.tool_config {
        request.tool_choice = convert_tool_choice(tool_config)?;
    }
    request.thinking = config.thinking_config.as_ref().and_then(convert_thinking_config);
    // The thinking budget is counted against max_tokens and must stay below it.
    if let Some(ThinkingConfig::Enabled { budget_tokens }) = request.thinking
        && budget_tokens >= request.max_tokens
    {
        let raised = budget_tokens.saturating_add(request.max_tokens);
        debug!(
            budget_tokens,
            max_tokens = request.max_tokens,
            raised,
            "Raising max_tokens above thinking budget"
        );
        request.max_tokens = raised;
    }

    if surface == ApiSurface::StructuredOutput
        && let Some(schema) = &config.response_schema
    {
        request.output_format = Some(OutputFormat::JsonSchema {
            schema: schema_to_map(schema),
        });
        request.betas.push(STRUCTURED_OUTPUTS_BETA.to_string());
    }

    Ok(request)
}

/// Assemble turns into strictly alternating messages.
///
/// Turns that translate to nothing are dropped; adjacent turns resolving to
/// the same role are merged in order.
pub fn convert_contents(
    contents: &[Content],
    surface: ApiSurface,
) -> Result<Vec<Message>, ConvertError> {
    let mut messages: Vec<Message> = Vec::with_capacity(contents.len());

    for (index, content) in contents.iter().enumerate() {
        let role = resolve_role(content)?;

        let mut blocks = Vec::with_capacity(content.parts.len());
        for part in &content.parts {
            if let Some(block) = convert_part(part, surface)? {
                blocks.push(block);
            }
        }

        if blocks.is_empty() {
            debug!(index, role = %content.role, "Dropping turn with no content");
            continue;
        }

        match messages.last_mut() {
            Some(last) if last.role == role => {
                debug!(index, role = role.as_str(), "Merging consecutive same-role turn");
                last.content.extend(blocks);
            }
            _ => messages.push(Message::new(role, blocks)),
        }
    }

    Ok(messages)
}

/// Tool results force `user`, tool calls force `assistant`, in that order.
fn resolve_role(content: &Content) -> Result<Role, ConvertError> {
    if content.parts.iter().any(Part::is_function_response) {
        return Ok(Role::User);
    }
    if content.parts.iter().any(Part::is_function_call) {
        return Ok(Role::Assistant);
    }
    map_role(&content.role)
}

pub fn map_role(role: &str) -> Result<Role, ConvertError> {
    if role.eq_ignore_ascii_case("user") {
        Ok(Role::User)
    } else if role.eq_ignore_ascii_case("model") || role.eq_ignore_ascii_case("assistant") {
        Ok(Role::Assistant)
    } else {
        Err(ConvertError::UnsupportedRole(role.to_string()))
    }
}

/// Only text can ride in the system prompt. Empty text is skipped.
pub fn convert_system_instruction(
    content: &Content,
) -> Result<Option<SystemPrompt>, ConvertError> {
    let mut blocks = Vec::new();
    for part in &content.parts {
        let text = match part {
            Part::Text(t) => &t.text,
            Part::Thought(t) => &t.text,
            Part::Other(_) => continue,
            other => return Err(ConvertError::UnsupportedPart(other.kind())),
        };
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text.as_str()));
        }
    }
    Ok((!blocks.is_empty()).then_some(SystemPrompt::Blocks(blocks)))
}

/// An explicit budget wins over the level, the level over `include_thoughts`.
/// A non-positive explicit budget disables thinking.
pub fn convert_thinking_config(config: &GenaiThinkingConfig) -> Option<ThinkingConfig> {
    let budget = match (config.thinking_budget, config.thinking_level) {
        (Some(budget), _) => budget,
        (None, Some(ThinkingLevel::High)) => HIGH_THINKING_BUDGET as i32,
        (None, Some(ThinkingLevel::Low)) => LOW_THINKING_BUDGET as i32,
        (None, None) if config.include_thoughts => HIGH_THINKING_BUDGET as i32,
        (None, None) => return None,
    };

    match u32::try_from(budget) {
        Ok(budget_tokens) if budget_tokens > 0 => Some(ThinkingConfig::Enabled { budget_tokens }),
        _ => Some(ThinkingConfig::Disabled),
    }
}
