//! Prompt-embedded JSON schema for surfaces without native structured output,
//! and cleanup of the fenced replies models tend to produce anyway.

use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::debug;

use super::genai::{Content, GenerationConfig, LlmResponse, Part, Schema};
use super::schema::schema_to_json_string;
use crate::error::ConvertError;

const INSTRUCTION_PREFIX: &str =
    "You must respond with valid JSON that conforms to the following JSON schema:";
const INSTRUCTION_SUFFIX: &str =
    "Respond ONLY with the JSON object, no markdown code fences, no explanations.";

/// Entire text is one fenced block, optionally tagged `json`.
static WHOLE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*\n?(.*?)\s*```\s*$").expect("valid regex")
});

/// First fenced JSON object or array anywhere in the text.
static EMBEDDED_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(\{.*?\}|\[.*?\])\s*```").expect("valid regex")
});

pub fn json_instruction(schema: &Schema) -> String {
    format!(
        "{INSTRUCTION_PREFIX}\n\n{}\n\n{INSTRUCTION_SUFFIX}",
        schema_to_json_string(schema)
    )
}

/// Returns a copy of `config` with the response schema moved into the
/// system instruction. Existing instruction text is kept as a prefix and its
/// role is preserved. Non-text instruction parts are rejected.
pub fn embed_schema_in_system_instruction(
    config: &GenerationConfig,
) -> Result<GenerationConfig, ConvertError> {
    let mut embedded = config.clone();
    let Some(schema) = embedded.response_schema.take() else {
        return Ok(embedded);
    };
    let instruction = json_instruction(&schema);

    embedded.system_instruction = Some(match &config.system_instruction {
        None => Content::new(String::new(), vec![Part::text(instruction)]),
        Some(existing) => {
            let mut text = String::new();
            for part in &existing.parts {
                let part_text = match part {
                    Part::Text(t) => t.text.as_str(),
                    Part::Thought(t) => t.text.as_str(),
                    Part::Other(_) => "",
                    other => return Err(ConvertError::UnsupportedPart(other.kind())),
                };
                if !part_text.is_empty() {
                    text.push_str(part_text);
                    text.push_str("\n\n");
                }
            }
            text.push_str(&instruction);
            Content::new(existing.role.clone(), vec![Part::text(text)])
        }
    });

    Ok(embedded)
}

/// Extract the JSON payload from a fenced reply.
///
/// Tries a whole-text fence first, then the first fenced object or array.
/// Returns `None` when neither matches, including unterminated fences.
pub fn strip_markdown_fences(text: &str) -> Option<&str> {
    WHOLE_FENCE
        .captures(text)
        .or_else(|| EMBEDDED_FENCE.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Strip fences from every answer text part in place.
pub fn strip_markdown_from_response(response: &mut LlmResponse) {
    let Some(content) = response.content.as_mut() else {
        return;
    };

    for part in &mut content.parts {
        let Part::Text(t) = part else {
            continue;
        };
        if t.text.is_empty() {
            continue;
        }
        if let Some(stripped) = strip_markdown_fences(&t.text) {
            let stripped = stripped.to_string();
            debug!(
                original_length = t.text.len(),
                stripped_length = stripped.len(),
                "Stripped markdown fences from JSON response"
            );
            t.text = stripped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::genai::{ROLE_MODEL, ROLE_USER, Type};
    use std::collections::BTreeMap;

    fn create_test_schema() -> Schema {
        let mut properties = BTreeMap::new();
        properties.insert("k".to_string(), Schema::of_type(Type::String));
        Schema {
            properties,
            ..Schema::of_type(Type::Object)
        }
    }

    fn system_text(config: &GenerationConfig) -> String {
        match &config.system_instruction {
            Some(content) => match content.parts.as_slice() {
                [Part::Text(t)] => t.text.clone(),
                other => panic!("Expected a single text part, got {other:?}"),
            },
            None => panic!("Expected a system instruction"),
        }
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(
            strip_markdown_fences("```json\n{\"k\":\"v\"}\n```"),
            Some(r#"{"k":"v"}"#)
        );
    }

    #[test]
    fn test_strip_plain_fence() {
        assert_eq!(strip_markdown_fences("```\n[1, 2]\n```"), Some("[1, 2]"));
    }

    #[test]
    fn test_strip_surrounding_whitespace() {
        assert_eq!(
            strip_markdown_fences("  \n```json\n{\"a\": 1}\n```  \n"),
            Some(r#"{"a": 1}"#)
        );
    }

    #[test]
    fn test_strip_multiline_json() {
        let text = "```json\n{\n  \"a\": 1,\n  \"b\": [true, false]\n}\n```";
        assert_eq!(
            strip_markdown_fences(text),
            Some("{\n  \"a\": 1,\n  \"b\": [true, false]\n}")
        );
    }

    #[test]
    fn test_bare_json_untouched() {
        assert_eq!(strip_markdown_fences(r#"{"k":"v"}"#), None);
    }

    #[test]
    fn test_unterminated_fence_untouched() {
        assert_eq!(strip_markdown_fences("```json\n{\"k\":\"v\"}"), None);
    }

    #[test]
    fn test_extract_fenced_json_after_preamble() {
        let text = "Here you go:\n```json\n{\"k\":\"v\"}\n```\nHope that helps.";
        assert_eq!(strip_markdown_fences(text), Some(r#"{"k":"v"}"#));
    }

    #[test]
    fn test_strip_response_is_idempotent() {
        let mut response = LlmResponse {
            content: Some(Content::new(
                ROLE_MODEL,
                vec![
                    Part::thought("```json\n{}\n```", None),
                    Part::text("```json\n{\"k\":\"v\"}\n```"),
                ],
            )),
            ..LlmResponse::default()
        };

        strip_markdown_from_response(&mut response);
        let once = response.clone();
        strip_markdown_from_response(&mut response);

        assert_eq!(response, once);
        assert_eq!(response.text(), r#"{"k":"v"}"#);
        match &response.content.as_ref().unwrap().parts[0] {
            Part::Thought(t) => assert_eq!(t.text, "```json\n{}\n```"),
            other => panic!("Expected Thought part, got {other:?}"),
        }
    }

    #[test]
    fn test_embed_schema_without_system_instruction() {
        let config = GenerationConfig {
            response_schema: Some(create_test_schema()),
            ..GenerationConfig::default()
        };

        let embedded = embed_schema_in_system_instruction(&config).unwrap();
        let text = system_text(&embedded);

        assert!(embedded.response_schema.is_none());
        assert!(text.starts_with(INSTRUCTION_PREFIX));
        assert!(text.contains("\"type\": \"object\""));
        assert!(text.ends_with("Respond ONLY with the JSON object, no markdown code fences, no explanations."));
        assert!(config.system_instruction.is_none());
        assert!(config.response_schema.is_some());
    }

    #[test]
    fn test_embed_schema_keeps_existing_instruction() {
        let config = GenerationConfig {
            response_schema: Some(create_test_schema()),
            system_instruction: Some(Content::new(
                ROLE_USER,
                vec![Part::text("You are a bot."), Part::text(""), Part::text("Be kind.")],
            )),
            ..GenerationConfig::default()
        };

        let embedded = embed_schema_in_system_instruction(&config).unwrap();
        let text = system_text(&embedded);

        assert!(text.starts_with("You are a bot.\n\nBe kind.\n\n"));
        assert!(text.contains("Respond ONLY with the JSON object"));
        assert_eq!(
            embedded.system_instruction.as_ref().map(|c| c.role.as_str()),
            Some(ROLE_USER)
        );
        assert_eq!(
            config.system_instruction.as_ref().map(|c| c.parts.len()),
            Some(3)
        );
    }

    #[test]
    fn test_embed_schema_rejects_non_text_instruction() {
        let config = GenerationConfig {
            response_schema: Some(create_test_schema()),
            system_instruction: Some(Content::new(
                ROLE_USER,
                vec![Part::text("Be terse."), Part::inline_data("image/png", vec![1, 2])],
            )),
            ..GenerationConfig::default()
        };

        match embed_schema_in_system_instruction(&config) {
            Err(ConvertError::UnsupportedPart(kind)) => assert_eq!(kind, "inline data"),
            other => panic!("Expected UnsupportedPart, got {other:?}"),
        }
    }
}
