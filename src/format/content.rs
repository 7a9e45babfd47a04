//! Per-part translation from UCM parts to Messages API content blocks.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use super::anthropic::{
    ApiSurface, ContentBlock, DocumentSource, ImageMediaType, ImageSource, PDF_MEDIA_TYPE,
    ToolResultContent,
};
use super::genai::{Blob, FileData, FunctionCall, FunctionResponse, Part, ThoughtPart};
use crate::error::ConvertError;

/// What a MIME type maps to on the Messages API side.
enum MediaKind {
    Image(ImageMediaType),
    Pdf,
}

fn classify_mime(mime_type: &str, origin: &'static str) -> Result<MediaKind, ConvertError> {
    let normalized = mime_type.to_ascii_lowercase();
    if let Some(subtype) = normalized.strip_prefix("image/") {
        return ImageMediaType::from_subtype(subtype)
            .map(MediaKind::Image)
            .ok_or_else(|| ConvertError::UnsupportedImageType(mime_type.to_string()));
    }
    if normalized == PDF_MEDIA_TYPE {
        return Ok(MediaKind::Pdf);
    }
    Err(ConvertError::UnsupportedMimeType {
        origin,
        mime_type: mime_type.to_string(),
    })
}

/// Translate one part. `Ok(None)` means the part carried nothing to send.
pub fn convert_part(part: &Part, surface: ApiSurface) -> Result<Option<ContentBlock>, ConvertError> {
    match part {
        Part::Text(t) => Ok(text_block(&t.text)),
        Part::Thought(t) => Ok(convert_thought(t)),
        Part::InlineData(p) => convert_inline_data(&p.inline_data),
        Part::FileData(p) => convert_file_data(&p.file_data),
        Part::FunctionCall(p) => Ok(Some(convert_function_call(&p.function_call))),
        Part::FunctionResponse(p) => {
            convert_function_response(&p.function_response, surface).map(Some)
        }
        Part::ExecutableCode(_) | Part::CodeExecutionResult(_) => {
            Err(ConvertError::UnsupportedPart(part.kind()))
        }
        Part::Other(_) => Ok(None),
    }
}

fn text_block(text: &str) -> Option<ContentBlock> {
    (!text.is_empty()).then(|| ContentBlock::text(text))
}

/// Signed thoughts replay as thinking blocks; anything else degrades to text.
fn convert_thought(part: &ThoughtPart) -> Option<ContentBlock> {
    match &part.thought_signature {
        Some(signature) if part.thought && !signature.is_empty() => Some(ContentBlock::Thinking {
            thinking: part.text.clone(),
            signature: STANDARD.encode(signature),
        }),
        _ => text_block(&part.text),
    }
}

fn convert_inline_data(blob: &Blob) -> Result<Option<ContentBlock>, ConvertError> {
    if blob.mime_type.is_empty() && blob.data.is_empty() {
        return Ok(None);
    }
    let data = STANDARD.encode(&blob.data);
    let block = match classify_mime(&blob.mime_type, "inline data")? {
        MediaKind::Image(media_type) => ContentBlock::Image {
            source: ImageSource::Base64 { media_type, data },
        },
        MediaKind::Pdf => ContentBlock::Document {
            source: DocumentSource::Base64 {
                media_type: PDF_MEDIA_TYPE.to_string(),
                data,
            },
        },
    };
    Ok(Some(block))
}

fn convert_file_data(file: &FileData) -> Result<Option<ContentBlock>, ConvertError> {
    if file.file_uri.is_empty() {
        return Ok(None);
    }
    let url = file.file_uri.clone();
    let block = match classify_mime(&file.mime_type, "file data")? {
        MediaKind::Image(_) => ContentBlock::Image {
            source: ImageSource::Url { url },
        },
        MediaKind::Pdf => ContentBlock::Document {
            source: DocumentSource::Url { url },
        },
    };
    Ok(Some(block))
}

fn convert_function_call(call: &FunctionCall) -> ContentBlock {
    let input = call.args.clone().unwrap_or_else(Map::new);
    ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: Value::Object(input),
    }
}

fn convert_function_response(
    response: &FunctionResponse,
    surface: ApiSurface,
) -> Result<ContentBlock, ConvertError> {
    if response.id.is_empty() {
        return Err(ConvertError::MissingToolResultId {
            name: response.name.clone(),
        });
    }

    let payload = match &response.response {
        None | Some(Value::Null) => String::new(),
        Some(value) => serde_json::to_string(value).map_err(|source| {
            ConvertError::ToolResultSerialization {
                name: response.name.clone(),
                source,
            }
        })?,
    };

    let content = match surface {
        ApiSurface::Standard => ToolResultContent::Text(payload),
        ApiSurface::StructuredOutput => {
            ToolResultContent::Blocks(vec![ContentBlock::text(payload)])
        }
    };

    Ok(ContentBlock::ToolResult {
        tool_use_id: response.id.clone(),
        content,
        is_error: None,
    })
}
