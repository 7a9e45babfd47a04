pub mod anthropic;
pub mod content;
pub mod genai;
pub mod schema;
pub mod sse;
pub mod structured;
pub mod to_anthropic;
pub mod to_genai;
pub mod tools;

pub use anthropic::{
    ApiSurface, ContentBlock, ContentDelta, ErrorData, Message, MessagesRequest, MessagesResponse,
    Role, StopReason, StreamEvent, Usage,
};
pub use genai::{Content, GenerationConfig, LlmRequest, LlmResponse, Part};
pub use structured::{strip_markdown_fences, strip_markdown_from_response};
pub use to_anthropic::{PreparedRequest, RequestOptions, build_request, convert_request};
pub use to_genai::convert_response;
