//! The model facade callers use: UCM request in, UCM responses out.
//!
//! Transport lives behind [`MessagesApi`]; this module only converts,
//! dispatches and post-processes.

use std::borrow::Cow;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::debug;

use crate::config::{ResolvedConfig, Variant};
use crate::error::{ApiError, Error, Result};
use crate::format::anthropic::{MessagesRequest, MessagesResponse, StreamEvent};
use crate::format::genai::{Content, LlmRequest, LlmResponse, ROLE_USER};
use crate::format::structured::strip_markdown_from_response;
use crate::format::to_anthropic::{PreparedRequest, RequestOptions, build_request};
use crate::format::to_genai::convert_response;
use crate::stream::accumulate;

const EMPTY_CONVERSATION_PROMPT: &str =
    "Handle the requests as specified in the System Instruction.";
const CONTINUE_PROMPT: &str = "Continue processing previous requests as instructed.";

pub type EventStream = BoxStream<'static, std::result::Result<StreamEvent, ApiError>>;

/// Transport to a Messages API deployment.
#[async_trait]
pub trait MessagesApi: Send + Sync {
    async fn create(
        &self,
        request: &MessagesRequest,
    ) -> std::result::Result<MessagesResponse, ApiError>;

    async fn stream(&self, request: &MessagesRequest) -> std::result::Result<EventStream, ApiError>;
}

pub struct AnthropicModel<C> {
    client: Arc<C>,
    name: String,
    variant: Variant,
    default_max_tokens: u32,
}

impl<C: MessagesApi + 'static> AnthropicModel<C> {
    pub fn new(client: C, name: impl Into<String>, config: &ResolvedConfig) -> Self {
        Self {
            client: Arc::new(client),
            name: name.into(),
            variant: config.variant,
            default_max_tokens: config.default_max_tokens,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One complete response, or a run of partials ending in the complete one.
    pub fn generate_content<'a>(
        &'a self,
        request: &'a LlmRequest,
        stream: bool,
    ) -> BoxStream<'a, Result<LlmResponse>> {
        if stream {
            self.generate_stream(request)
        } else {
            stream::once(self.generate(request)).boxed()
        }
    }

    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let prepared = self.prepare(request, false)?;
        debug!(model = %self.name, surface = ?prepared.surface, "Calling Messages API");

        let message = self.client.create(&prepared.request).await?;
        let mut response = convert_response(&message).map_err(Error::Response)?;
        response.turn_complete = true;
        if prepared.strip_fences {
            strip_markdown_from_response(&mut response);
        }
        Ok(response)
    }

    pub fn generate_stream(&self, request: &LlmRequest) -> BoxStream<'static, Result<LlmResponse>> {
        let prepared = self.prepare(request, true);
        let client = Arc::clone(&self.client);
        let name = self.name.clone();

        try_stream! {
            let prepared = prepared?;
            debug!(model = %name, surface = ?prepared.surface, "Streaming from Messages API");

            let events = client.stream(&prepared.request).await?;
            let mut responses = Box::pin(accumulate(events));
            while let Some(response) = responses.next().await {
                let mut response = response?;
                if response.turn_complete && prepared.strip_fences {
                    strip_markdown_from_response(&mut response);
                }
                yield response;
            }
        }
        .boxed()
    }

    fn prepare(&self, request: &LlmRequest, stream: bool) -> Result<PreparedRequest> {
        let contents = ensure_user_turn(&request.contents);
        let options = RequestOptions {
            model: self.name.clone(),
            default_max_tokens: self.default_max_tokens,
            variant: self.variant,
        };
        let mut prepared =
            build_request(&contents, request.config.as_ref(), &options).map_err(Error::Request)?;
        prepared.request.stream = stream;
        Ok(prepared)
    }
}

/// The conversation must end on a user turn. Returns the input untouched when
/// it already does, otherwise an owned copy with a user turn appended.
pub fn ensure_user_turn(contents: &[Content]) -> Cow<'_, [Content]> {
    match contents.last() {
        None => Cow::Owned(vec![Content::from_text(EMPTY_CONVERSATION_PROMPT, ROLE_USER)]),
        Some(last) if !last.role.eq_ignore_ascii_case(ROLE_USER) => {
            let mut owned = contents.to_vec();
            owned.push(Content::from_text(CONTINUE_PROMPT, ROLE_USER));
            Cow::Owned(owned)
        }
        Some(_) => Cow::Borrowed(contents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_TOKENS;
    use crate::format::anthropic::{
        ApiSurface, ContentBlock, ContentDelta, ErrorData, Role, STRUCTURED_OUTPUTS_BETA,
        StopReason, SystemPrompt,
    };
    use crate::format::genai::{GenerationConfig, ROLE_MODEL, Schema, Type};
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    #[derive(Default)]
    struct ScriptedClient {
        reply: Vec<ContentBlock>,
        events: Vec<StreamEvent>,
        sent: Mutex<Vec<MessagesRequest>>,
    }

    impl ScriptedClient {
        fn replying(text: &str) -> Self {
            Self {
                reply: vec![ContentBlock::text(text)],
                ..Self::default()
            }
        }

        fn streaming(events: Vec<StreamEvent>) -> Self {
            Self {
                events,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MessagesApi for ScriptedClient {
        async fn create(
            &self,
            request: &MessagesRequest,
        ) -> std::result::Result<MessagesResponse, ApiError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(MessagesResponse {
                id: "msg_01".to_string(),
                model: request.model.clone(),
                content: self.reply.clone(),
                stop_reason: Some(StopReason::EndTurn),
                ..MessagesResponse::default()
            })
        }

        async fn stream(
            &self,
            request: &MessagesRequest,
        ) -> std::result::Result<EventStream, ApiError> {
            self.sent.lock().unwrap().push(request.clone());
            let events: Vec<_> = self.events.iter().cloned().map(Ok).collect();
            Ok(stream::iter(events).boxed())
        }
    }

    fn create_test_model(client: ScriptedClient, variant: Variant) -> AnthropicModel<ScriptedClient> {
        let config = ResolvedConfig {
            variant,
            ..ResolvedConfig::default()
        };
        AnthropicModel::new(client, "claude-sonnet-4-5", &config)
    }

    fn create_test_request(text: &str) -> LlmRequest {
        LlmRequest {
            contents: vec![Content::from_text(text, ROLE_USER)],
            ..LlmRequest::default()
        }
    }

    fn text_delta(text: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::Text {
                text: text.to_string(),
            },
        }
    }

    fn schema_config() -> GenerationConfig {
        GenerationConfig {
            response_schema: Some(Schema::of_type(Type::Object)),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_ensure_user_turn() {
        match ensure_user_turn(&[]) {
            Cow::Owned(contents) => {
                assert_eq!(contents.len(), 1);
                assert_eq!(contents[0], Content::from_text(EMPTY_CONVERSATION_PROMPT, ROLE_USER));
            }
            Cow::Borrowed(_) => panic!("Expected an owned conversation"),
        }

        let ends_with_model = vec![
            Content::from_text("hi", ROLE_USER),
            Content::from_text("hello", ROLE_MODEL),
        ];
        let guarded = ensure_user_turn(&ends_with_model);
        assert_eq!(guarded.len(), 3);
        assert_eq!(guarded[2], Content::from_text(CONTINUE_PROMPT, ROLE_USER));
        assert_eq!(ends_with_model.len(), 2);

        let ends_with_user = vec![Content::from_text("hi", ROLE_USER)];
        assert!(matches!(ensure_user_turn(&ends_with_user), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn test_generate_simple() {
        let model = create_test_model(ScriptedClient::replying("Hello"), Variant::AnthropicApi);
        assert_eq!(model.name(), "claude-sonnet-4-5");

        let response = model.generate(&create_test_request("hi")).await.unwrap();
        assert_eq!(response.text(), "Hello");
        assert!(response.turn_complete);
        assert!(!response.partial);

        let sent = model.client.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "claude-sonnet-4-5");
        assert_eq!(sent[0].max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!sent[0].stream);
        assert_eq!(sent[0].messages.len(), 1);
        assert_eq!(sent[0].messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_generate_reports_conversion_phase() {
        let model = create_test_model(ScriptedClient::replying("x"), Variant::AnthropicApi);
        let request = LlmRequest {
            contents: vec![Content::from_text("hi", "narrator")],
            ..LlmRequest::default()
        };
        match model.generate(&request).await {
            Err(err @ Error::Request(_)) => {
                assert!(err.to_string().starts_with("failed to convert request"));
                assert!(err.to_string().contains("narrator"));
            }
            other => panic!("Expected Request error, got {other:?}"),
        }
        assert!(model.client.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_native_structured_output() {
        let model = create_test_model(
            ScriptedClient::replying("```json\n{\"k\":\"v\"}\n```"),
            Variant::AnthropicApi,
        );
        let request = LlmRequest {
            config: Some(schema_config()),
            ..create_test_request("give me json")
        };

        let response = model.generate(&request).await.unwrap();
        // Native surface output is passed through untouched.
        assert_eq!(response.text(), "```json\n{\"k\":\"v\"}\n```");

        let sent = model.client.sent.lock().unwrap();
        assert_eq!(sent[0].surface(), ApiSurface::StructuredOutput);
        assert_eq!(sent[0].betas, vec![STRUCTURED_OUTPUTS_BETA.to_string()]);
    }

    #[tokio::test]
    async fn test_generate_prompt_fallback_strips_fences() {
        let model = create_test_model(
            ScriptedClient::replying("```json\n{\"k\":\"v\"}\n```"),
            Variant::VertexAi,
        );
        let request = LlmRequest {
            config: Some(schema_config()),
            ..create_test_request("give me json")
        };

        let response = model.generate(&request).await.unwrap();
        assert_eq!(response.text(), r#"{"k":"v"}"#);

        let sent = model.client.sent.lock().unwrap();
        assert!(sent[0].output_format.is_none());
        match &sent[0].system {
            Some(SystemPrompt::Blocks(blocks)) => match &blocks[0] {
                ContentBlock::Text { text } => {
                    assert!(text.contains("Respond ONLY with the JSON object"))
                }
                other => panic!("Expected Text block, got {other:?}"),
            },
            other => panic!("Expected system blocks, got {other:?}"),
        }
        assert!(request.config.as_ref().unwrap().system_instruction.is_none());
    }

    #[tokio::test]
    async fn test_generate_content_streams_partials() {
        let client = ScriptedClient::streaming(vec![
            text_delta("He"),
            text_delta("llo"),
            StreamEvent::MessageStop,
        ]);
        let model = create_test_model(client, Variant::AnthropicApi);
        let request = create_test_request("hi");

        let emissions: Vec<_> = model.generate_content(&request, true).collect().await;
        let emissions: Vec<LlmResponse> = emissions.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(emissions.len(), 3);
        assert_eq!(emissions[0].text(), "He");
        assert_eq!(emissions[1].text(), "llo");
        assert!(emissions[2].turn_complete);
        assert_eq!(emissions[2].text(), "Hello");
        assert!(model.client.sent.lock().unwrap()[0].stream);
    }

    #[tokio::test]
    async fn test_generate_content_single_emission() {
        let model = create_test_model(ScriptedClient::replying("Hello"), Variant::AnthropicApi);
        let request = create_test_request("hi");

        let emissions: Vec<_> = model.generate_content(&request, false).collect().await;
        assert_eq!(emissions.len(), 1);
        assert!(emissions[0].as_ref().unwrap().turn_complete);
    }

    #[tokio::test]
    async fn test_stream_fallback_strips_final_only() {
        let client = ScriptedClient::streaming(vec![
            text_delta("```json\n"),
            text_delta("{\"k\":\"v\"}\n```"),
            StreamEvent::MessageStop,
        ]);
        let model = create_test_model(client, Variant::VertexAi);
        let request = LlmRequest {
            config: Some(schema_config()),
            ..create_test_request("json please")
        };

        let emissions: Vec<_> = model.generate_stream(&request).collect().await;
        let last = emissions.last().unwrap().as_ref().unwrap();
        assert!(last.turn_complete);
        assert_eq!(last.text(), r#"{"k":"v"}"#);
        assert_eq!(emissions[0].as_ref().unwrap().text(), "```json\n");
    }

    #[tokio::test]
    async fn test_stream_error_event_surfaces() {
        let client = ScriptedClient::streaming(vec![
            text_delta("He"),
            StreamEvent::Error {
                error: ErrorData {
                    error_type: "overloaded_error".to_string(),
                    message: "Overloaded".to_string(),
                },
            },
            text_delta("llo"),
        ]);
        let model = create_test_model(client, Variant::AnthropicApi);
        let request = create_test_request("hi");

        let emissions: Vec<_> = model.generate_stream(&request).collect().await;
        assert_eq!(emissions.len(), 2);
        assert!(matches!(emissions[1], Err(Error::Stream(ApiError::Overloaded))));
    }
}
