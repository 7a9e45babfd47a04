use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::format::anthropic::ErrorData;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to convert request: {0}")]
    Request(ConvertError),

    #[error("failed to convert response: {0}")]
    Response(ConvertError),

    #[error("failed to call model: {0}")]
    Api(#[from] ApiError),

    #[error("stream error: {0}")]
    Stream(ApiError),

    #[error("failed to accumulate message: {0}")]
    Accumulate(#[from] StreamError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns a user-friendly suggestion for how to resolve this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Api(api) | Error::Stream(api) => api.suggestion(),
            Error::Config(ConfigError::MissingValue { .. }) => {
                Some("Set the field in the config file or export the named environment variable")
            }
            Error::Request(ConvertError::TooManyAllowedFunctions(_)) => {
                Some("Restrict tool choice to a single function name or drop the restriction")
            }
            Error::Request(ConvertError::MissingToolResultId { .. }) => {
                Some("Copy the tool call ID into the matching function response")
            }
            _ => None,
        }
    }
}

/// Failures while mapping between the unified content model and the Messages API.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported role: {0}")]
    UnsupportedRole(String),

    #[error("unsupported image media type: {0}")]
    UnsupportedImageType(String),

    #[error("unsupported MIME type for {origin}: {mime_type}")]
    UnsupportedMimeType {
        origin: &'static str,
        mime_type: String,
    },

    #[error("{0} parts are not supported by the Messages API")]
    UnsupportedPart(&'static str),

    #[error("{0} tools are not supported by the Messages API")]
    UnsupportedTool(&'static str),

    #[error("function response ID is required for tool call correlation (function: {name})")]
    MissingToolResultId { name: String },

    #[error("failed to marshal function response for {name}: {source}")]
    ToolResultSerialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "multiple allowed function names are not supported (got {0}); use a single function name or remove the restriction"
    )]
    TooManyAllowedFunctions(usize),

    #[error("invalid thinking signature: {0}")]
    InvalidThinkingSignature(#[from] base64::DecodeError),

    #[error("tool_use input for {name} is not a JSON object")]
    InvalidToolInput { name: String },
}

/// Failures while folding stream events into a message.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event received after the stream was closed")]
    Closed,

    #[error("content block {0} was never started")]
    UnknownBlockIndex(usize),

    #[error("content block {index} started out of order (expected {expected})")]
    UnexpectedBlockIndex { index: usize, expected: usize },

    #[error("{delta} delta does not match content block {index}")]
    MismatchedDelta { index: usize, delta: &'static str },

    #[error("invalid tool input JSON in content block {index}: {source}")]
    InvalidToolInput {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors reported by the transport that talks to the provider.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("rate limited - retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model overloaded - try again later")]
    Overloaded,

    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("{error_type}: {message}")]
    Provider { error_type: String, message: String },

    #[error("invalid response payload: {0}")]
    InvalidResponse(String),

    #[error("http error: {0}")]
    Http(String),
}

impl ApiError {
    /// Classify an in-band `error` event from the Messages stream.
    pub fn from_error_data(error: &ErrorData) -> Self {
        match error.error_type.as_str() {
            "overloaded_error" => ApiError::Overloaded,
            "rate_limit_error" => ApiError::RateLimited { retry_after: None },
            "invalid_request_error" => ApiError::InvalidRequest {
                message: error.message.clone(),
            },
            "authentication_error" | "permission_error" => ApiError::Authentication {
                message: error.message.clone(),
            },
            _ => ApiError::Provider {
                error_type: error.error_type.clone(),
                message: error.message.clone(),
            },
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ApiError::Authentication { .. } => {
                Some("Check ANTHROPIC_API_KEY or your Google Cloud credentials")
            }
            ApiError::RateLimited { .. } => Some("Too many requests, slow down"),
            ApiError::Overloaded => Some("Model is overloaded, try again in a few minutes"),
            ApiError::Http(_) => Some("Check your internet connection and try again"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
