//! Conversion between genai-style unified content and the Anthropic Messages API.
//!
//! The [`format`] module holds the wire types and pure conversions,
//! [`stream`] folds streamed events into responses, and [`model`] ties both
//! to a [`model::MessagesApi`] transport.

pub mod config;
pub mod error;
pub mod format;
pub mod model;
pub mod stream;

pub use config::{ModelConfig, ResolvedConfig, Variant};
pub use error::{ApiError, ConvertError, Error, Result, StreamError};
pub use model::{AnthropicModel, MessagesApi};
pub use stream::{StreamAccumulator, accumulate};
