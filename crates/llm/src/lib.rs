//! LLM interfaces for the duplex voice-agent orchestrator
//!
//! Providers are external collaborators; this crate defines the capability
//! contracts the core requires of them:
//! - `TextLanguageModel` — single request, provider-side tool loop
//! - `StreamingLanguageModel` — typed chunk stream, host-side tool loop
//! - `StructuredLanguageModel` — schema-constrained JSON output

pub mod chunk;
pub mod message;
pub mod options;

pub use chunk::{CompletionTokensDetails, LlmChunk, Usage};
pub use message::{messages_from_turns, LlmMessage, MessageRole};
pub use options::PromptOptions;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// LLM errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed stream chunk: {0}")]
    MalformedChunk(String),

    #[error("structured output error: {0}")]
    Structured(String),

    #[error("no response from LLM")]
    NoResponse,

    #[error("unsupported capability: {0}")]
    UnsupportedCapability(&'static str),
}

impl From<LlmError> for duplex_core::Error {
    fn from(err: LlmError) -> Self {
        duplex_core::Error::Llm(err.to_string())
    }
}

/// What a configured LLM can do. Discovered at construction and used to pick
/// the driver mode and classifier strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub streaming: bool,
    pub tool_calls: bool,
    pub structured_output: bool,
}

/// Stream of typed chunks from a streaming provider.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmChunk, LlmError>> + Send>>;

/// Base trait every LLM collaborator implements.
pub trait LanguageModel: Send + Sync {
    fn capabilities(&self) -> Capabilities;
}

/// Non-streaming (legacy) prompting.
///
/// The provider performs the tool-call loop internally, invoking the
/// executable tools carried in the options, and returns the full message
/// sequence it produced. Content chunks are surfaced through the options'
/// content callback as they arrive.
#[async_trait]
pub trait TextLanguageModel: LanguageModel {
    async fn prompt(&self, prompt: &str, options: PromptOptions) -> Result<Vec<LlmMessage>, LlmError>;
}

/// Streaming prompting.
///
/// One request per call; the host consumes the chunk stream and owns the
/// tool-call loop. `prompt` is `None` on follow-up rounds where the history
/// already ends with tool responses.
#[async_trait]
pub trait StreamingLanguageModel: LanguageModel {
    async fn prompt_with_stream(
        &self,
        prompt: Option<&str>,
        options: PromptOptions,
    ) -> Result<LlmStream, LlmError>;
}

/// Schema-constrained prompting.
///
/// Returns a JSON value conforming to the supplied schema. A value is
/// returned rather than a populated instance so the trait stays
/// object-safe; callers deserialize with `serde_json::from_value`.
#[async_trait]
pub trait StructuredLanguageModel: LanguageModel {
    async fn prompt_with_structure(
        &self,
        prompt: &str,
        schema: serde_json::Value,
        options: PromptOptions,
    ) -> Result<serde_json::Value, LlmError>;
}
