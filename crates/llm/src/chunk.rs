//! Streamed chunk types
//!
//! A streaming provider emits a sequence of typed chunks. The tagged union
//! keeps runtime dispatch to a single match site in the driver.

use duplex_core::ToolCall;

/// One chunk from a streaming LLM response.
#[derive(Debug, Clone)]
pub enum LlmChunk {
    /// Role announcement, usually the first chunk of a response.
    Role { role: String },
    /// Reasoning delta. Not part of the spoken response.
    Reasoning { text: String, channel: Option<String> },
    /// Content delta.
    Content { text: String },
    /// A complete tool call assembled by the provider.
    ToolCall(ToolCall),
    /// Token accounting, typically the last chunk.
    Usage(Usage),
    /// End of the response.
    Finish { reason: String },
}

impl LlmChunk {
    pub fn content(text: impl Into<String>) -> Self {
        LlmChunk::Content { text: text.into() }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        LlmChunk::Finish { reason: reason.into() }
    }
}

/// Token and latency accounting for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub queue_time: f64,
    pub prompt_tokens: u32,
    pub prompt_time: f64,
    pub completion_tokens: u32,
    pub completion_time: f64,
    pub total_tokens: u32,
    pub total_time: f64,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: u32,
}
