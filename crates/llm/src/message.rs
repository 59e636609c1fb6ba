//! Request messages
//!
//! Providers speak in role-tagged messages; the orchestrator thinks in
//! turns. `messages_from_turns` bridges the two, expanding an assistant turn
//! that carries tool calls into the assistant message plus one tool message
//! per attached response.

use duplex_core::{ToolCall, Turn, TurnRole};
use serde::{Deserialize, Serialize};

/// Who a request message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a provider request or response sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool messages: the id of the call this responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Expand conversation turns into the provider message sequence.
pub fn messages_from_turns(turns: &[Turn]) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        match turn.role {
            TurnRole::User => messages.push(LlmMessage::user(turn.content.clone())),
            TurnRole::Assistant => {
                let mut message = LlmMessage::assistant(turn.content.clone());
                message.tool_calls = turn.tool_calls.clone();
                messages.push(message);
                for call in &turn.tool_calls {
                    if let Some(response) = &call.response {
                        messages.push(LlmMessage::tool(call.id.clone(), response.clone()));
                    }
                }
            }
        }
    }
    messages
}
