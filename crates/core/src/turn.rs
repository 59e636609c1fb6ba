//! Conversation turns
//!
//! A turn is a single utterance from one role, together with the tool calls
//! the assistant issued while producing it and the interruptions that arrived
//! while it was in flight.

use serde::{Deserialize, Serialize};

use crate::interruption::Interruption;

/// Who a turn is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Stage of an in-flight assistant turn.
///
/// Stages advance monotonically (`Preparing` → `GeneratingResponse` →
/// `Speaking` → `Done`); cancellation may jump straight to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnStage {
    Preparing,
    GeneratingResponse,
    Speaking,
    Done,
}

impl TurnStage {
    /// Whether a transition from `self` to `next` keeps the stage monotonic.
    pub fn can_advance_to(self, next: TurnStage) -> bool {
        next >= self
    }
}

/// A structured instruction from the LLM to invoke a named host-side
/// function, plus the response that was fed back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool response message.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON string, exactly as the LLM emitted them.
    pub arguments: String,
    /// Result text attached after execution. `None` until the call has been
    /// dispatched (or when the named tool was unknown).
    pub response: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            response: None,
        }
    }
}

/// A single interaction step in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    /// The prompt for user turns, the response for assistant turns.
    pub content: String,
    /// Tool calls issued while producing this turn, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub stage: TurnStage,
    pub cancelled: bool,
    /// Interruptions that arrived while this turn was the active turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interruptions: Vec<Interruption>,
}

impl Turn {
    /// A completed user turn carrying a prompt.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            stage: TurnStage::Done,
            cancelled: false,
            interruptions: Vec::new(),
        }
    }

    /// A fresh assistant turn about to be generated.
    pub fn assistant() -> Self {
        Self {
            role: TurnRole::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            stage: TurnStage::Preparing,
            cancelled: false,
            interruptions: Vec::new(),
        }
    }

    /// Advance the stage, ignoring regressions. Returns whether the stage
    /// actually changed.
    pub fn advance_stage(&mut self, next: TurnStage) -> bool {
        if self.stage != next && self.stage.can_advance_to(next) {
            self.stage = next;
            true
        } else {
            false
        }
    }

    /// Whether every tool call on this turn has a response attached.
    pub fn tool_calls_resolved(&self) -> bool {
        self.tool_calls.iter().all(|call| call.response.is_some())
    }
}
