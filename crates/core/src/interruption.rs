//! Interruptions
//!
//! A user transcript that arrives while an assistant turn is in flight is
//! recorded as an interruption on that turn, classified, and resolved.

use serde::{Deserialize, Serialize};

/// Classification of a mid-turn interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptionKind {
    /// Continues the previous request; the last user turn is replayed with
    /// the interruption appended.
    Continuation,
    /// Restates or corrects the previous instruction.
    Clarification,
    /// The response should not be finished.
    Cancellation,
    Ignorable,
    Repetition,
    Noise,
    /// Addressable with a listed tool.
    Action,
    /// A fresh prompt handled after the current turn.
    NewPrompt,
}

impl InterruptionKind {
    /// The classifier label for this kind, as the classification LLM emits it.
    pub fn label(self) -> &'static str {
        match self {
            InterruptionKind::Continuation => "continuation",
            InterruptionKind::Clarification => "clarification",
            InterruptionKind::Cancellation => "cancellation",
            InterruptionKind::Ignorable => "ignorable",
            InterruptionKind::Repetition => "repetition",
            InterruptionKind::Noise => "noise",
            InterruptionKind::Action => "action",
            InterruptionKind::NewPrompt => "new prompt",
        }
    }

    /// Parse a classifier label. Accepts both the spoken form ("new prompt")
    /// and the tag form ("new-prompt").
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "continuation" => Some(InterruptionKind::Continuation),
            "clarification" => Some(InterruptionKind::Clarification),
            "cancellation" => Some(InterruptionKind::Cancellation),
            "ignorable" => Some(InterruptionKind::Ignorable),
            "repetition" => Some(InterruptionKind::Repetition),
            "noise" => Some(InterruptionKind::Noise),
            "action" => Some(InterruptionKind::Action),
            "new prompt" | "new-prompt" => Some(InterruptionKind::NewPrompt),
            _ => None,
        }
    }
}

impl std::fmt::Display for InterruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A mid-turn user utterance recorded on the active turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interruption {
    /// Monotonic id (wall-clock nanoseconds at arrival).
    pub id: i64,
    /// The transcript that interrupted the turn.
    pub source: String,
    /// Classification, set once the classifier has run.
    pub kind: Option<InterruptionKind>,
    pub resolved: bool,
}

impl Interruption {
    /// Record a new, unclassified interruption. Ids are wall-clock
    /// nanoseconds, monotonic for practical purposes within a session.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            source: source.into(),
            kind: None,
            resolved: false,
        }
    }

    pub fn resolve(&mut self, kind: InterruptionKind) {
        self.kind = Some(kind);
        self.resolved = true;
    }
}
