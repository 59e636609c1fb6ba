//! Interruption handling
//!
//! A prompt that arrives while an assistant turn is in flight is not just a
//! new prompt: it may be a correction, a continuation, a cancellation, or
//! noise. The handler classifies it with a short LLM round-trip and turns
//! the classification into control actions on the orchestrator.
//!
//! The orchestrator, the handler, and the tools that mutate the orchestrator
//! reference each other; [`OrchestratorControl`] breaks the cycle. Handlers
//! and tool constructors take the interface, never the concrete type.

mod classify;
mod respond;

pub use classify::{ClassifierLlm, LlmClassifier, PassthroughClassifier};

use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::{Interruption, InterruptionKind, ToolDescriptor, Turn};
use tracing::warn;

use crate::turns::TurnsStore;
use crate::OrchestratorError;

/// Control surface the interruption responder and orchestration tools are
/// given. Implemented by the orchestrator's handle.
#[async_trait]
pub trait OrchestratorControl: Send + Sync {
    /// The live turns store.
    fn turns(&self) -> Arc<TurnsStore>;

    /// Enqueue a prompt without interruption handling.
    fn queue_prompt(&self, prompt: &str) -> Result<(), OrchestratorError>;

    /// Cancel the active turn: flag it, clear device playback, release the
    /// audio buffer.
    fn cancel_turn(&self);

    /// Dispatch a prompt to the LLM with forced tool selection, discarding
    /// any natural-language response.
    async fn call_tool_with_prompt(&self, prompt: &str) -> Result<(), OrchestratorError>;

    fn set_speaking(&self, speaking: bool);

    fn set_always_recording(&self, always_recording: bool);

    fn is_speaking(&self) -> bool;

    fn is_always_recording(&self) -> bool;
}

/// Classifies a mid-turn interruption into one of the response categories.
#[async_trait]
pub trait InterruptionClassifier: Send + Sync {
    async fn classify(
        &self,
        interruption: &Interruption,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<InterruptionKind, OrchestratorError>;
}

/// Transforms a mid-turn prompt into control actions. Returns the
/// classification that was acted on, so the caller can resolve the
/// interruption record.
#[async_trait]
pub trait InterruptionHandler: Send + Sync {
    async fn handle(
        &self,
        interruption: &Interruption,
        history: Vec<Turn>,
        tools: Vec<ToolDescriptor>,
        control: &dyn OrchestratorControl,
    ) -> Result<InterruptionKind, OrchestratorError>;
}

/// Default handler: classify, then respond per category. A classifier
/// failure or unknown label falls back to passthrough — the prompt is
/// enqueued as a fresh user prompt rather than dropped.
pub struct LlmInterruptionHandler {
    classifier: Arc<dyn InterruptionClassifier>,
}

impl LlmInterruptionHandler {
    pub fn new(classifier: Arc<dyn InterruptionClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl InterruptionHandler for LlmInterruptionHandler {
    async fn handle(
        &self,
        interruption: &Interruption,
        history: Vec<Turn>,
        tools: Vec<ToolDescriptor>,
        control: &dyn OrchestratorControl,
    ) -> Result<InterruptionKind, OrchestratorError> {
        let kind = match self.classifier.classify(interruption, &history, &tools).await {
            Ok(kind) => kind,
            Err(err) => {
                warn!(error = %err, "interruption classification failed; passing prompt through");
                InterruptionKind::NewPrompt
            }
        };
        respond::respond(kind, &interruption.source, control).await?;
        Ok(kind)
    }
}
