//! LLM driver
//!
//! Consumes one assistant response per user prompt. In streaming mode the
//! driver owns the tool-call loop: it issues requests, drains the chunk
//! stream into the text buffer, executes tool calls in emission order, and
//! re-issues with the updated history until a round produces no tool calls.
//! In legacy mode the provider runs the loop internally and the driver just
//! picks the last assistant message.
//!
//! The driver is stateless across requests; all state lives on the turn and
//! in the text buffer.

use std::sync::Arc;

use duplex_core::{ToolCall, Turn, TurnStage};
use duplex_llm::{
    Capabilities, LlmChunk, MessageRole, PromptOptions, StreamingLanguageModel,
    TextLanguageModel,
};
use duplex_tools::ToolRegistry;
use futures::StreamExt;
use tracing::warn;

use crate::text_buffer::TextBuffer;
use crate::turns::TurnsStore;
use crate::OrchestratorError;

/// The configured LLM collaborator, one of the two prompting modes.
#[derive(Clone)]
pub enum LlmClient {
    Streaming(Arc<dyn StreamingLanguageModel>),
    Text(Arc<dyn TextLanguageModel>),
}

impl LlmClient {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            LlmClient::Streaming(llm) => llm.capabilities(),
            LlmClient::Text(llm) => llm.capabilities(),
        }
    }
}

/// Content callback invoked with every content delta the driver forwards.
pub(crate) type ContentCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// What the driver produced for one prompt.
#[derive(Debug, Clone, Default)]
pub(crate) struct TurnDraft {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Everything a driver run needs, cloned out of the orchestrator.
pub(crate) struct DriverContext {
    pub llm: LlmClient,
    pub tools: ToolRegistry,
    pub turns: Arc<TurnsStore>,
    pub text_buffer: TextBuffer,
    pub system_prompt: Option<String>,
    pub on_content: Option<ContentCallback>,
}

impl DriverContext {
    fn base_options(&self, history: &[Turn]) -> PromptOptions {
        let mut options = PromptOptions::new()
            .with_history(request_history(history))
            .with_tools(self.tools.tools().to_vec());
        if let Some(system_prompt) = &self.system_prompt {
            options = options.with_system_prompt(system_prompt.clone());
        }
        options
    }
}

/// History as presented to the provider: cancelled assistant turns are
/// dropped so the model never sees half-finished responses.
pub(crate) fn request_history(history: &[Turn]) -> Vec<Turn> {
    history.iter().filter(|turn| !turn.cancelled).cloned().collect()
}

/// The drive is over when the turn it was started for is cancelled, or is
/// already gone from the active slot (cancelled and finalized under us).
fn turn_abandoned(turns: &TurnsStore) -> bool {
    turns.active_turn().map_or(true, |turn| turn.cancelled)
}

/// Run the configured LLM for one prompt against the given history
/// snapshot. Returns `None` when the active turn was cancelled mid-drive.
pub(crate) async fn run(
    ctx: &DriverContext,
    prompt: &str,
    history: Vec<Turn>,
) -> Result<Option<TurnDraft>, OrchestratorError> {
    match ctx.llm.clone() {
        LlmClient::Streaming(llm) => run_streaming(ctx, llm, prompt, history).await,
        LlmClient::Text(llm) => run_text(ctx, llm, prompt, history).await,
    }
}

async fn run_streaming(
    ctx: &DriverContext,
    llm: Arc<dyn StreamingLanguageModel>,
    prompt: &str,
    mut history: Vec<Turn>,
) -> Result<Option<TurnDraft>, OrchestratorError> {
    let mut draft = TurnDraft::default();
    let mut first_round = true;

    loop {
        let options = ctx.base_options(&history);
        let mut stream = llm
            .prompt_with_stream(first_round.then_some(prompt), options)
            .await?;

        let mut round_calls: Vec<ToolCall> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(error = %err, "skipping malformed stream chunk");
                    continue;
                }
            };
            match chunk {
                LlmChunk::Content { text } => {
                    if turn_abandoned(&ctx.turns) {
                        return Ok(None);
                    }
                    ctx.turns.advance_active_stage(TurnStage::Speaking);
                    ctx.text_buffer.add_chunk(text.clone());
                    draft.content.push_str(&text);
                    if let Some(on_content) = &ctx.on_content {
                        on_content(&text);
                    }
                }
                LlmChunk::ToolCall(call) => round_calls.push(call),
                LlmChunk::Role { .. }
                | LlmChunk::Reasoning { .. }
                | LlmChunk::Usage(_)
                | LlmChunk::Finish { .. } => {}
            }
        }

        if round_calls.is_empty() {
            return Ok(Some(draft));
        }

        for call in &mut round_calls {
            match ctx.tools.invoke(call).await {
                Ok(outcome) => call.response = Some(outcome.response),
                Err(err) => warn!(tool = %call.name, error = %err, "tool call not dispatched"),
            }
        }

        // Fold this round into the request history: the user prompt (first
        // round only), then the assistant turn carrying the calls and their
        // responses. The next request goes out with no user prompt.
        if first_round {
            history.push(Turn::user(prompt));
            first_round = false;
        }
        let mut assistant = Turn::assistant();
        assistant.tool_calls = round_calls.clone();
        assistant.stage = TurnStage::Done;
        history.push(assistant);
        draft.tool_calls.extend(round_calls);
    }
}

async fn run_text(
    ctx: &DriverContext,
    llm: Arc<dyn TextLanguageModel>,
    prompt: &str,
    history: Vec<Turn>,
) -> Result<Option<TurnDraft>, OrchestratorError> {
    let options = ctx.base_options(&history).with_content_callback({
        let turns = ctx.turns.clone();
        let text_buffer = ctx.text_buffer.clone();
        let on_content = ctx.on_content.clone();
        move |text: &str| {
            if turn_abandoned(&turns) {
                return;
            }
            turns.advance_active_stage(TurnStage::Speaking);
            text_buffer.add_chunk(text);
            if let Some(on_content) = &on_content {
                on_content(text);
            }
        }
    });

    let messages = llm.prompt(prompt, options).await?;
    if turn_abandoned(&ctx.turns) {
        return Ok(None);
    }

    let draft = messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::Assistant)
        .map(|message| TurnDraft {
            content: message.content.clone(),
            tool_calls: message.tool_calls.clone(),
        })
        .unwrap_or_default();
    Ok(Some(draft))
}
