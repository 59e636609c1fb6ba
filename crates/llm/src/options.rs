//! Prompt options
//!
//! Options accepted by every prompting mode: system instructions, prior
//! turns, the tool catalogue, forced tool selection, and a per-chunk content
//! callback for providers that stream internally.

use std::sync::Arc;

use duplex_core::{ToolDescriptor, Turn};
use duplex_tools::Tool;

/// Callback invoked with each content delta as the provider produces it.
pub type ContentCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct PromptOptions {
    pub system_prompt: Option<String>,
    /// Prior conversation turns, earliest first.
    pub history: Vec<Turn>,
    /// Executable tools. Streaming hosts execute these themselves; legacy
    /// providers run the tool loop internally.
    pub tools: Vec<Arc<dyn Tool>>,
    /// Require the provider to answer with a tool call.
    pub forced_tools: bool,
    pub on_content: Option<ContentCallback>,
}

impl PromptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_forced_tools(mut self) -> Self {
        self.forced_tools = true;
        self
    }

    pub fn with_content_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_content = Some(Arc::new(callback));
        self
    }

    /// The wire-facing tool catalogue.
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    /// Invoke the content callback, if one is installed.
    pub fn emit_content(&self, text: &str) {
        if let Some(callback) = &self.on_content {
            callback(text);
        }
    }
}

impl std::fmt::Debug for PromptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptOptions")
            .field("system_prompt", &self.system_prompt)
            .field("history", &self.history.len())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("forced_tools", &self.forced_tools)
            .field("on_content", &self.on_content.is_some())
            .finish()
    }
}
