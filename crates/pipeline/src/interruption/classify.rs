//! Interruption classification
//!
//! A short LLM round-trip labels the interruption. When the classification
//! LLM supports structured output we request a `{"type": <enum>}` object;
//! otherwise we ask for `{"classification": <enum>}` in plain text and parse
//! it, stripping triple-backtick fences when present.

use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::{Interruption, InterruptionKind, ToolDescriptor, Turn};
use duplex_llm::{MessageRole, PromptOptions, StructuredLanguageModel, TextLanguageModel};
use serde::Deserialize;

use super::InterruptionClassifier;
use crate::OrchestratorError;

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that can classify a prompt type of interruption to the conversation.

A conversation interruption can be classified as one of the following:
- continuation: The interruption is a continuation of the previous sentence/request (e.g. "Tell me about Star Wars.", "Ships design").
- cancellation: Anything that indicates that the response should not be finished. Only used if the interruption cannot be addressed by a listed tool.
- clarification: The interruption is a clarification or restatement of the previous instruction (e.g. "It's actually about the TV show, not the movie").
- ignorable: The interruption is ignorable and should not be responded to.
- repetition: The interruption is a repetition of the previous sentence/request.
- noise: The interruption is noise and should be ignored.
- action: The interruption is a addressable with a listed tool.
- new prompt: The interruption is a new prompt to be responded to that could not be understood as a continuation of the previous sentence

Only respond with the classification of the interruption as JSON: {"classification": "response"}

Accessible tools:
"#;

const STRUCTURED_CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that can classify a prompt type of interruption to the conversation.

A conversation interruption can be classified as one of the following:
- continuation: The interruption is a continuation of the previous sentence/request (e.g. "Tell me about Star Wars.", "Ships design").
- cancellation: Anything that indicates that the response should not be finished. Only used if the interruption cannot be addressed by a listed tool.
- clarification: The interruption is a clarification or restatement of the previous instruction (e.g. "It's actually about the TV show, not the movie").
- ignorable: The interruption is ignorable and should not be responded to.
- repetition: The interruption is a repetition of the previous sentence/request.
- noise: The interruption is noise and should be ignored.
- action: The interruption is a addressable with a listed tool.
- new prompt: The interruption is a new prompt to be responded to that could not be understood as a continuation of the previous sentence

Accessible tools:
"#;

/// The classification LLM, by capability.
#[derive(Clone)]
pub enum ClassifierLlm {
    Structured(Arc<dyn StructuredLanguageModel>),
    General(Arc<dyn TextLanguageModel>),
}

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: ClassifierLlm,
}

impl LlmClassifier {
    pub fn new(llm: ClassifierLlm) -> Self {
        Self { llm }
    }

    pub fn structured(llm: Arc<dyn StructuredLanguageModel>) -> Self {
        Self::new(ClassifierLlm::Structured(llm))
    }

    pub fn general(llm: Arc<dyn TextLanguageModel>) -> Self {
        Self::new(ClassifierLlm::General(llm))
    }
}

#[async_trait]
impl InterruptionClassifier for LlmClassifier {
    async fn classify(
        &self,
        interruption: &Interruption,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<InterruptionKind, OrchestratorError> {
        match &self.llm {
            ClassifierLlm::Structured(llm) => {
                let options = PromptOptions::new()
                    .with_system_prompt(with_catalogue(STRUCTURED_CLASSIFIER_SYSTEM_PROMPT, tools))
                    .with_history(history.to_vec());
                let value = llm
                    .prompt_with_structure(&interruption.source, classification_schema(), options)
                    .await
                    .map_err(|err| OrchestratorError::Classifier(err.to_string()))?;
                let label = value
                    .get("type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        OrchestratorError::Classifier("classification is missing the type field".to_string())
                    })?;
                parse_label(label)
            }
            ClassifierLlm::General(llm) => {
                let options = PromptOptions::new()
                    .with_system_prompt(with_catalogue(CLASSIFIER_SYSTEM_PROMPT, tools))
                    .with_history(history.to_vec());
                let messages = llm
                    .prompt(&interruption.source, options)
                    .await
                    .map_err(|err| OrchestratorError::Classifier(err.to_string()))?;
                let content = messages
                    .iter()
                    .rev()
                    .find(|message| message.role == MessageRole::Assistant)
                    .map(|message| message.content.clone())
                    .unwrap_or_default();
                if content.is_empty() {
                    return Err(OrchestratorError::Classifier(
                        "no response from interruption classifier".to_string(),
                    ));
                }

                #[derive(Deserialize)]
                struct Payload {
                    classification: String,
                }

                let payload: Payload = serde_json::from_str(strip_code_fences(&content))
                    .map_err(|err| OrchestratorError::Classifier(err.to_string()))?;
                parse_label(&payload.classification)
            }
        }
    }
}

/// Classifier used when no classification LLM is configured: every
/// interruption passes through as a new prompt.
pub struct PassthroughClassifier;

#[async_trait]
impl InterruptionClassifier for PassthroughClassifier {
    async fn classify(
        &self,
        _interruption: &Interruption,
        _history: &[Turn],
        _tools: &[ToolDescriptor],
    ) -> Result<InterruptionKind, OrchestratorError> {
        Ok(InterruptionKind::NewPrompt)
    }
}

fn with_catalogue(system_prompt: &str, tools: &[ToolDescriptor]) -> String {
    let mut prompt = system_prompt.to_string();
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt
}

fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "title": "Type",
                "description": "The type of interruption",
                "enum": [
                    "continuation",
                    "clarification",
                    "cancellation",
                    "ignorable",
                    "repetition",
                    "noise",
                    "action",
                    "new prompt"
                ]
            }
        },
        "required": ["type"]
    })
}

fn parse_label(label: &str) -> Result<InterruptionKind, OrchestratorError> {
    InterruptionKind::from_label(label)
        .ok_or_else(|| OrchestratorError::Classifier(format!("unknown interruption type: {label}")))
}

/// Strip a surrounding triple-backtick fence (with optional `json` tag).
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
