//! Tool trait and typed closure tools

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use duplex_core::{ParameterSpec, ToolDescriptor};
use serde::de::DeserializeOwned;

use crate::ToolError;

/// Outcome of a tool invocation.
///
/// A failed invocation still carries a response string, so the model sees a
/// failure message rather than silence.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub response: String,
    pub error: Option<ToolError>,
}

impl ToolOutcome {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            error: None,
        }
    }

    pub fn failed(response: impl Into<String>, error: ToolError) -> Self {
        Self {
            response: response.into(),
            error: Some(error),
        }
    }
}

/// A named callable with a JSON-argument interface.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// The wire-facing description presented to the LLM.
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute with the raw JSON argument string the LLM emitted.
    async fn execute(&self, arguments: &str) -> ToolOutcome;
}

/// A tool backed by a closure taking typed, deserialized parameters.
///
/// Arguments that fail to parse produce the literal response
/// "Invalid parameters format" together with an error, so the failure is
/// visible to the model on the next round.
pub struct FnTool<T, F> {
    name: String,
    description: String,
    parameters: BTreeMap<String, ParameterSpec>,
    execute: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> FnTool<T, F>
where
    T: DeserializeOwned + Send + Sync,
    F: Fn(T) -> Result<String, ToolError> + Send + Sync,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: BTreeMap<String, ParameterSpec>,
        execute: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            execute,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Tool for FnTool<T, F>
where
    T: DeserializeOwned + Send + Sync,
    F: Fn(T) -> Result<String, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    async fn execute(&self, arguments: &str) -> ToolOutcome {
        let parameters: T = match serde_json::from_str(arguments) {
            Ok(parameters) => parameters,
            Err(err) => {
                return ToolOutcome::failed(
                    "Invalid parameters format",
                    ToolError::InvalidArguments(err.to_string()),
                );
            }
        };
        match (self.execute)(parameters) {
            Ok(response) => ToolOutcome::ok(response),
            Err(err) => ToolOutcome::failed(err.to_string(), err),
        }
    }
}
