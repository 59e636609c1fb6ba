//! Tools for the duplex voice-agent orchestrator
//!
//! A tool is a named host-side function the LLM can invoke with JSON
//! arguments. This crate provides the `Tool` trait, a typed closure-based
//! implementation, and the registry the orchestrator dispatches through.

pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolOutcome};

use thiserror::Error;

/// Tool execution errors.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<ToolError> for duplex_core::Error {
    fn from(err: ToolError) -> Self {
        duplex_core::Error::Tool(err.to_string())
    }
}
