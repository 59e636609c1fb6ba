//! Core types for the duplex voice-agent orchestrator
//!
//! This crate provides the conversation data model shared by every other
//! crate in the workspace:
//! - Turns, tool calls, and turn stages
//! - Interruptions and their classifications
//! - Audio encoding info
//! - Error types

pub mod encoding;
pub mod error;
pub mod interruption;
pub mod tool;
pub mod turn;

pub use encoding::EncodingInfo;
pub use error::{Error, Result};
pub use interruption::{Interruption, InterruptionKind};
pub use tool::{ParameterSpec, ToolDescriptor};
pub use turn::{ToolCall, Turn, TurnRole, TurnStage};
