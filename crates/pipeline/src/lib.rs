//! Orchestration engine for the duplex voice agent
//!
//! This crate is the core of the system: the turn/state machine that accepts
//! interleaved transcripts and audio samples, manages concurrent producers
//! and consumers of text and audio buffers, classifies and responds to
//! mid-turn interruptions, dispatches tool calls embedded in LLM responses,
//! and guarantees ordered, cancellable, at-most-one-active-turn playback.
//!
//! The STT/TTS/LLM/audio collaborators themselves are external; this crate
//! defines the interfaces it requires of them (see [`traits`]) and wires
//! them together.

pub mod audio_buffer;
mod builtin;
mod driver;
pub mod interruption;
pub mod orchestrator;
pub mod text_buffer;
pub mod traits;
pub mod turns;

pub use audio_buffer::{AudioBuffer, AudioItem, AudioReader};
pub use driver::LlmClient;
pub use interruption::{
    ClassifierLlm, InterruptionClassifier, InterruptionHandler, LlmClassifier,
    LlmInterruptionHandler, OrchestratorControl, PassthroughClassifier,
};
pub use orchestrator::{OrchestrateOptions, Orchestrator, OrchestratorHandle, OrchestratorOptions};
pub use text_buffer::{TextBuffer, TextReader};
pub use traits::{
    AudioCallback, AudioInput, AudioInputHandle, AudioOutput, AudioOutputHandle,
    CaptureAudioInput, DrainingAudioOutput, EventCallback, MarkCallback, MarkingAudioOutput,
    SpeechStreamOptions, SpeechToText, TextToSpeech, TranscribeOptions, TranscriptCallback,
};
pub use turns::TurnsStore;

use duplex_llm::LlmError;
use duplex_tools::ToolError;
use thiserror::Error;

/// Orchestration errors.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("orchestrator already started")]
    AlreadyStarted,

    #[error("orchestrator is closed")]
    Closed,

    /// The prompt queue is at capacity. Non-fatal; the caller may retry.
    #[error("prompt queue full")]
    PromptQueueFull,

    #[error("unknown LLM type")]
    UnknownLlmType,

    #[error("interruption classifier error: {0}")]
    Classifier(String),

    #[error("speech-to-text error: {0}")]
    Stt(String),

    #[error("text-to-speech error: {0}")]
    Tts(String),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl From<OrchestratorError> for duplex_core::Error {
    fn from(err: OrchestratorError) -> Self {
        duplex_core::Error::Orchestrator(err.to_string())
    }
}
