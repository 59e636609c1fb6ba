//! Error types for the duplex workspace

use thiserror::Error;

/// Result type alias using the workspace error.
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregate error type. Leaf crates define their own error enums and
/// provide `From` conversions into the matching variant here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("speech-to-text error: {0}")]
    Stt(String),

    #[error("text-to-speech error: {0}")]
    Tts(String),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
