//! Audio encoding info
//!
//! Flowed from the audio-output device into TTS and from the audio-input
//! device into STT so providers emit compatible formats.

use serde::{Deserialize, Serialize};

/// Sample format a device produces or consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Encoding name, e.g. "linear16".
    pub encoding: String,
}

impl EncodingInfo {
    pub fn new(sample_rate: u32, encoding: impl Into<String>) -> Self {
        Self {
            sample_rate,
            encoding: encoding.into(),
        }
    }
}

impl Default for EncodingInfo {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            encoding: "linear16".to_string(),
        }
    }
}
