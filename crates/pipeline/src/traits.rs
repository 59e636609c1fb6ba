//! Collaborator interfaces
//!
//! The orchestrator drives four external collaborators: a speech-to-text
//! streamer, a text-to-speech streamer, an audio output device, and an audio
//! input device. These traits are the contracts it requires of them; the
//! wire protocols behind them are the providers' business.

use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::EncodingInfo;

use crate::OrchestratorError;

/// Callback carrying a chunk of raw audio bytes.
pub type AudioCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback carrying a transcript string.
pub type TranscriptCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback carrying no payload.
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// One-shot acknowledgement that a named mark passed the playback head.
pub type MarkCallback = Box<dyn FnOnce(&str) + Send>;

/// Options for [`SpeechToText::transcribe`]: the callbacks to install and
/// the audio format the input device produces.
#[derive(Clone, Default)]
pub struct TranscribeOptions {
    pub encoding: Option<EncodingInfo>,
    pub on_speech_started: Option<EventCallback>,
    pub on_speech_ended: Option<EventCallback>,
    pub on_interim_transcript: Option<TranscriptCallback>,
    pub on_final_transcript: Option<TranscriptCallback>,
}

impl TranscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding_info(mut self, encoding: EncodingInfo) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_speech_started_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_speech_started = Some(Arc::new(callback));
        self
    }

    pub fn with_speech_ended_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_speech_ended = Some(Arc::new(callback));
        self
    }

    pub fn with_interim_transcript_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_interim_transcript = Some(Arc::new(callback));
        self
    }

    pub fn with_final_transcript_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_final_transcript = Some(Arc::new(callback));
        self
    }
}

/// Streaming speech-to-text collaborator.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Install callbacks and start the transcription stream.
    async fn transcribe(&self, options: TranscribeOptions) -> Result<(), OrchestratorError>;

    /// Push a chunk of captured audio.
    async fn send_audio(&self, audio: &[u8]) -> Result<(), OrchestratorError>;

    /// Tear down the stream.
    async fn close(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

/// Options for [`TextToSpeech::open_stream`]: synthesis output callbacks and
/// the audio format the output device consumes.
#[derive(Clone, Default)]
pub struct SpeechStreamOptions {
    pub encoding: Option<EncodingInfo>,
    pub on_audio: Option<AudioCallback>,
    /// Fired when the provider finishes a synthesis run, carrying the
    /// transcript of what was spoken.
    pub on_audio_ended: Option<TranscriptCallback>,
}

impl SpeechStreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding_info(mut self, encoding: EncodingInfo) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_audio_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.on_audio = Some(Arc::new(callback));
        self
    }

    pub fn with_audio_ended_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_audio_ended = Some(Arc::new(callback));
        self
    }
}

/// Streaming text-to-speech collaborator.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Install callbacks and open the synthesis stream.
    async fn open_stream(&self, options: SpeechStreamOptions) -> Result<(), OrchestratorError>;

    /// Queue text for synthesis.
    async fn send_text(&self, text: &str) -> Result<(), OrchestratorError>;

    /// Force synthesis of any buffered text.
    async fn flush_buffer(&self) -> Result<(), OrchestratorError>;

    /// Drop buffered, not-yet-synthesized text.
    async fn clear_buffer(&self) -> Result<(), OrchestratorError>;

    /// Tear down the stream.
    async fn close(&self) -> Result<(), OrchestratorError>;
}

/// Audio playback device.
pub trait AudioOutput: Send + Sync {
    /// The format this device consumes; flowed into TTS so the provider
    /// emits compatible audio.
    fn encoding_info(&self) -> EncodingInfo;

    /// Append audio to the device's residual ring.
    fn send_audio(&self, audio: &[u8]);

    /// Drop all residual audio immediately.
    fn clear_buffer(&self);
}

/// Playback device with named-position acknowledgements: the callback fires
/// once the named position passes the playback head.
pub trait MarkingAudioOutput: AudioOutput {
    fn mark(&self, name: &str, on_played: MarkCallback);
}

/// Legacy playback device: acknowledgement means blocking until the residual
/// buffer drains.
#[async_trait]
pub trait DrainingAudioOutput: AudioOutput {
    async fn await_mark(&self);
}

/// The configured playback device, modern or legacy.
#[derive(Clone)]
pub enum AudioOutputHandle {
    Marking(Arc<dyn MarkingAudioOutput>),
    Draining(Arc<dyn DrainingAudioOutput>),
}

impl AudioOutputHandle {
    pub fn encoding_info(&self) -> EncodingInfo {
        match self {
            AudioOutputHandle::Marking(output) => output.encoding_info(),
            AudioOutputHandle::Draining(output) => output.encoding_info(),
        }
    }

    pub fn send_audio(&self, audio: &[u8]) {
        match self {
            AudioOutputHandle::Marking(output) => output.send_audio(audio),
            AudioOutputHandle::Draining(output) => output.send_audio(audio),
        }
    }

    pub fn clear_buffer(&self) {
        match self {
            AudioOutputHandle::Marking(output) => output.clear_buffer(),
            AudioOutputHandle::Draining(output) => output.clear_buffer(),
        }
    }
}

/// Audio capture device.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// The format this device produces; flowed into STT.
    fn encoding_info(&self) -> EncodingInfo {
        EncodingInfo::default()
    }

    /// Capture unconditionally, invoking the callback per chunk. Runs until
    /// the device stops.
    async fn stream(&self, on_audio: AudioCallback) -> Result<(), OrchestratorError>;
}

/// Capture device with fine-grained start/stop control.
#[async_trait]
pub trait CaptureAudioInput: AudioInput {
    async fn start_capture(&self, on_audio: AudioCallback) -> Result<(), OrchestratorError>;

    async fn stop_capture(&self) -> Result<(), OrchestratorError>;
}

/// The configured capture device, basic or fine-grained.
#[derive(Clone)]
pub enum AudioInputHandle {
    Basic(Arc<dyn AudioInput>),
    Capture(Arc<dyn CaptureAudioInput>),
}

impl AudioInputHandle {
    pub fn encoding_info(&self) -> EncodingInfo {
        match self {
            AudioInputHandle::Basic(input) => input.encoding_info(),
            AudioInputHandle::Capture(input) => input.encoding_info(),
        }
    }
}
