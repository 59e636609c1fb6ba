//! Scripted mock collaborators for orchestrator integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use duplex_core::{EncodingInfo, Interruption, InterruptionKind, ToolDescriptor, Turn};
use duplex_llm::{
    Capabilities, LanguageModel, LlmChunk, LlmError, LlmStream, PromptOptions,
    StreamingLanguageModel,
};
use duplex_pipeline::{
    AudioOutput, DrainingAudioOutput, InterruptionClassifier, MarkCallback, MarkingAudioOutput,
    OrchestratorError, SpeechStreamOptions, SpeechToText, TextToSpeech, TranscribeOptions,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Streaming LLM that replays scripted rounds. Each `push_round` queues one
/// response stream; the returned sender feeds it chunk by chunk, and
/// dropping the sender ends the stream. Keeping it alive keeps the turn
/// in flight, which is how tests hold a turn open mid-generation.
#[derive(Default)]
pub struct ScriptedLlm {
    rounds: Mutex<VecDeque<mpsc::UnboundedReceiver<LlmChunk>>>,
    pub requests: AtomicUsize,
    pub forced: Mutex<Vec<bool>>,
    pub prompts: Mutex<Vec<Option<String>>>,
}

impl ScriptedLlm {
    pub fn push_round(&self) -> mpsc::UnboundedSender<LlmChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.rounds.lock().push_back(rx);
        tx
    }

    /// Queue a round that immediately streams the given chunks and ends.
    pub fn push_finished_round(&self, chunks: Vec<LlmChunk>) {
        let tx = self.push_round();
        for chunk in chunks {
            let _ = tx.send(chunk);
        }
    }
}

impl LanguageModel for ScriptedLlm {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            tool_calls: true,
            structured_output: false,
        }
    }
}

#[async_trait]
impl StreamingLanguageModel for ScriptedLlm {
    async fn prompt_with_stream(
        &self,
        prompt: Option<&str>,
        options: PromptOptions,
    ) -> Result<LlmStream, LlmError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.forced.lock().push(options.forced_tools);
        self.prompts.lock().push(prompt.map(str::to_string));
        let round = self.rounds.lock().pop_front();
        match round {
            Some(rx) => Ok(Box::pin(
                UnboundedReceiverStream::new(rx).map(Ok::<_, LlmError>),
            )),
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }
}

/// TTS that buffers text and, on flush, emits the buffered text back as
/// audio bytes followed by the audio-ended signal.
#[derive(Default)]
pub struct MockTts {
    options: Mutex<Option<SpeechStreamOptions>>,
    pending: Mutex<String>,
    pub sent: Mutex<Vec<String>>,
    pub clears: AtomicUsize,
    pub closed: AtomicUsize,
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn open_stream(&self, options: SpeechStreamOptions) -> Result<(), OrchestratorError> {
        *self.options.lock() = Some(options);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), OrchestratorError> {
        self.pending.lock().push_str(text);
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn flush_buffer(&self) -> Result<(), OrchestratorError> {
        let spoken = std::mem::take(&mut *self.pending.lock());
        let options = self.options.lock().clone();
        if let Some(options) = options {
            if !spoken.is_empty() {
                if let Some(on_audio) = &options.on_audio {
                    on_audio(spoken.as_bytes());
                }
            }
            if let Some(on_audio_ended) = &options.on_audio_ended {
                on_audio_ended(&spoken);
            }
        }
        Ok(())
    }

    async fn clear_buffer(&self) -> Result<(), OrchestratorError> {
        self.pending.lock().clear();
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), OrchestratorError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What the playback device observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Audio(Vec<u8>),
    Mark(String),
    Clear,
}

/// Modern playback device: records every event and acknowledges marks as
/// soon as they arrive.
#[derive(Default)]
pub struct MockAudioOutput {
    pub events: Mutex<Vec<DeviceEvent>>,
}

impl MockAudioOutput {
    pub fn clears(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, DeviceEvent::Clear))
            .count()
    }

    pub fn audio_chunks(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::Audio(audio) => Some(audio.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AudioOutput for MockAudioOutput {
    fn encoding_info(&self) -> EncodingInfo {
        EncodingInfo::new(16_000, "linear16")
    }

    fn send_audio(&self, audio: &[u8]) {
        self.events.lock().push(DeviceEvent::Audio(audio.to_vec()));
    }

    fn clear_buffer(&self) {
        self.events.lock().push(DeviceEvent::Clear);
    }
}

impl MarkingAudioOutput for MockAudioOutput {
    fn mark(&self, name: &str, on_played: MarkCallback) {
        self.events.lock().push(DeviceEvent::Mark(name.to_string()));
        on_played(name);
    }
}

/// Legacy playback device: `await_mark` resolves once playback "drains".
#[derive(Default)]
pub struct LegacyAudioOutput {
    pub events: Mutex<Vec<DeviceEvent>>,
    pub awaited: AtomicUsize,
}

impl AudioOutput for LegacyAudioOutput {
    fn encoding_info(&self) -> EncodingInfo {
        EncodingInfo::new(16_000, "linear16")
    }

    fn send_audio(&self, audio: &[u8]) {
        self.events.lock().push(DeviceEvent::Audio(audio.to_vec()));
    }

    fn clear_buffer(&self) {
        self.events.lock().push(DeviceEvent::Clear);
    }
}

#[async_trait]
impl DrainingAudioOutput for LegacyAudioOutput {
    async fn await_mark(&self) {
        self.awaited.fetch_add(1, Ordering::SeqCst);
    }
}

/// STT stub: records the callbacks it was given and the audio it received.
#[derive(Default)]
pub struct MockStt {
    pub options: Mutex<Option<TranscribeOptions>>,
    pub audio: Mutex<Vec<Vec<u8>>>,
}

impl MockStt {
    /// Drive the installed final-transcript callback, as the provider would.
    pub fn emit_final_transcript(&self, transcript: &str) {
        let options = self.options.lock().clone();
        if let Some(options) = options {
            if let Some(on_final) = &options.on_final_transcript {
                on_final(transcript);
            }
        }
    }

    pub fn audio_chunks(&self) -> usize {
        self.audio.lock().len()
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, options: TranscribeOptions) -> Result<(), OrchestratorError> {
        *self.options.lock() = Some(options);
        Ok(())
    }

    async fn send_audio(&self, audio: &[u8]) -> Result<(), OrchestratorError> {
        self.audio.lock().push(audio.to_vec());
        Ok(())
    }
}

/// Classifier that always answers with a fixed kind and counts invocations.
pub struct FixedClassifier {
    kind: InterruptionKind,
    pub calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(kind: InterruptionKind) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InterruptionClassifier for FixedClassifier {
    async fn classify(
        &self,
        _interruption: &Interruption,
        _history: &[Turn],
        _tools: &[ToolDescriptor],
    ) -> Result<InterruptionKind, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.kind)
    }
}

/// Poll a condition until it holds or a two-second deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Convenience: an LLM round that streams one content chunk and ends.
pub fn content_round(llm: &ScriptedLlm, text: &str) {
    llm.push_finished_round(vec![LlmChunk::content(text)]);
}
