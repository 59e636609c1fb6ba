//! Orchestrator
//!
//! The public control surface and the turn scheduler. One task drains the
//! prompt queue serially; per turn, one consumer feeds the text buffer into
//! TTS and one feeds the audio buffer into the playback device. An audio
//! pump pushes captured samples into STT. Mid-turn prompts route through the
//! interruption handler; cancellation is a single flag every consumer
//! observes between chunks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use duplex_config::OrchestratorConfig;
use duplex_core::{Interruption, ToolCall, Turn, TurnStage};
use duplex_llm::{LlmChunk, PromptOptions, StreamingLanguageModel, TextLanguageModel};
use duplex_tools::{Tool, ToolOutcome, ToolRegistry};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio_buffer::{AudioBuffer, AudioItem};
use crate::builtin;
use crate::driver::{self, DriverContext, LlmClient, TurnDraft};
use crate::interruption::{
    InterruptionClassifier, InterruptionHandler, LlmClassifier, LlmInterruptionHandler,
    OrchestratorControl, PassthroughClassifier,
};
use crate::text_buffer::TextBuffer;
use crate::traits::{
    AudioCallback, AudioInput, AudioInputHandle, AudioOutputHandle, CaptureAudioInput,
    DrainingAudioOutput, EventCallback, MarkingAudioOutput, SpeechStreamOptions, SpeechToText,
    TextToSpeech, TranscribeOptions, TranscriptCallback,
};
use crate::turns::TurnsStore;
use crate::OrchestratorError;

/// Callbacks delivered during orchestration. All are optional.
#[derive(Clone, Default)]
pub struct OrchestrateOptions {
    on_transcription: Option<TranscriptCallback>,
    on_interim_transcription: Option<TranscriptCallback>,
    on_speaking_state_changed: Option<Arc<dyn Fn(bool) + Send + Sync>>,
    on_response: Option<TranscriptCallback>,
    on_response_end: Option<EventCallback>,
    on_cancellation: Option<EventCallback>,
    on_audio: Option<AudioCallback>,
    on_audio_ended: Option<TranscriptCallback>,
}

impl OrchestrateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcription_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_transcription = Some(Arc::new(callback));
        self
    }

    pub fn with_interim_transcription_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_interim_transcription = Some(Arc::new(callback));
        self
    }

    pub fn with_speaking_state_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_speaking_state_changed = Some(Arc::new(callback));
        self
    }

    pub fn with_response_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(callback));
        self
    }

    pub fn with_response_end_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_response_end = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancellation = Some(Arc::new(callback));
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

/// Construction options for [`Orchestrator::new`].
#[derive(Default)]
pub struct OrchestratorOptions {
    llm: Option<Arc<dyn TextLanguageModel>>,
    streaming_llm: Option<Arc<dyn StreamingLanguageModel>>,
    speech_to_text: Option<Arc<dyn SpeechToText>>,
    text_to_speech: Option<Arc<dyn TextToSpeech>>,
    audio_input: Option<AudioInputHandle>,
    audio_output: Option<AudioOutputHandle>,
    tools: Vec<Arc<dyn Tool>>,
    include_builtin_tools: bool,
    classifier: Option<Arc<dyn InterruptionClassifier>>,
    interruption_handler: Option<Arc<dyn InterruptionHandler>>,
    instructions: Option<String>,
    config: OrchestratorConfig,
}

impl OrchestratorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-streaming LLM. Also used as the default classification LLM.
    pub fn with_llm(mut self, llm: Arc<dyn TextLanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Streaming LLM; preferred over the non-streaming one when both are
    /// configured.
    pub fn with_streaming_llm(mut self, llm: Arc<dyn StreamingLanguageModel>) -> Self {
        self.streaming_llm = Some(llm);
        self
    }

    pub fn with_speech_to_text(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.speech_to_text = Some(stt);
        self
    }

    pub fn with_text_to_speech(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.text_to_speech = Some(tts);
        self
    }

    pub fn with_audio_input(mut self, input: Arc<dyn AudioInput>) -> Self {
        self.audio_input = Some(AudioInputHandle::Basic(input));
        self
    }

    pub fn with_capture_audio_input(mut self, input: Arc<dyn CaptureAudioInput>) -> Self {
        self.audio_input = Some(AudioInputHandle::Capture(input));
        self
    }

    pub fn with_audio_output(mut self, output: Arc<dyn MarkingAudioOutput>) -> Self {
        self.audio_output = Some(AudioOutputHandle::Marking(output));
        self
    }

    pub fn with_legacy_audio_output(mut self, output: Arc<dyn DrainingAudioOutput>) -> Self {
        self.audio_output = Some(AudioOutputHandle::Draining(output));
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Register the built-in `recording_control` / `speaking_control` tools.
    pub fn with_orchestration_tools(mut self) -> Self {
        self.include_builtin_tools = true;
        self
    }

    pub fn with_interruption_classifier(mut self, classifier: Arc<dyn InterruptionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_interruption_handler(mut self, handler: Arc<dyn InterruptionHandler>) -> Self {
        self.interruption_handler = Some(handler);
        self
    }

    /// System instructions passed to the LLM on every turn.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }
}

/// Weak control handle given to interruption handlers and orchestration
/// tools. Holds no strong reference back to the orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    inner: Weak<Inner>,
}

impl OrchestratorHandle {
    pub(crate) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl OrchestratorControl for OrchestratorHandle {
    fn turns(&self) -> Arc<TurnsStore> {
        match self.inner.upgrade() {
            Some(inner) => inner.turns.clone(),
            None => Arc::new(TurnsStore::new()),
        }
    }

    fn queue_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        self.inner
            .upgrade()
            .ok_or(OrchestratorError::Closed)?
            .queue_prompt(prompt)
    }

    fn cancel_turn(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_turn();
        }
    }

    async fn call_tool_with_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        self.inner
            .upgrade()
            .ok_or(OrchestratorError::Closed)?
            .call_tool_with_prompt(prompt)
            .await
    }

    fn set_speaking(&self, speaking: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.speaking.store(speaking, Ordering::SeqCst);
        }
    }

    fn set_always_recording(&self, always_recording: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.always_recording.store(always_recording, Ordering::SeqCst);
        }
    }

    fn is_speaking(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.speaking.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_always_recording(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.always_recording.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// Real-time full-duplex voice-agent orchestrator.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

struct Inner {
    llm: LlmClient,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    audio_input: Option<AudioInputHandle>,
    audio_output: Option<AudioOutputHandle>,
    tools: ToolRegistry,
    handler: Arc<dyn InterruptionHandler>,
    instructions: Option<String>,

    turns: Arc<TurnsStore>,
    text_buffer: TextBuffer,
    audio_buffer: AudioBuffer,

    prompt_tx: mpsc::Sender<String>,
    prompt_rx: Mutex<Option<mpsc::Receiver<String>>>,
    callbacks: RwLock<OrchestrateOptions>,
    /// The driver's output for the in-flight turn, attached at finalization.
    draft: Mutex<Option<TurnDraft>>,

    speaking: AtomicBool,
    recording: AtomicBool,
    always_recording: AtomicBool,
    started: AtomicBool,
    closed: AtomicBool,

    /// True while a turn occupies the active slot.
    turn_active: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    mark_seq: AtomicU64,

    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build an orchestrator. Fails fast when no LLM collaborator is
    /// configured; every other collaborator is optional.
    pub fn new(options: OrchestratorOptions) -> Result<Self, OrchestratorError> {
        let OrchestratorOptions {
            llm,
            streaming_llm,
            speech_to_text,
            text_to_speech,
            audio_input,
            audio_output,
            tools,
            include_builtin_tools,
            classifier,
            interruption_handler,
            instructions,
            config,
        } = options;

        let client = match (&streaming_llm, &llm) {
            (Some(streaming), _) => LlmClient::Streaming(streaming.clone()),
            (None, Some(text)) => LlmClient::Text(text.clone()),
            (None, None) => return Err(OrchestratorError::MissingCollaborator("LLM")),
        };

        let handler: Arc<dyn InterruptionHandler> = match interruption_handler {
            Some(handler) => handler,
            None => {
                let classifier: Arc<dyn InterruptionClassifier> = match classifier {
                    Some(classifier) => classifier,
                    None => match &llm {
                        Some(text) => Arc::new(LlmClassifier::general(text.clone())),
                        None => Arc::new(PassthroughClassifier),
                    },
                };
                Arc::new(LlmInterruptionHandler::new(classifier))
            }
        };

        let (prompt_tx, prompt_rx) = mpsc::channel(config.prompt_queue_capacity.max(1));
        let (turn_active, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let mut registry = ToolRegistry::new();
            for tool in tools {
                registry.register(tool);
            }
            if include_builtin_tools {
                for tool in builtin::orchestration_tools(OrchestratorHandle::new(weak.clone())) {
                    registry.register(tool);
                }
            }

            Inner {
                llm: client,
                stt: speech_to_text,
                tts: text_to_speech,
                audio_input,
                audio_output,
                tools: registry,
                handler,
                instructions,
                turns: Arc::new(TurnsStore::new()),
                text_buffer: TextBuffer::new(),
                audio_buffer: AudioBuffer::new(),
                prompt_tx,
                prompt_rx: Mutex::new(Some(prompt_rx)),
                callbacks: RwLock::new(OrchestrateOptions::default()),
                draft: Mutex::new(None),
                speaking: AtomicBool::new(true),
                recording: AtomicBool::new(false),
                always_recording: AtomicBool::new(config.always_recording),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                turn_active,
                shutdown,
                mark_seq: AtomicU64::new(0),
                scheduler_task: Mutex::new(None),
                pump_task: Mutex::new(None),
            }
        });

        Ok(Self { inner })
    }

    /// Install callbacks, wire the STT/TTS collaborators, and start the
    /// scheduler and the audio-input pump.
    pub async fn orchestrate(&self, callbacks: OrchestrateOptions) -> Result<(), OrchestratorError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::AlreadyStarted);
        }
        *inner.callbacks.write() = callbacks;

        if let Some(tts) = &inner.tts {
            let encoding = inner
                .audio_output
                .as_ref()
                .map(|output| output.encoding_info())
                .unwrap_or_default();
            let options = SpeechStreamOptions::new()
                .with_encoding_info(encoding)
                .with_audio_callback({
                    let audio_buffer = inner.audio_buffer.clone();
                    move |audio: &[u8]| audio_buffer.add_audio(audio.to_vec())
                })
                .with_audio_ended_callback({
                    let inner = inner.clone();
                    move |transcript: &str| inner.tts_audio_ended(transcript)
                });
            tts.open_stream(options).await?;
        }

        if let Some(stt) = &inner.stt {
            let encoding = inner
                .audio_input
                .as_ref()
                .map(|input| input.encoding_info())
                .unwrap_or_default();
            let options = TranscribeOptions::new()
                .with_encoding_info(encoding)
                .with_speech_started_callback({
                    let inner = inner.clone();
                    move || inner.emit_speaking_state(true)
                })
                .with_speech_ended_callback({
                    let inner = inner.clone();
                    move || inner.emit_speaking_state(false)
                })
                .with_interim_transcript_callback({
                    let inner = inner.clone();
                    move |transcript: &str| inner.emit_interim_transcription(transcript)
                })
                .with_final_transcript_callback({
                    let inner = inner.clone();
                    move |transcript: &str| {
                        inner.emit_interim_transcription("");
                        inner.emit_transcription(transcript);
                        let inner = inner.clone();
                        let prompt = transcript.to_string();
                        tokio::spawn(async move {
                            if let Err(err) = inner.send_prompt(&prompt).await {
                                warn!(error = %err, "failed to route final transcript");
                            }
                        });
                    }
                });
            stt.transcribe(options).await?;
        }

        let prompts = inner
            .prompt_rx
            .lock()
            .take()
            .ok_or(OrchestratorError::AlreadyStarted)?;
        *inner.scheduler_task.lock() = Some(tokio::spawn(run_scheduler(inner.clone(), prompts)));

        if inner.audio_input.is_some() && inner.stt.is_some() {
            *inner.pump_task.lock() = Some(tokio::spawn(run_audio_pump(inner.clone())));
        }

        info!("orchestrator started");
        Ok(())
    }

    /// Submit a prompt. While a turn is in flight the prompt is treated as
    /// an interruption and routed through the interruption handler.
    pub async fn send_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        self.inner.clone().send_prompt(prompt).await
    }

    /// Enqueue a prompt directly, bypassing interruption handling.
    pub fn queue_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        self.inner.queue_prompt(prompt)
    }

    /// Push captured audio toward STT. Dropped unless recording or
    /// always-recording is on.
    pub async fn send_audio(&self, audio: &[u8]) -> Result<(), OrchestratorError> {
        self.inner.send_audio(audio).await
    }

    /// Cancel the active turn, clear device playback, and release the audio
    /// buffer. A no-op when no turn is active.
    pub fn cancel_turn(&self) {
        self.inner.cancel_turn();
    }

    /// Pause playback: the audio consumer stops pulling items.
    pub fn pause_turn(&self) {
        self.inner.audio_buffer.pause();
    }

    pub fn unpause_turn(&self) {
        self.inner.audio_buffer.unpause();
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.inner.speaking.store(speaking, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    pub fn set_always_recording(&self, always_recording: bool) {
        self.inner.always_recording.store(always_recording, Ordering::SeqCst);
    }

    pub fn is_always_recording(&self) -> bool {
        self.inner.always_recording.load(Ordering::SeqCst)
    }

    /// Start routing captured audio to STT; on a capture-capable input this
    /// also starts the device.
    pub fn start_recording(&self) {
        self.inner.recording.store(true, Ordering::SeqCst);
        if let Some(AudioInputHandle::Capture(input)) = &self.inner.audio_input {
            let input = input.clone();
            let callback = input_callback(&self.inner);
            tokio::spawn(async move {
                if let Err(err) = input.start_capture(callback).await {
                    warn!(error = %err, "failed to start audio capture");
                }
            });
        }
    }

    /// Stop routing captured audio; the capture device is stopped unless
    /// always-recording still needs it.
    pub fn stop_recording(&self) {
        self.inner.recording.store(false, Ordering::SeqCst);
        if !self.inner.always_recording.load(Ordering::SeqCst) {
            if let Some(AudioInputHandle::Capture(input)) = &self.inner.audio_input {
                let input = input.clone();
                tokio::spawn(async move {
                    if let Err(err) = input.stop_capture().await {
                        warn!(error = %err, "failed to stop audio capture");
                    }
                });
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.load(Ordering::SeqCst)
    }

    /// Snapshot of the completed conversation history.
    pub fn turns(&self) -> Vec<Turn> {
        self.inner.turns.snapshot()
    }

    /// Snapshot of the in-flight assistant turn, if any.
    pub fn active_turn(&self) -> Option<Turn> {
        self.inner.turns.active_turn()
    }

    /// Weak control handle for custom tools and handlers.
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::new(Arc::downgrade(&self.inner))
    }

    /// Invoke a registered tool with a tool call's JSON arguments.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<ToolOutcome, OrchestratorError> {
        Ok(self.inner.tools.invoke(call).await?)
    }

    /// Dispatch a prompt to the LLM with forced tool selection, discarding
    /// any natural-language response.
    pub async fn call_tool_with_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        self.inner.call_tool_with_prompt(prompt).await
    }

    /// Graceful shutdown: cancel the active turn, release the buffers, stop
    /// the scheduler and pump, close the provider streams.
    pub async fn close(&self) -> Result<(), OrchestratorError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("shutting down orchestrator");
        self.inner.cancel_turn();
        let _ = self.inner.shutdown.send(true);
        self.inner.text_buffer.clear();
        self.inner.audio_buffer.clear();

        if let Some(AudioInputHandle::Capture(input)) = &self.inner.audio_input {
            if let Err(err) = input.stop_capture().await {
                warn!(error = %err, "failed to stop audio capture");
            }
        }
        if let Some(tts) = &self.inner.tts {
            if let Err(err) = tts.close().await {
                warn!(error = %err, "failed to close TTS stream");
            }
        }
        if let Some(stt) = &self.inner.stt {
            if let Err(err) = stt.close().await {
                warn!(error = %err, "failed to close STT stream");
            }
        }

        let scheduler = self.inner.scheduler_task.lock().take();
        if let Some(task) = scheduler {
            let _ = task.await;
        }
        let pump = self.inner.pump_task.lock().take();
        if let Some(task) = pump {
            task.abort();
        }
        Ok(())
    }
}

impl Inner {
    fn queue_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }
        self.prompt_tx
            .try_send(prompt.to_string())
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => OrchestratorError::PromptQueueFull,
                mpsc::error::TrySendError::Closed(_) => OrchestratorError::Closed,
            })
    }

    async fn send_prompt(self: Arc<Self>, prompt: &str) -> Result<(), OrchestratorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }
        if self.turns.active_turn().is_none() {
            return self.queue_prompt(prompt);
        }

        let interruption = Interruption::new(prompt);
        let id = interruption.id;
        self.turns.add_interruption(interruption.clone());

        let history = self.turns.snapshot();
        let catalogue = self.tools.descriptors();
        let handle = OrchestratorHandle::new(Arc::downgrade(&self));
        let kind = self
            .handler
            .handle(&interruption, history, catalogue, &handle)
            .await?;
        self.turns.update_interruption(id, |i| i.resolve(kind));
        Ok(())
    }

    async fn send_audio(&self, audio: &[u8]) -> Result<(), OrchestratorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Closed);
        }
        if !(self.recording.load(Ordering::SeqCst) || self.always_recording.load(Ordering::SeqCst)) {
            return Ok(());
        }
        let Some(stt) = &self.stt else {
            return Ok(());
        };
        stt.send_audio(audio).await
    }

    fn cancel_turn(&self) {
        if !self.turns.cancel_active() {
            return;
        }
        debug!("cancelling active turn");
        if let Some(output) = &self.audio_output {
            output.clear_buffer();
        }
        self.audio_buffer.unpause();
        self.audio_buffer.clear();
        if let Some(tts) = &self.tts {
            let tts = tts.clone();
            tokio::spawn(async move {
                if let Err(err) = tts.clear_buffer().await {
                    warn!(error = %err, "failed to clear TTS buffer");
                }
            });
        }
        self.emit_cancellation();
    }

    async fn call_tool_with_prompt(&self, prompt: &str) -> Result<(), OrchestratorError> {
        if !self.llm.capabilities().tool_calls {
            return Err(OrchestratorError::UnknownLlmType);
        }
        let history = self.turns.snapshot();
        match &self.llm {
            LlmClient::Streaming(llm) => {
                let options = PromptOptions::new()
                    .with_history(driver::request_history(&history))
                    .with_tools(self.tools.tools().to_vec())
                    .with_forced_tools();
                let mut stream = llm.prompt_with_stream(Some(prompt), options).await?;
                let mut calls = Vec::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(LlmChunk::ToolCall(call)) => calls.push(call),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "skipping malformed stream chunk"),
                    }
                }
                for call in &mut calls {
                    match self.tools.invoke(call).await {
                        Ok(outcome) => call.response = Some(outcome.response),
                        Err(err) => warn!(tool = %call.name, error = %err, "tool call not dispatched"),
                    }
                }
                Ok(())
            }
            LlmClient::Text(llm) => {
                let options = PromptOptions::new()
                    .with_history(driver::request_history(&history))
                    .with_tools(self.tools.tools().to_vec())
                    .with_forced_tools();
                llm.prompt(prompt, options).await?;
                Ok(())
            }
        }
    }

    /// TTS finished a synthesis run: inject the end-of-turn mark, then close
    /// the stream so the consumer can drain to the mark and finish.
    fn tts_audio_ended(&self, transcript: &str) {
        let mark = format!("turn-end-{}", self.mark_seq.fetch_add(1, Ordering::SeqCst));
        self.audio_buffer.add_mark(mark);
        self.audio_buffer.finish(transcript);
    }

    fn mark_played(&self, name: &str) {
        if self.audio_buffer.mark_played(name) {
            self.turns.advance_active_stage(TurnStage::Done);
        }
    }

    fn finalize_turn(&self) {
        let draft = self.draft.lock().take();
        if self.turns.active_cancelled() {
            if let Some(output) = &self.audio_output {
                output.clear_buffer();
            }
        } else if let Some(draft) = draft {
            self.turns.with_active(|turn| {
                turn.content = draft.content;
                turn.tool_calls = draft.tool_calls;
            });
        }
        if self.turns.finalize_active().is_some() {
            debug!("active turn finalized");
        }
        let _ = self.turn_active.send(false);
    }

    async fn wait_for_turn_end(&self) {
        let mut rx = self.turn_active.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn emit_transcription(&self, transcript: &str) {
        if let Some(callback) = &self.callbacks.read().on_transcription {
            callback(transcript);
        }
    }

    fn emit_interim_transcription(&self, transcript: &str) {
        if let Some(callback) = &self.callbacks.read().on_interim_transcription {
            callback(transcript);
        }
    }

    fn emit_speaking_state(&self, speaking: bool) {
        if let Some(callback) = &self.callbacks.read().on_speaking_state_changed {
            callback(speaking);
        }
    }

    fn emit_response(&self, chunk: &str) {
        if let Some(callback) = &self.callbacks.read().on_response {
            callback(chunk);
        }
    }

    fn emit_response_end(&self) {
        if let Some(callback) = &self.callbacks.read().on_response_end {
            callback();
        }
    }

    fn emit_cancellation(&self) {
        if let Some(callback) = &self.callbacks.read().on_cancellation {
            callback();
        }
    }

    fn emit_audio(&self, audio: &[u8]) {
        if let Some(callback) = &self.callbacks.read().on_audio {
            callback(audio);
        }
    }

    fn emit_audio_ended(&self, transcript: &str) {
        if let Some(callback) = &self.callbacks.read().on_audio_ended {
            callback(transcript);
        }
    }
}

/// The scheduler: drains the prompt queue serially, one turn at a time.
async fn run_scheduler(inner: Arc<Inner>, mut prompts: mpsc::Receiver<String>) {
    let mut shutdown = inner.shutdown.subscribe();
    loop {
        let prompt = tokio::select! {
            prompt = prompts.recv() => match prompt {
                Some(prompt) => prompt,
                None => break,
            },
            _ = shutdown.changed() => break,
        };
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        inner.wait_for_turn_end().await;
        run_turn(&inner, prompt).await;
    }
    debug!("prompt scheduler stopped");
}

/// One full turn: prepare, generate, speak, finalize.
async fn run_turn(inner: &Arc<Inner>, prompt: String) {
    let history = inner.turns.snapshot();
    inner.turns.push_active(Turn::assistant());
    let _ = inner.turn_active.send(true);
    inner.turns.push(Turn::user(prompt.clone()));

    inner.text_buffer.clear();
    inner.audio_buffer.clear();
    *inner.draft.lock() = None;

    let text_task = tokio::spawn(run_text_consumer(inner.clone()));
    let audio_task = tokio::spawn(run_audio_consumer(inner.clone()));

    inner.turns.advance_active_stage(TurnStage::GeneratingResponse);
    let ctx = DriverContext {
        llm: inner.llm.clone(),
        tools: inner.tools.clone(),
        turns: inner.turns.clone(),
        text_buffer: inner.text_buffer.clone(),
        system_prompt: inner.instructions.clone(),
        on_content: Some({
            let inner = inner.clone();
            Arc::new(move |text: &str| inner.emit_response(text))
        }),
    };
    match driver::run(&ctx, &prompt, history).await {
        Ok(Some(draft)) => {
            if inner.turns.active_turn().is_some_and(|turn| !turn.cancelled) {
                *inner.draft.lock() = Some(draft);
            }
        }
        Ok(None) => debug!("driver aborted: turn cancelled"),
        Err(err) => {
            warn!(error = %err, "LLM driver failed; cancelling the turn");
            inner.cancel_turn();
        }
    }

    inner.text_buffer.finish();
    inner.turns.advance_active_stage(TurnStage::Speaking);
    inner.emit_response_end();

    if let Err(err) = text_task.await {
        warn!(error = %err, "text consumer task failed");
    }

    if inner.turns.active_cancelled() {
        // Nothing more will reach the audio buffer; release its consumer.
        inner.audio_buffer.finish(String::new());
    } else if inner.tts.is_none() {
        // No TTS configured: the spoken transcript is the response text.
        let transcript = inner
            .draft
            .lock()
            .as_ref()
            .map(|draft| draft.content.clone())
            .unwrap_or_default();
        inner.tts_audio_ended(&transcript);
    }

    if let Err(err) = audio_task.await {
        warn!(error = %err, "audio consumer task failed");
    }
}

/// Per-turn consumer feeding the text buffer into TTS.
async fn run_text_consumer(inner: Arc<Inner>) {
    let mut reader = inner.text_buffer.reader();
    while let Some(chunk) = reader.next().await {
        if inner.turns.active_cancelled() {
            return;
        }
        if let Some(tts) = &inner.tts {
            if let Err(err) = tts.send_text(&chunk).await {
                warn!(error = %err, "failed to send text to TTS");
            }
        }
    }
    if !inner.turns.active_turn().is_some_and(|turn| !turn.cancelled) {
        return;
    }
    if let Some(tts) = &inner.tts {
        if let Err(err) = tts.flush_buffer().await {
            warn!(error = %err, "failed to flush TTS buffer");
            // The provider will not signal audio-ended now; keep the turn
            // from hanging.
            inner.audio_buffer.finish(String::new());
        }
    }
}

/// Per-turn consumer feeding the audio buffer into the playback device.
async fn run_audio_consumer(inner: Arc<Inner>) {
    let mut reader = inner.audio_buffer.reader();
    while let Some(item) = reader.next().await {
        match item {
            AudioItem::Audio(audio) => {
                inner.emit_audio(&audio);
                let Some(output) = &inner.audio_output else {
                    continue;
                };
                if !inner.speaking.load(Ordering::SeqCst) || inner.turns.active_cancelled() {
                    output.clear_buffer();
                    break;
                }
                output.send_audio(&audio);
            }
            AudioItem::Mark(name) => match &inner.audio_output {
                Some(AudioOutputHandle::Marking(output)) => {
                    let ack = inner.clone();
                    output.mark(&name, Box::new(move |mark| ack.mark_played(mark)));
                }
                Some(AudioOutputHandle::Draining(output)) => {
                    let output = output.clone();
                    let ack = inner.clone();
                    tokio::spawn(async move {
                        output.await_mark().await;
                        ack.mark_played(&name);
                    });
                }
                None => inner.mark_played(&name),
            },
        }
    }

    inner.emit_audio_ended(&inner.audio_buffer.final_transcript());
    if let Some(output) = &inner.audio_output {
        if !inner.speaking.load(Ordering::SeqCst) || inner.turns.active_cancelled() {
            output.clear_buffer();
        }
    }
    inner.finalize_turn();
}

/// Callback handed to the audio-input device; forwards each captured chunk
/// through the recording gate toward STT.
fn input_callback(inner: &Arc<Inner>) -> AudioCallback {
    let inner = inner.clone();
    Arc::new(move |audio: &[u8]| {
        let inner = inner.clone();
        let audio = audio.to_vec();
        tokio::spawn(async move {
            if let Err(err) = inner.send_audio(&audio).await {
                warn!(error = %err, "failed to forward captured audio");
            }
        });
    })
}

/// Pushes captured audio samples toward STT.
async fn run_audio_pump(inner: Arc<Inner>) {
    let Some(input) = inner.audio_input.clone() else {
        return;
    };
    match input {
        AudioInputHandle::Capture(input) => {
            if inner.always_recording.load(Ordering::SeqCst) {
                if let Err(err) = input.start_capture(input_callback(&inner)).await {
                    warn!(error = %err, "failed to start audio capture");
                }
            }
            // Otherwise capture starts on start_recording().
        }
        AudioInputHandle::Basic(input) => {
            if let Err(err) = input.stream(input_callback(&inner)).await {
                warn!(error = %err, "audio input stream ended with error");
            }
        }
    }
}
