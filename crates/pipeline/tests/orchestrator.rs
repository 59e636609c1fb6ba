//! End-to-end orchestrator scenarios with scripted collaborators.
//!
//! These tests drive the public surface the way a host would: prompts go in,
//! turns come out, and the mock STT/TTS/device record what crossed them.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use duplex_config::OrchestratorConfig;
use duplex_core::{InterruptionKind, ToolCall, TurnRole, TurnStage};
use duplex_llm::LlmChunk;
use duplex_pipeline::{
    OrchestrateOptions, Orchestrator, OrchestratorError, OrchestratorOptions,
};
use parking_lot::Mutex;

use support::{
    content_round, wait_until, DeviceEvent, FixedClassifier, LegacyAudioOutput, MockAudioOutput,
    MockStt, MockTts, ScriptedLlm,
};

struct Harness {
    orchestrator: Orchestrator,
    llm: Arc<ScriptedLlm>,
    tts: Arc<MockTts>,
    output: Arc<MockAudioOutput>,
    responses: Arc<Mutex<Vec<String>>>,
    audio_ended: Arc<Mutex<Vec<String>>>,
    cancellations: Arc<AtomicUsize>,
}

impl Harness {
    async fn start(configure: impl FnOnce(OrchestratorOptions) -> OrchestratorOptions) -> Self {
        let llm = Arc::new(ScriptedLlm::default());
        let tts = Arc::new(MockTts::default());
        let output = Arc::new(MockAudioOutput::default());

        let options = OrchestratorOptions::new()
            .with_streaming_llm(llm.clone())
            .with_text_to_speech(tts.clone())
            .with_audio_output(output.clone());
        let orchestrator = Orchestrator::new(configure(options)).unwrap();

        let responses = Arc::new(Mutex::new(Vec::new()));
        let audio_ended = Arc::new(Mutex::new(Vec::new()));
        let cancellations = Arc::new(AtomicUsize::new(0));

        orchestrator
            .orchestrate(
                OrchestrateOptions::new()
                    .with_response_callback({
                        let responses = responses.clone();
                        move |chunk: &str| responses.lock().push(chunk.to_string())
                    })
                    .with_audio_ended_callback({
                        let audio_ended = audio_ended.clone();
                        move |transcript: &str| audio_ended.lock().push(transcript.to_string())
                    })
                    .with_cancellation_callback({
                        let cancellations = cancellations.clone();
                        move || {
                            cancellations.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
            )
            .await
            .unwrap();

        Self {
            orchestrator,
            llm,
            tts,
            output,
            responses,
            audio_ended,
            cancellations,
        }
    }
}

/// Scenario: single prompt, no tools.
#[tokio::test]
async fn single_prompt_produces_a_spoken_assistant_turn() {
    let harness = Harness::start(|options| options).await;

    content_round(&harness.llm, "Hi! Nice to meet you.");
    harness.orchestrator.send_prompt("Hello there.").await.unwrap();

    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);
    let turns = harness.orchestrator.turns();
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[0].content, "Hello there.");
    assert_eq!(turns[1].role, TurnRole::Assistant);
    assert_eq!(turns[1].content, "Hi! Nice to meet you.");
    assert_eq!(turns[1].stage, TurnStage::Done);

    assert!(!harness.responses.lock().is_empty());
    assert!(wait_until(|| harness.audio_ended.lock().len() == 1).await);
    assert_eq!(harness.audio_ended.lock()[0], "Hi! Nice to meet you.");
    assert_eq!(
        harness.llm.prompts.lock().as_slice(),
        [Some("Hello there.".to_string())]
    );
    assert!(harness
        .tts
        .sent
        .lock()
        .iter()
        .any(|chunk| chunk.contains("Hi!")));
    assert_eq!(
        harness.output.audio_chunks(),
        [b"Hi! Nice to meet you.".to_vec()]
    );

    // The device received the synthesized audio, then the end-of-turn mark.
    let events = harness.output.events.lock().clone();
    let audio_at = events
        .iter()
        .position(|event| matches!(event, DeviceEvent::Audio(_)))
        .expect("device got audio");
    let mark_at = events
        .iter()
        .position(|event| matches!(event, DeviceEvent::Mark(_)))
        .expect("device got the end-of-turn mark");
    assert!(audio_at < mark_at, "mark acked only after audio was sent");
}

/// Scenario: mid-turn clarification.
#[tokio::test]
async fn clarification_cancels_and_requeues_the_new_prompt() {
    let classifier = Arc::new(FixedClassifier::new(InterruptionKind::Clarification));
    let harness = Harness::start({
        let classifier = classifier.clone();
        move |options| options.with_interruption_classifier(classifier)
    })
    .await;

    // First turn stays in flight while the round's sender is alive.
    let round1 = harness.llm.push_round();
    round1.send(LlmChunk::content("Ships are large vessels")).unwrap();
    harness.orchestrator.send_prompt("Tell me about ships.").await.unwrap();
    assert!(wait_until(|| harness.orchestrator.active_turn().is_some()).await);
    assert!(wait_until(|| !harness.responses.lock().is_empty()).await);

    content_round(&harness.llm, "X-wings and Star Destroyers.");
    harness
        .orchestrator
        .send_prompt("I meant Star Wars ships.")
        .await
        .unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.cancellations.load(Ordering::SeqCst), 1);
    assert!(harness.output.clears() >= 1, "device playback was cleared");
    drop(round1);

    assert!(
        wait_until(|| {
            let turns = harness.orchestrator.turns();
            turns
                .iter()
                .any(|turn| turn.role == TurnRole::Assistant && turn.cancelled)
                && turns
                    .iter()
                    .any(|turn| turn.role == TurnRole::User && turn.content == "I meant Star Wars ships.")
                && turns
                    .iter()
                    .any(|turn| turn.content == "X-wings and Star Destroyers.")
        })
        .await
    );

    // The cancelled turn carries its interruption, classified and resolved.
    let turns = harness.orchestrator.turns();
    let cancelled = turns.iter().find(|turn| turn.cancelled).unwrap();
    assert_eq!(cancelled.interruptions.len(), 1);
    assert!(cancelled.interruptions[0].resolved);
    assert_eq!(
        cancelled.interruptions[0].kind,
        Some(InterruptionKind::Clarification)
    );
}

/// Scenario: continuation rewrites the last user prompt.
#[tokio::test]
async fn continuation_removes_the_last_user_turn_and_replays_it() {
    let harness = Harness::start(|options| {
        options.with_interruption_classifier(Arc::new(FixedClassifier::new(
            InterruptionKind::Continuation,
        )))
    })
    .await;

    let round1 = harness.llm.push_round();
    round1.send(LlmChunk::content("A space opera")).unwrap();
    harness
        .orchestrator
        .send_prompt("Tell me about Star Wars.")
        .await
        .unwrap();
    assert!(wait_until(|| harness.orchestrator.active_turn().is_some()).await);

    content_round(&harness.llm, "Ship design in Star Wars is iconic.");
    harness.orchestrator.send_prompt("Ship designs").await.unwrap();

    // The original user turn is gone the moment the interruption resolves.
    assert!(!harness
        .orchestrator
        .turns()
        .iter()
        .any(|turn| turn.role == TurnRole::User && turn.content == "Tell me about Star Wars."));
    drop(round1);

    assert!(
        wait_until(|| {
            harness.orchestrator.turns().iter().any(|turn| {
                turn.role == TurnRole::User
                    && turn.content == "Tell me about Star Wars. Ship designs"
            }) && harness
                .orchestrator
                .turns()
                .iter()
                .any(|turn| turn.content == "Ship design in Star Wars is iconic.")
        })
        .await
    );
}

/// Scenario: action interruption dispatches a forced tool call and the turn
/// keeps going.
#[tokio::test]
async fn action_interruption_invokes_a_tool_without_cancelling() {
    let harness = Harness::start(|options| {
        options
            .with_orchestration_tools()
            .with_interruption_classifier(Arc::new(FixedClassifier::new(InterruptionKind::Action)))
    })
    .await;
    assert!(harness.orchestrator.is_always_recording());

    let round1 = harness.llm.push_round();
    round1.send(LlmChunk::content("Reading the news")).unwrap();
    harness.orchestrator.send_prompt("Read me the news.").await.unwrap();
    assert!(wait_until(|| harness.orchestrator.active_turn().is_some()).await);

    // The forced-tool round answers the interruption.
    harness.llm.push_finished_round(vec![LlmChunk::ToolCall(ToolCall::new(
        "call-1",
        "recording_control",
        r#"{"is_recording": false}"#,
    ))]);
    harness.orchestrator.send_prompt("Stop listening.").await.unwrap();

    assert!(!harness.orchestrator.is_always_recording());
    assert_eq!(harness.cancellations.load(Ordering::SeqCst), 0);
    let active = harness.orchestrator.active_turn().expect("turn continues");
    assert!(!active.cancelled);
    assert_eq!(harness.llm.forced.lock().as_slice(), [false, true]);

    drop(round1);
    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);
    assert!(
        !harness
            .orchestrator
            .turns()
            .iter()
            .any(|turn| turn.content == "Stop listening."),
        "the action prompt never becomes a user turn"
    );
}

/// Scenario: cancellation by category.
#[tokio::test]
async fn cancellation_interruption_drops_the_prompt_and_cancels() {
    let harness = Harness::start(|options| {
        options.with_interruption_classifier(Arc::new(FixedClassifier::new(
            InterruptionKind::Cancellation,
        )))
    })
    .await;

    let round1 = harness.llm.push_round();
    round1.send(LlmChunk::content("Let me explain at length")).unwrap();
    harness.orchestrator.send_prompt("Explain monads.").await.unwrap();
    assert!(wait_until(|| harness.orchestrator.active_turn().is_some()).await);

    harness.orchestrator.send_prompt("Never mind.").await.unwrap();

    assert_eq!(harness.cancellations.load(Ordering::SeqCst), 1);
    assert!(harness.output.clears() >= 1);
    drop(round1);

    assert!(wait_until(|| harness.orchestrator.active_turn().is_none()).await);
    let turns = harness.orchestrator.turns();
    assert!(turns.iter().any(|turn| turn.cancelled));
    assert!(
        !turns.iter().any(|turn| turn.content == "Never mind."),
        "the dropped prompt never re-enters"
    );
    // Nothing left to process: no further turns appear.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(harness.orchestrator.turns().len(), turns.len());
}

/// Scenario: tool loop termination.
#[tokio::test]
async fn tool_loop_attaches_responses_and_stops_after_two_requests() {
    let harness = Harness::start(|options| options.with_orchestration_tools()).await;

    harness.llm.push_finished_round(vec![
        LlmChunk::ToolCall(ToolCall::new(
            "call-1",
            "recording_control",
            r#"{"is_recording": true}"#,
        )),
        LlmChunk::ToolCall(ToolCall::new(
            "call-2",
            "speaking_control",
            r#"{"is_speaking": true}"#,
        )),
    ]);
    content_round(&harness.llm, "Recording and speaking are on.");

    harness
        .orchestrator
        .send_prompt("Turn everything on.")
        .await
        .unwrap();

    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);
    let turns = harness.orchestrator.turns();
    let assistant = &turns[1];
    assert_eq!(assistant.content, "Recording and speaking are on.");
    assert_eq!(assistant.tool_calls.len(), 2);
    for call in &assistant.tool_calls {
        assert_eq!(
            call.response.as_deref(),
            Some("Success. Respond with a very short phrase")
        );
    }
    assert_eq!(harness.llm.requests.load(Ordering::SeqCst), 2);
    assert!(harness.orchestrator.is_always_recording());
    assert!(harness.orchestrator.is_speaking());
}

/// `queue_prompt` bypasses interruption handling even with a turn in flight.
#[tokio::test]
async fn queue_prompt_never_triggers_interruption_handling() {
    let classifier = Arc::new(FixedClassifier::new(InterruptionKind::Cancellation));
    let harness = Harness::start({
        let classifier = classifier.clone();
        move |options| options.with_interruption_classifier(classifier)
    })
    .await;

    let round1 = harness.llm.push_round();
    round1.send(LlmChunk::content("Working on it")).unwrap();
    harness.orchestrator.send_prompt("First request.").await.unwrap();
    assert!(wait_until(|| harness.orchestrator.active_turn().is_some()).await);

    content_round(&harness.llm, "Second answer.");
    harness.orchestrator.queue_prompt("Second request.").unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.cancellations.load(Ordering::SeqCst), 0);

    drop(round1);
    assert!(
        wait_until(|| {
            harness
                .orchestrator
                .turns()
                .iter()
                .any(|turn| turn.content == "Second answer.")
        })
        .await
    );
}

/// Pausing playback holds finalization; unpausing releases it.
#[tokio::test]
async fn paused_playback_holds_the_turn_open() {
    let harness = Harness::start(|options| options).await;

    harness.orchestrator.pause_turn();
    content_round(&harness.llm, "Patience.");
    harness.orchestrator.send_prompt("Say something.").await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(
        harness.orchestrator.active_turn().is_some(),
        "turn cannot finalize while playback is paused"
    );

    harness.orchestrator.unpause_turn();
    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);
}

/// The legacy (await-mark) device still completes turns.
#[tokio::test]
async fn legacy_audio_output_acknowledges_marks() {
    let llm = Arc::new(ScriptedLlm::default());
    let tts = Arc::new(MockTts::default());
    let output = Arc::new(LegacyAudioOutput::default());
    let orchestrator = Orchestrator::new(
        OrchestratorOptions::new()
            .with_streaming_llm(llm.clone())
            .with_text_to_speech(tts.clone())
            .with_legacy_audio_output(output.clone()),
    )
    .unwrap();
    orchestrator.orchestrate(OrchestrateOptions::new()).await.unwrap();

    content_round(&llm, "Old hardware, same flow.");
    orchestrator.send_prompt("Hello.").await.unwrap();

    assert!(wait_until(|| orchestrator.turns().len() == 2).await);
    assert!(output.awaited.load(Ordering::SeqCst) >= 1);
    assert!(!output.events.lock().is_empty());
    assert_eq!(orchestrator.turns()[1].stage, TurnStage::Done);
}

/// Audio routing honors the recording flags, idempotently.
#[tokio::test]
async fn send_audio_routes_only_while_recording_flags_allow() {
    let llm = Arc::new(ScriptedLlm::default());
    let stt = Arc::new(MockStt::default());
    let orchestrator = Orchestrator::new(
        OrchestratorOptions::new()
            .with_streaming_llm(llm)
            .with_speech_to_text(stt.clone()),
    )
    .unwrap();
    orchestrator.orchestrate(OrchestrateOptions::new()).await.unwrap();

    // always_recording defaults on.
    orchestrator.send_audio(&[1, 2, 3]).await.unwrap();
    assert_eq!(stt.audio_chunks(), 1);

    orchestrator.set_always_recording(false);
    orchestrator.set_always_recording(false);
    orchestrator.send_audio(&[4, 5]).await.unwrap();
    assert_eq!(stt.audio_chunks(), 1, "dropped while not recording");

    orchestrator.start_recording();
    orchestrator.send_audio(&[6]).await.unwrap();
    assert_eq!(stt.audio_chunks(), 2);

    orchestrator.stop_recording();
    orchestrator.send_audio(&[7]).await.unwrap();
    assert_eq!(stt.audio_chunks(), 2);
}

/// A final transcript from STT flows all the way to a finished turn.
#[tokio::test]
async fn stt_final_transcript_drives_a_turn() {
    let llm = Arc::new(ScriptedLlm::default());
    let stt = Arc::new(MockStt::default());
    let tts = Arc::new(MockTts::default());
    let orchestrator = Orchestrator::new(
        OrchestratorOptions::new()
            .with_streaming_llm(llm.clone())
            .with_speech_to_text(stt.clone())
            .with_text_to_speech(tts),
    )
    .unwrap();

    let transcriptions = Arc::new(Mutex::new(Vec::new()));
    orchestrator
        .orchestrate(OrchestrateOptions::new().with_transcription_callback({
            let transcriptions = transcriptions.clone();
            move |transcript: &str| transcriptions.lock().push(transcript.to_string())
        }))
        .await
        .unwrap();

    content_round(&llm, "You said hello.");
    stt.emit_final_transcript("Hello there.");

    assert!(wait_until(|| orchestrator.turns().len() == 2).await);
    assert_eq!(transcriptions.lock().as_slice(), ["Hello there."]);
    assert_eq!(orchestrator.turns()[1].content, "You said hello.");
}

/// An empty LLM response still finalizes with an empty spoken transcript.
#[tokio::test]
async fn empty_response_still_fires_audio_ended() {
    let harness = Harness::start(|options| options).await;

    harness.llm.push_finished_round(Vec::new());
    harness.orchestrator.send_prompt("Anything?").await.unwrap();

    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);
    assert_eq!(harness.orchestrator.turns()[1].content, "");
    assert!(wait_until(|| harness.audio_ended.lock().len() == 1).await);
    assert_eq!(harness.audio_ended.lock()[0], "");
}

/// Close is graceful and terminal.
#[tokio::test]
async fn close_rejects_further_prompts() {
    let harness = Harness::start(|options| options).await;

    content_round(&harness.llm, "Goodbye.");
    harness.orchestrator.send_prompt("Bye.").await.unwrap();
    assert!(wait_until(|| harness.orchestrator.turns().len() == 2).await);

    harness.orchestrator.close().await.unwrap();
    harness.orchestrator.close().await.unwrap();

    assert!(matches!(
        harness.orchestrator.queue_prompt("too late"),
        Err(OrchestratorError::Closed)
    ));
    assert!(harness.tts.closed.load(Ordering::SeqCst) >= 1);
}

/// Prompts are processed strictly in enqueue order.
#[tokio::test]
async fn prompts_run_in_enqueue_order() {
    let harness = Harness::start(|options| {
        options.with_config(OrchestratorConfig {
            prompt_queue_capacity: 10,
            ..OrchestratorConfig::default()
        })
    })
    .await;

    content_round(&harness.llm, "first answer");
    content_round(&harness.llm, "second answer");
    content_round(&harness.llm, "third answer");
    harness.orchestrator.queue_prompt("one").unwrap();
    harness.orchestrator.queue_prompt("two").unwrap();
    harness.orchestrator.queue_prompt("three").unwrap();

    assert!(wait_until(|| harness.orchestrator.turns().len() == 6).await);
    let contents: Vec<String> = harness
        .orchestrator
        .turns()
        .iter()
        .map(|turn| turn.content.clone())
        .collect();
    assert_eq!(
        contents,
        [
            "one",
            "first answer",
            "two",
            "second answer",
            "three",
            "third answer"
        ]
    );
}
