//! Built-in orchestration tools
//!
//! Tools that let the LLM steer the orchestrator itself: toggling recording
//! ("listening") and speaking ("muting"). They capture only the weak
//! orchestrator handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use duplex_core::ParameterSpec;
use duplex_tools::{FnTool, Tool};
use serde::Deserialize;

use crate::interruption::OrchestratorControl;
use crate::orchestrator::OrchestratorHandle;

const TOOL_REPLY: &str = "Success. Respond with a very short phrase";

#[derive(Deserialize)]
struct RecordingParams {
    is_recording: bool,
}

#[derive(Deserialize)]
struct SpeakingParams {
    is_speaking: bool,
}

pub(crate) fn orchestration_tools(control: OrchestratorHandle) -> Vec<Arc<dyn Tool>> {
    let recording_control = {
        let control = control.clone();
        FnTool::new(
            "recording_control",
            "Turn on or off sound recording, might be referred to as 'listening'",
            BTreeMap::from([(
                "is_recording".to_string(),
                ParameterSpec::boolean("Whether to record or not"),
            )]),
            move |params: RecordingParams| {
                control.set_always_recording(params.is_recording);
                Ok(TOOL_REPLY.to_string())
            },
        )
    };

    let speaking_control = FnTool::new(
        "speaking_control",
        "Turn off agent's speaking ability. Might be referred to as 'muting'",
        BTreeMap::from([(
            "is_speaking".to_string(),
            ParameterSpec::boolean("Whether to speak or not"),
        )]),
        move |params: SpeakingParams| {
            control.set_speaking(params.is_speaking);
            Ok(TOOL_REPLY.to_string())
        },
    );

    vec![Arc::new(recording_control), Arc::new(speaking_control)]
}
