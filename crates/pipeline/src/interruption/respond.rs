//! Interruption responses
//!
//! Maps a classification onto control actions.

use duplex_core::{InterruptionKind, TurnRole};

use super::OrchestratorControl;
use crate::OrchestratorError;

/// Act on a classified interruption.
pub(super) async fn respond(
    kind: InterruptionKind,
    prompt: &str,
    control: &dyn OrchestratorControl,
) -> Result<(), OrchestratorError> {
    match kind {
        InterruptionKind::Continuation => {
            let turns = control.turns();

            // Walk back to the last user turn, counting the turns after it.
            let mut after_last_user = None;
            let mut walked = 0usize;
            turns.rvalues(|turn| {
                if turn.role == TurnRole::User {
                    after_last_user = Some(walked);
                    false
                } else {
                    walked += 1;
                    true
                }
            });

            // History surgery before cancellation: the cancelled turn's
            // finalization must not land between the pops.
            let requeued = match after_last_user {
                Some(count) => {
                    for _ in 0..count {
                        turns.pop();
                    }
                    match turns.pop() {
                        Some(last_user) => format!("{} {}", last_user.content, prompt),
                        None => prompt.to_string(),
                    }
                }
                None => prompt.to_string(),
            };
            control.queue_prompt(&requeued)?;
            control.cancel_turn();
            Ok(())
        }
        InterruptionKind::Clarification => {
            control.cancel_turn();
            control.queue_prompt(prompt)?;
            Ok(())
        }
        InterruptionKind::Cancellation => {
            control.cancel_turn();
            Ok(())
        }
        InterruptionKind::Ignorable | InterruptionKind::Repetition | InterruptionKind::Noise => {
            Ok(())
        }
        InterruptionKind::Action => control.call_tool_with_prompt(prompt).await,
        InterruptionKind::NewPrompt => {
            control.queue_prompt(prompt)?;
            Ok(())
        }
    }
}
