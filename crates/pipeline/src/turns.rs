//! Turns store
//!
//! Ordered conversation history plus the active-turn slot. The active turn
//! is the head of in-flight work; it joins the ordered sequence only when it
//! is finalized. One mutex guards the sequence, the slot, and the
//! interruption log; iteration yields snapshots.

use duplex_core::{Interruption, Turn, TurnStage};
use parking_lot::Mutex;
use tracing::warn;

#[derive(Default)]
struct TurnsInner {
    turns: Vec<Turn>,
    active: Option<Turn>,
}

/// Mutex-guarded conversation history with an active-turn slot.
#[derive(Default)]
pub struct TurnsStore {
    inner: Mutex<TurnsInner>,
}

impl TurnsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last completed turn, if any.
    pub fn peek(&self) -> Option<Turn> {
        self.inner.lock().turns.last().cloned()
    }

    pub fn push(&self, turn: Turn) {
        self.inner.lock().turns.push(turn);
    }

    pub fn pop(&self) -> Option<Turn> {
        self.inner.lock().turns.pop()
    }

    /// Remove all completed turns. The active slot is untouched.
    pub fn clear(&self) {
        self.inner.lock().turns.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().turns.is_empty()
    }

    /// Visit completed turns from earliest to latest. The visitor sees a
    /// snapshot; returning `false` stops the walk.
    pub fn values(&self, mut visit: impl FnMut(&Turn) -> bool) {
        let snapshot = self.snapshot();
        for turn in &snapshot {
            if !visit(turn) {
                return;
            }
        }
    }

    /// Visit completed turns from latest to earliest.
    pub fn rvalues(&self, mut visit: impl FnMut(&Turn) -> bool) {
        let snapshot = self.snapshot();
        for turn in snapshot.iter().rev() {
            if !visit(turn) {
                return;
            }
        }
    }

    /// Snapshot of the completed sequence.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.inner.lock().turns.clone()
    }

    /// Snapshot of the active turn, if one is in flight.
    pub fn active_turn(&self) -> Option<Turn> {
        self.inner.lock().active.clone()
    }

    /// Install a new active turn. At most one turn may be active; a leftover
    /// occupant is dropped with a warning.
    pub fn push_active(&self, turn: Turn) {
        let mut inner = self.inner.lock();
        if inner.active.is_some() {
            warn!("replacing an active turn that was never finalized");
        }
        inner.active = Some(turn);
    }

    /// Replace the active turn wholesale.
    pub fn update_active(&self, turn: Turn) {
        self.inner.lock().active = Some(turn);
    }

    /// Mutate the active turn in place. Returns `None` when no turn is
    /// active.
    pub fn with_active<R>(&self, mutate: impl FnOnce(&mut Turn) -> R) -> Option<R> {
        self.inner.lock().active.as_mut().map(mutate)
    }

    /// Monotonically advance the active turn's stage.
    pub fn advance_active_stage(&self, stage: TurnStage) -> bool {
        self.with_active(|turn| turn.advance_stage(stage)).unwrap_or(false)
    }

    /// Set the cancelled flag on the active turn. Returns whether a turn was
    /// actually cancelled (false when none is active or it already was).
    pub fn cancel_active(&self) -> bool {
        self.with_active(|turn| {
            if turn.cancelled {
                false
            } else {
                turn.cancelled = true;
                true
            }
        })
        .unwrap_or(false)
    }

    pub fn active_cancelled(&self) -> bool {
        self.inner.lock().active.as_ref().is_some_and(|turn| turn.cancelled)
    }

    /// Promote the active turn into the completed sequence and empty the
    /// slot. Its stage is forced to `Done`. Returns the promoted turn.
    pub fn finalize_active(&self) -> Option<Turn> {
        let mut inner = self.inner.lock();
        let mut turn = inner.active.take()?;
        turn.stage = TurnStage::Done;
        inner.turns.push(turn.clone());
        Some(turn)
    }

    /// Record an interruption on the active turn. Returns whether a turn was
    /// active to receive it.
    pub fn add_interruption(&self, interruption: Interruption) -> bool {
        self.with_active(|turn| turn.interruptions.push(interruption))
            .is_some()
    }

    /// Mutate the interruption with the given id on the active turn.
    pub fn update_interruption(&self, id: i64, mutate: impl FnOnce(&mut Interruption)) -> bool {
        let mut inner = self.inner.lock();
        let Some(active) = inner.active.as_mut() else {
            return false;
        };
        match active.interruptions.iter_mut().find(|i| i.id == id) {
            Some(interruption) => {
                mutate(interruption);
                true
            }
            None => false,
        }
    }
}
