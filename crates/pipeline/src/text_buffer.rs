//! Text buffer
//!
//! Append-only sequence of string chunks with a done flag. Multiple
//! producers may add chunks concurrently; a single lazy consumer drains them
//! in FIFO order, blocking while the buffer is empty and not finished.
//!
//! `clear` reopens the buffer for the next turn: it retires the current
//! consumer by bumping an epoch and rewinds the consumed cursor, all under
//! the same lock that guards the chunks, so a chunk added after the reopen
//! is never lost.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

#[derive(Default)]
struct TextInner {
    chunks: Vec<String>,
    consumed: usize,
    done: bool,
    epoch: u64,
}

struct Shared {
    inner: Mutex<TextInner>,
    signal: watch::Sender<()>,
}

/// Shared chunked-string queue between the LLM driver and the TTS feed.
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct TextBuffer {
    shared: Arc<Shared>,
}

impl TextBuffer {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(TextInner::default()),
                signal,
            }),
        }
    }

    /// Append a chunk and wake the consumer.
    pub fn add_chunk(&self, chunk: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        inner.chunks.push(chunk.into());
        self.shared.signal.send_replace(());
    }

    /// Signal end-of-stream. The consumer drains what remains, then stops.
    pub fn finish(&self) {
        let mut inner = self.shared.inner.lock();
        inner.done = true;
        self.shared.signal.send_replace(());
    }

    /// Drop pending content and reopen for the next turn. Any consumer bound
    /// to the previous epoch wakes and returns.
    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock();
        inner.epoch += 1;
        inner.chunks.clear();
        inner.consumed = 0;
        inner.done = false;
        self.shared.signal.send_replace(());
    }

    pub fn is_done(&self) -> bool {
        self.shared.inner.lock().done
    }

    /// Chunks added but not yet consumed.
    pub fn pending(&self) -> usize {
        let inner = self.shared.inner.lock();
        inner.chunks.len() - inner.consumed
    }

    /// Bind a consumer to the buffer's current epoch. At most one consumer
    /// should be live per epoch.
    pub fn reader(&self) -> TextReader {
        TextReader {
            epoch: self.shared.inner.lock().epoch,
            rx: self.shared.signal.subscribe(),
            shared: self.shared.clone(),
        }
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy consumer handle, bound to one buffer epoch.
pub struct TextReader {
    shared: Arc<Shared>,
    epoch: u64,
    rx: watch::Receiver<()>,
}

impl TextReader {
    /// Next chunk in FIFO order. Blocks while the buffer is empty and not
    /// done. Returns `None` once the buffer is drained and finished, or when
    /// the buffer was cleared out from under this consumer.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            // Mark the signal seen before inspecting state so a producer
            // arriving in between still trips the next wait.
            self.rx.borrow_and_update();
            {
                let mut inner = self.shared.inner.lock();
                if inner.epoch != self.epoch {
                    return None;
                }
                if inner.consumed < inner.chunks.len() {
                    let chunk = inner.chunks[inner.consumed].clone();
                    inner.consumed += 1;
                    return Some(chunk);
                }
                if inner.done {
                    return None;
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
