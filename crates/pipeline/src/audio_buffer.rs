//! Audio buffer
//!
//! Same shape as the text buffer, but the items are a sum of audio chunks
//! and named marks, the consumer can be paused, and marks carry an
//! acknowledgement path: a mark is yielded only after every preceding audio
//! chunk, and `mark_played` records the device's acknowledgement that
//! playback passed it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// One item in the playback queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioItem {
    Audio(Vec<u8>),
    Mark(String),
}

#[derive(Default)]
struct AudioInner {
    items: Vec<AudioItem>,
    consumed: usize,
    done: bool,
    final_transcript: String,
    paused: bool,
    /// Marks yielded to the consumer but not yet acknowledged.
    outstanding_marks: Vec<String>,
    epoch: u64,
}

struct Shared {
    inner: Mutex<AudioInner>,
    signal: watch::Sender<()>,
}

/// Shared playback queue between the TTS output and the audio device feed.
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct AudioBuffer {
    shared: Arc<Shared>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(AudioInner::default()),
                signal,
            }),
        }
    }

    /// Append an audio chunk and wake the consumer.
    pub fn add_audio(&self, audio: Vec<u8>) {
        let mut inner = self.shared.inner.lock();
        inner.items.push(AudioItem::Audio(audio));
        self.shared.signal.send_replace(());
    }

    /// Append a named mark. It is yielded only after all audio added before
    /// it has been yielded.
    pub fn add_mark(&self, name: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        inner.items.push(AudioItem::Mark(name.into()));
        self.shared.signal.send_replace(());
    }

    /// Signal end-of-stream, carrying the transcript of what was spoken.
    pub fn finish(&self, transcript: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        inner.done = true;
        inner.final_transcript = transcript.into();
        self.shared.signal.send_replace(());
    }

    /// While paused the consumer blocks even if items are available.
    pub fn pause(&self) {
        let mut inner = self.shared.inner.lock();
        inner.paused = true;
        self.shared.signal.send_replace(());
    }

    pub fn unpause(&self) {
        let mut inner = self.shared.inner.lock();
        inner.paused = false;
        self.shared.signal.send_replace(());
    }

    pub fn is_paused(&self) -> bool {
        self.shared.inner.lock().paused
    }

    /// Acknowledge that the named mark passed the playback head. Returns
    /// whether the mark was outstanding.
    pub fn mark_played(&self, name: &str) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(position) = inner.outstanding_marks.iter().position(|m| m == name) else {
            return false;
        };
        inner.outstanding_marks.remove(position);
        self.shared.signal.send_replace(());
        true
    }

    pub fn outstanding_marks(&self) -> usize {
        self.shared.inner.lock().outstanding_marks.len()
    }

    pub fn final_transcript(&self) -> String {
        self.shared.inner.lock().final_transcript.clone()
    }

    pub fn is_done(&self) -> bool {
        self.shared.inner.lock().done
    }

    /// Items added but not yet consumed.
    pub fn pending(&self) -> usize {
        let inner = self.shared.inner.lock();
        inner.items.len() - inner.consumed
    }

    /// Drop pending items and reopen for the next turn. Any consumer bound
    /// to the previous epoch wakes and returns. The pause flag is preserved.
    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock();
        inner.epoch += 1;
        inner.items.clear();
        inner.consumed = 0;
        inner.done = false;
        inner.final_transcript.clear();
        inner.outstanding_marks.clear();
        self.shared.signal.send_replace(());
    }

    /// Bind a consumer to the buffer's current epoch.
    pub fn reader(&self) -> AudioReader {
        AudioReader {
            epoch: self.shared.inner.lock().epoch,
            rx: self.shared.signal.subscribe(),
            shared: self.shared.clone(),
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy consumer handle, bound to one buffer epoch.
pub struct AudioReader {
    shared: Arc<Shared>,
    epoch: u64,
    rx: watch::Receiver<()>,
}

impl AudioReader {
    /// Next item in FIFO order. Blocks while the buffer is empty and not
    /// done, and while paused. Returns `None` once drained and finished, or
    /// when the buffer was cleared out from under this consumer.
    pub async fn next(&mut self) -> Option<AudioItem> {
        loop {
            self.rx.borrow_and_update();
            {
                let mut inner = self.shared.inner.lock();
                if inner.epoch != self.epoch {
                    return None;
                }
                if !inner.paused {
                    if inner.consumed < inner.items.len() {
                        let item = inner.items[inner.consumed].clone();
                        inner.consumed += 1;
                        if let AudioItem::Mark(name) = &item {
                            inner.outstanding_marks.push(name.clone());
                        }
                        return Some(item);
                    }
                    if inner.done {
                        return None;
                    }
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn marks_are_yielded_after_preceding_audio() {
        let buffer = AudioBuffer::new();
        buffer.add_audio(vec![1]);
        buffer.add_audio(vec![2]);
        buffer.add_mark("end");
        buffer.finish("spoken text");

        let mut reader = buffer.reader();
        assert_eq!(reader.next().await, Some(AudioItem::Audio(vec![1])));
        assert_eq!(reader.next().await, Some(AudioItem::Audio(vec![2])));
        assert_eq!(reader.next().await, Some(AudioItem::Mark("end".to_string())));
        assert_eq!(reader.next().await, None);
        assert_eq!(buffer.final_transcript(), "spoken text");
    }

    #[tokio::test]
    async fn paused_consumer_blocks_even_with_items_available() {
        let buffer = AudioBuffer::new();
        buffer.add_audio(vec![1]);
        buffer.pause();

        let mut reader = buffer.reader();
        let blocked = timeout(Duration::from_millis(20), reader.next()).await;
        assert!(blocked.is_err(), "paused buffer should block the consumer");

        buffer.unpause();
        assert_eq!(reader.next().await, Some(AudioItem::Audio(vec![1])));
    }

    #[tokio::test]
    async fn mark_played_clears_the_outstanding_mark() {
        let buffer = AudioBuffer::new();
        buffer.add_mark("m1");
        buffer.finish("");

        let mut reader = buffer.reader();
        assert_eq!(reader.next().await, Some(AudioItem::Mark("m1".to_string())));
        assert_eq!(buffer.outstanding_marks(), 1);
        assert!(buffer.mark_played("m1"));
        assert_eq!(buffer.outstanding_marks(), 0);
        assert!(!buffer.mark_played("m1"), "double ack is a no-op");
    }

    #[tokio::test]
    async fn clear_retires_the_consumer_and_reopens() {
        let buffer = AudioBuffer::new();
        buffer.add_audio(vec![1]);
        let mut reader = buffer.reader();
        assert!(reader.next().await.is_some());

        buffer.clear();
        assert_eq!(reader.next().await, None);
        assert!(!buffer.is_done(), "clear reopens the buffer");

        buffer.add_audio(vec![9]);
        buffer.finish("");
        let mut reader = buffer.reader();
        assert_eq!(reader.next().await, Some(AudioItem::Audio(vec![9])));
        assert_eq!(reader.next().await, None);
    }

    #[tokio::test]
    async fn clear_while_consumer_waits_does_not_deadlock() {
        let buffer = AudioBuffer::new();
        let mut reader = buffer.reader();

        let waiter = tokio::spawn(async move { reader.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.clear();

        let result = timeout(Duration::from_millis(100), waiter).await;
        assert_eq!(result.unwrap().unwrap(), None);
    }
}
