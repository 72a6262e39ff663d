// ABOUTME: Debounced batcher that coalesces cumulative text snapshots into few append calls.
// ABOUTME: The producer path and the timer task serialise on one async mutex; appends stay ordered.

use crate::error::RelayError;
use crate::metrics;
use crate::stream::{StopOptions, StreamController, StreamHandle};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default debounce window between the last fragment and the flush
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Counters kept for one stream handle's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Snapshots that carried new text
    pub fragments: usize,
    /// Successful append calls
    pub appends: usize,
    /// Characters delivered through appends
    pub chars: usize,
    /// Flushes whose append failed
    pub failed_flushes: usize,
}

struct BatchState {
    handle: StreamHandle,
    /// Everything accepted so far; always a prefix of the latest snapshot
    seen: String,
    /// Accepted but not yet appended
    pending: String,
    timer: Option<JoinHandle<()>>,
    stats: BatchStats,
}

struct Inner {
    controller: StreamController,
    window: Duration,
    state: Mutex<BatchState>,
}

/// Coalesces snapshots for one open stream handle.
///
/// `on_fragment` receives the full text produced so far; only the part past
/// what was already accepted is buffered. A single debounce timer flushes the
/// buffer once fragments stop arriving for `window`.
#[derive(Clone)]
pub struct StreamBatcher {
    inner: Arc<Inner>,
}

impl StreamBatcher {
    pub fn new(controller: StreamController, handle: StreamHandle, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                controller,
                window,
                state: Mutex::new(BatchState {
                    handle,
                    seen: String::new(),
                    pending: String::new(),
                    timer: None,
                    stats: BatchStats::default(),
                }),
            }),
        }
    }

    /// Accept a cumulative snapshot and re-arm the debounce timer when it adds text.
    pub async fn on_fragment(&self, snapshot: &str) {
        let mut state = self.inner.state.lock().await;

        let delta = if let Some(rest) = snapshot.strip_prefix(state.seen.as_str()) {
            rest.to_string()
        } else {
            // Producer rewrote earlier text; fall back to the unseen tail by length
            tracing::warn!(
                channel = %state.handle.channel,
                seen_len = state.seen.len(),
                snapshot_len = snapshot.len(),
                "Snapshot does not extend accepted text, appending by offset"
            );
            let tail = tail_from(snapshot, state.seen.len()).to_string();
            state.seen = snapshot[..snapshot.len() - tail.len()].to_string();
            tail
        };

        if delta.is_empty() {
            return;
        }

        state.seen.push_str(&delta);
        state.pending.push_str(&delta);
        state.stats.fragments += 1;

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(&self.inner);
        let window = self.inner.window;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            flush_from_timer(weak).await;
        }));
    }

    /// Send whatever is buffered as one append. Failures are logged, not returned.
    pub async fn flush(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.inner.flush_locked(&mut state).await;
    }

    /// Flush, then stop the stream with optional closing blocks.
    ///
    /// The stop error, if any, is returned so the turn can report it.
    pub async fn finish(&self, blocks: Option<Vec<Value>>) -> Result<BatchStats, RelayError> {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.inner.flush_locked(&mut state).await;

        let opts = StopOptions {
            final_text: None,
            blocks,
        };
        let stats = state.stats;
        let result = self.inner.controller.stop(&mut state.handle, opts).await;

        tracing::info!(
            channel = %state.handle.channel,
            ts = %state.handle.ts,
            fragments = stats.fragments,
            appends = stats.appends,
            chars = stats.chars,
            failed_flushes = stats.failed_flushes,
            undelivered = state.pending.len(),
            "Stream finished"
        );

        result.map(|_| stats)
    }

    /// Flush, then stop with an explanatory note. Secondary failures are only logged.
    pub async fn abort(&self, note: &str) {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.inner.flush_locked(&mut state).await;

        if let Err(e) = self
            .inner
            .controller
            .stop(&mut state.handle, StopOptions::with_text(note))
            .await
        {
            tracing::warn!(
                channel = %state.handle.channel,
                error = %e,
                "Failed to stop stream after abort"
            );
        }
    }

    /// Current handle, including its refreshed `ts` and state
    pub async fn handle(&self) -> StreamHandle {
        self.inner.state.lock().await.handle.clone()
    }

    pub async fn stats(&self) -> BatchStats {
        self.inner.state.lock().await.stats
    }

    /// Text accepted so far, delivered or not
    pub async fn accepted(&self) -> String {
        self.inner.state.lock().await.seen.clone()
    }
}

impl Inner {
    async fn flush_locked(&self, state: &mut BatchState) {
        if state.pending.is_empty() {
            return;
        }

        match self.controller.append(&mut state.handle, &state.pending).await {
            Ok(()) => {
                state.stats.appends += 1;
                state.stats.chars += state.pending.chars().count();
                state.pending.clear();
            }
            Err(e) => {
                state.stats.failed_flushes += 1;
                metrics::record_flush_failure();
                tracing::warn!(
                    channel = %state.handle.channel,
                    ts = %state.handle.ts,
                    buffered = state.pending.len(),
                    error = %e,
                    "Failed to flush stream buffer, keeping text for the next flush"
                );
            }
        }
    }
}

async fn flush_from_timer(inner: Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = inner.state.lock().await;
    // This task is the armed timer; drop its handle without aborting ourselves
    state.timer.take();
    inner.flush_locked(&mut state).await;
}

/// Suffix of `text` starting at the first char boundary at or after `offset`
fn tail_from(text: &str, offset: usize) -> &str {
    if offset >= text.len() {
        return "";
    }
    let start = (offset..=text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_from_ascii() {
        assert_eq!(tail_from("Hello world", 6), "world");
        assert_eq!(tail_from("Hello", 5), "");
        assert_eq!(tail_from("Hi", 10), "");
    }

    #[test]
    fn test_tail_from_respects_char_boundaries() {
        // 'é' is two bytes; offset 2 lands inside it
        assert_eq!(tail_from("héllo", 2), "llo");
    }
}
