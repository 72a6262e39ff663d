// ABOUTME: Stream lifecycle controller - owns the start/append/stop protocol against chat streams.
// ABOUTME: Enforces the Unopened -> Open -> Closed state machine before any transport call.

use crate::error::RelayError;
use crate::metrics;
use crate::traits::{AppendStreamRequest, SlackApi, StartStreamRequest, StopStreamRequest};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a streamed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unopened => write!(f, "unopened"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Identifies one streamed message. `ts` is the append target while Open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub ts: String,
    pub state: StreamState,
}

impl StreamHandle {
    /// A handle that has not been started yet
    pub fn unopened(channel: impl Into<String>, thread_ts: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts,
            ts: String::new(),
            state: StreamState::Unopened,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }
}

/// Optional payload for the closing call
#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub final_text: Option<String>,
    pub blocks: Option<Vec<Value>>,
}

impl StopOptions {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            final_text: Some(text.into()),
            blocks: None,
        }
    }

    pub fn with_blocks(blocks: Vec<Value>) -> Self {
        Self {
            final_text: None,
            blocks: Some(blocks),
        }
    }
}

/// Drives chat.startStream / chat.appendStream / chat.stopStream.
#[derive(Clone)]
pub struct StreamController {
    api: Arc<dyn SlackApi>,
    unfurl_links: bool,
    unfurl_media: bool,
}

impl StreamController {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self {
            api,
            unfurl_links: false,
            unfurl_media: false,
        }
    }

    pub fn with_unfurl(mut self, links: bool, media: bool) -> Self {
        self.unfurl_links = links;
        self.unfurl_media = media;
        self
    }

    /// Open a new streamed message. Failures are not retried.
    pub async fn start(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        initial_text: &str,
    ) -> Result<StreamHandle, RelayError> {
        let req = StartStreamRequest {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            markdown_text: (!initial_text.is_empty()).then(|| initial_text.to_string()),
            unfurl_links: Some(self.unfurl_links),
            unfurl_media: Some(self.unfurl_media),
        };

        let resp = self.api.start_stream(&req).await.map_err(|e| {
            metrics::record_stream_failure("start");
            e
        })?;

        metrics::record_stream_opened();
        tracing::debug!(channel = %resp.channel, ts = %resp.ts, "Stream opened");

        Ok(StreamHandle {
            channel: resp.channel,
            thread_ts: thread_ts.map(str::to_string),
            ts: resp.ts,
            state: StreamState::Open,
        })
    }

    /// Append text to an open stream. The response's `ts` becomes the next target.
    pub async fn append(&self, handle: &mut StreamHandle, text: &str) -> Result<(), RelayError> {
        if !handle.is_open() {
            tracing::error!(
                channel = %handle.channel,
                state = %handle.state,
                "Append attempted on a stream that is not open"
            );
            return Err(RelayError::ProtocolViolation {
                operation: "append",
                state: handle.state,
            });
        }

        let req = AppendStreamRequest {
            channel: handle.channel.clone(),
            ts: handle.ts.clone(),
            markdown_text: text.to_string(),
        };

        let resp = self.api.append_stream(&req).await.map_err(|e| {
            metrics::record_stream_failure("append");
            e
        })?;

        if !resp.ts.is_empty() {
            handle.ts = resp.ts;
        }
        metrics::record_append(text.chars().count());
        Ok(())
    }

    /// Close the stream. No-op once closed; always leaves the handle Closed.
    pub async fn stop(&self, handle: &mut StreamHandle, opts: StopOptions) -> Result<(), RelayError> {
        match handle.state {
            StreamState::Closed => return Ok(()),
            StreamState::Unopened => {
                tracing::error!(channel = %handle.channel, "Stop attempted on a stream that was never opened");
                return Err(RelayError::ProtocolViolation {
                    operation: "stop",
                    state: handle.state,
                });
            }
            StreamState::Open => {}
        }

        let req = StopStreamRequest {
            channel: handle.channel.clone(),
            ts: handle.ts.clone(),
            markdown_text: opts.final_text,
            blocks: opts.blocks,
        };

        handle.state = StreamState::Closed;
        self.api.stop_stream(&req).await.map_err(|e| {
            metrics::record_stream_failure("stop");
            e
        })?;

        tracing::debug!(channel = %handle.channel, ts = %handle.ts, "Stream closed");
        Ok(())
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("unfurl_links", &self.unfurl_links)
            .field("unfurl_media", &self.unfurl_media)
            .finish_non_exhaustive()
    }
}
