// ABOUTME: Drives one conversation turn: prompts the agent and relays its events into streams and status.
// ABOUTME: Bounded by a timeout and a shutdown token; every opened stream is stopped exactly once.

use crate::batcher::{StreamBatcher, DEFAULT_DEBOUNCE};
use crate::error::RelayError;
use crate::metrics;
use crate::reaction::ReactionIndicator;
use crate::status::{StatusMap, StatusNotifier};
use crate::stream::StreamController;
use crate::traits::{PostMessageRequest, SlackApi, ThreadRef};
use serde_json::Value;
use slackline_agent::{AgentEvent, AgentHandle, PromptRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Appended to a stream that ends because of an error
pub const ERROR_NOTE: &str = "\n\n_Error: Failed to complete streaming response_";
/// Appended to a stream cut off by the turn timeout
pub const TIMEOUT_NOTE: &str = "\n\n_Stopped: the response took too long._";
/// Appended to a stream cut off by shutdown
pub const SHUTDOWN_NOTE: &str = "\n\n_Stopped: the assistant is restarting._";
/// Posted once when a turn fails
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong processing your message. Please try again.";
/// Posted when the agent finished without producing any text
pub const NO_RESPONSE_TEXT: &str = "I finished without a response. Could you try rephrasing?";

const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(1800);

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Text was streamed and every stream closed cleanly
    Completed { segments: usize, chars: usize },
    /// The agent produced no text; a fallback message was posted
    NoResponse,
    TimedOut,
    Cancelled,
    /// An apology was posted; the message is the underlying error
    Failed(String),
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::NoResponse)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::NoResponse => "no_response",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-turn extras supplied by the platform layer
#[derive(Default)]
pub struct TurnOptions {
    /// Blocks attached to the final stream's stop call
    pub feedback_blocks: Option<Vec<Value>>,
    pub reactions: Option<ReactionIndicator>,
}

/// Failure that ends a turn with an apology
#[derive(Debug)]
enum TurnError {
    Relay(RelayError),
    Agent(String),
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relay(e) => write!(f, "{}", e),
            Self::Agent(msg) => write!(f, "agent error: {}", msg),
        }
    }
}

impl From<RelayError> for TurnError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

enum Ending {
    /// The agent's event stream ended (or failed)
    Drained(Result<(), TurnError>),
    Interrupted(TurnOutcome),
}

/// Mutable bookkeeping for one turn's streams
#[derive(Default)]
struct Segments {
    /// The live stream, if any
    current: Option<StreamBatcher>,
    /// Cumulative text of the current segment
    text: String,
    /// TextEnd seen for `current`; it is closed before any further work
    ended: bool,
    /// Streams opened this turn
    opened: usize,
    /// Characters accepted across all segments
    chars: usize,
    /// Text carried by the final Result event
    result_text: Option<String>,
}

/// Relays agent turns into chat streams.
#[derive(Clone)]
pub struct TurnRelay {
    api: Arc<dyn SlackApi>,
    controller: StreamController,
    status_map: Arc<StatusMap>,
    debounce: Duration,
    turn_timeout: Duration,
    shutdown: CancellationToken,
}

impl TurnRelay {
    pub fn new(api: Arc<dyn SlackApi>, status_map: Arc<StatusMap>) -> Self {
        Self {
            controller: StreamController::new(Arc::clone(&api)),
            api,
            status_map,
            debounce: DEFAULT_DEBOUNCE,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_unfurl(mut self, links: bool, media: bool) -> Self {
        self.controller = self.controller.with_unfurl(links, media);
        self
    }

    /// Cancelling this token stops every running turn
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn status_map(&self) -> Arc<StatusMap> {
        Arc::clone(&self.status_map)
    }

    /// Run one turn to completion. Never returns an error; failures become apologies.
    pub async fn run(
        &self,
        agent: &AgentHandle,
        request: PromptRequest,
        options: TurnOptions,
    ) -> TurnOutcome {
        let started = Instant::now();
        let thread = ThreadRef::new(
            request.context.channel_id.clone(),
            request.context.thread_ts.clone(),
        );
        let status = StatusNotifier::new(
            Arc::clone(&self.api),
            Arc::clone(&self.status_map),
            Some(thread.clone()),
        );
        let guard = status.guard();

        status.begin().await;
        if let Some(reactions) = &options.reactions {
            reactions.begin().await;
        }

        tracing::info!(
            thread = %thread,
            backend = agent.name(),
            session_id = %request.session_id,
            "Turn started"
        );

        let mut segments = Segments::default();
        let deadline = tokio::time::Instant::now() + self.turn_timeout;
        let ending = self
            .relay(agent, &request, &status, &thread, &mut segments, deadline)
            .await;

        let outcome = match ending {
            Ending::Drained(Ok(())) => {
                match self.finalize(&thread, &mut segments, options.feedback_blocks).await {
                    Ok(outcome) => outcome,
                    Err(e) => self.fail(&thread, &mut segments, e).await,
                }
            }
            Ending::Drained(Err(e)) => self.fail(&thread, &mut segments, e).await,
            Ending::Interrupted(outcome) => {
                self.interrupt(agent, &request, &thread, &mut segments, &outcome)
                    .await;
                outcome
            }
        };

        status.clear().await;
        guard.disarm();
        if let Some(reactions) = &options.reactions {
            reactions.complete(outcome.is_success()).await;
        }

        let elapsed = started.elapsed();
        metrics::record_turn(outcome.label(), elapsed);
        tracing::info!(
            thread = %thread,
            outcome = outcome.label(),
            streams = segments.opened,
            chars = segments.chars,
            elapsed_ms = elapsed.as_millis() as u64,
            "Turn finished"
        );
        outcome
    }

    /// Consume the agent's events until the stream ends.
    ///
    /// Timeout and shutdown are only observed between events, so a stream
    /// call in flight always completes and its handle stays accurate.
    async fn relay(
        &self,
        agent: &AgentHandle,
        request: &PromptRequest,
        status: &StatusNotifier,
        thread: &ThreadRef,
        segments: &mut Segments,
        deadline: tokio::time::Instant,
    ) -> Ending {
        let mut events = match agent.prompt(request.clone()).await {
            Ok(events) => events,
            Err(e) => return Ending::Drained(Err(TurnError::Agent(format!("{:#}", e)))),
        };

        loop {
            // Interruptions win over events that are already queued
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ending::Interrupted(TurnOutcome::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Ending::Interrupted(TurnOutcome::TimedOut);
                }
                event = events.recv() => event,
            };
            let Some(event) = next else {
                return Ending::Drained(Ok(()));
            };
            if let Err(e) = self.apply(event, status, thread, segments).await {
                return Ending::Drained(Err(e));
            }
        }
    }

    /// Act on one agent event
    async fn apply(
        &self,
        event: AgentEvent,
        status: &StatusNotifier,
        thread: &ThreadRef,
        segments: &mut Segments,
    ) -> Result<(), TurnError> {
        status.notify_agent(&event).await;

        match event {
            AgentEvent::TextStart { id } => {
                tracing::debug!(thread = %thread, segment = %id, "Text segment started");
                self.close_segment(segments).await?;
            }
            AgentEvent::Text(delta) => {
                if delta.is_empty() {
                    return Ok(());
                }
                if segments.ended {
                    self.close_segment(segments).await?;
                }
                self.push_text(thread, segments, &delta).await?;
            }
            AgentEvent::TextEnd { .. } => {
                if let Some(batcher) = &segments.current {
                    batcher.flush().await;
                    segments.ended = true;
                }
            }
            AgentEvent::ToolStart { name, .. } => {
                metrics::record_tool_used(&name);
                if segments.ended {
                    self.close_segment(segments).await?;
                }
            }
            AgentEvent::Result { text, .. } => {
                segments.result_text = Some(text);
            }
            AgentEvent::Error { code, message, .. } => {
                metrics::record_error("agent_error");
                return Err(TurnError::Agent(format!("{:?}: {}", code, message)));
            }
            AgentEvent::Reasoning(_) | AgentEvent::ToolEnd { .. } | AgentEvent::Custom { .. } => {}
        }

        Ok(())
    }

    /// Add text to the current segment, opening its stream on first use
    async fn push_text(
        &self,
        thread: &ThreadRef,
        segments: &mut Segments,
        delta: &str,
    ) -> Result<(), TurnError> {
        if segments.current.is_none() {
            let handle = self
                .controller
                .start(&thread.channel, Some(&thread.thread_ts), "")
                .await?;
            segments.current = Some(StreamBatcher::new(
                self.controller.clone(),
                handle,
                self.debounce,
            ));
            segments.text.clear();
            segments.ended = false;
            segments.opened += 1;
        }

        segments.text.push_str(delta);
        segments.chars += delta.chars().count();
        if let Some(batcher) = &segments.current {
            batcher.on_fragment(&segments.text).await;
        }
        Ok(())
    }

    /// Flush and stop the live stream without closing blocks
    async fn close_segment(&self, segments: &mut Segments) -> Result<(), TurnError> {
        segments.ended = false;
        segments.text.clear();
        // Dropped only after a clean stop, so a failed finish is still aborted
        if let Some(batcher) = &segments.current {
            batcher.finish(None).await?;
        }
        segments.current = None;
        Ok(())
    }

    /// Normal end of the event stream
    async fn finalize(
        &self,
        thread: &ThreadRef,
        segments: &mut Segments,
        feedback_blocks: Option<Vec<Value>>,
    ) -> Result<TurnOutcome, TurnError> {
        if segments.opened == 0 {
            match segments.result_text.take().filter(|t| !t.trim().is_empty()) {
                Some(text) => self.push_text(thread, segments, &text).await?,
                None => {
                    self.post(thread, NO_RESPONSE_TEXT).await;
                    return Ok(TurnOutcome::NoResponse);
                }
            }
        }

        if let Some(batcher) = &segments.current {
            batcher.finish(feedback_blocks).await?;
        }
        segments.current = None;

        Ok(TurnOutcome::Completed {
            segments: segments.opened,
            chars: segments.chars,
        })
    }

    /// Timeout or shutdown: stop the agent and close what is open
    async fn interrupt(
        &self,
        agent: &AgentHandle,
        request: &PromptRequest,
        thread: &ThreadRef,
        segments: &mut Segments,
        outcome: &TurnOutcome,
    ) {
        let note = match outcome {
            TurnOutcome::TimedOut => TIMEOUT_NOTE,
            _ => SHUTDOWN_NOTE,
        };
        tracing::warn!(thread = %thread, outcome = outcome.label(), "Turn interrupted");

        if let Err(e) = agent.cancel(&request.session_id).await {
            tracing::warn!(thread = %thread, error = %e, "Failed to cancel agent prompt");
        }

        match segments.current.take() {
            Some(batcher) => batcher.abort(note).await,
            None if segments.opened == 0 => self.post(thread, note.trim_start()).await,
            None => {}
        }
    }

    /// Top-level failure: close the stream with a note and apologise once
    async fn fail(&self, thread: &ThreadRef, segments: &mut Segments, error: TurnError) -> TurnOutcome {
        match &error {
            TurnError::Relay(e) if e.is_protocol_violation() => {
                tracing::error!(thread = %thread, error = %e, "Stream protocol violation");
                metrics::record_error("protocol_violation");
            }
            _ => {
                tracing::error!(thread = %thread, error = %error, "Turn failed");
                metrics::record_error("turn_failed");
            }
        }

        if let Some(batcher) = segments.current.take() {
            batcher.abort(ERROR_NOTE).await;
        }
        self.post(thread, APOLOGY_TEXT).await;
        TurnOutcome::Failed(error.to_string())
    }

    /// Post a plain threaded message; failures are only logged
    async fn post(&self, thread: &ThreadRef, text: &str) {
        let req = PostMessageRequest::threaded(thread, text);
        if let Err(e) = self.api.post_message(&req).await {
            tracing::error!(thread = %thread, error = %e, "Failed to post message");
        }
    }
}

impl std::fmt::Debug for TurnRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRelay")
            .field("debounce", &self.debounce)
            .field("turn_timeout", &self.turn_timeout)
            .finish_non_exhaustive()
    }
}
