// ABOUTME: Core AgentBackend trait that all backends implement.
// ABOUTME: Defines the prompt request shape and streaming prompt execution interface.

use crate::{AgentEvent, ToolContext};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// A single prompt for one conversation turn
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// Key of this one prompt, unique even within a thread
    /// (e.g. "C123:1700000000.000100:9f1c...")
    pub session_id: String,
    /// User text for this turn
    pub text: String,
    /// Conversation identity handed to tools
    pub context: ToolContext,
}

impl PromptRequest {
    pub fn new(text: impl Into<String>, context: ToolContext) -> Self {
        let session_id = format!(
            "{}:{}:{}",
            context.channel_id,
            context.thread_ts,
            uuid::Uuid::new_v4().simple()
        );
        Self {
            session_id,
            text: text.into(),
            context,
        }
    }
}

/// Core trait that all agent backends implement.
///
/// The backend acts as the tool dispatcher: it runs the model/tool loop and
/// reports everything it does as a stream of [`AgentEvent`]s.
pub trait AgentBackend {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Send a prompt and receive a stream of events
    ///
    /// The returned stream emits events as they occur (text chunks, tool calls,
    /// etc.) and completes with a Result or Error event.
    fn prompt<'a>(
        &'a self,
        request: &'a PromptRequest,
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>>;

    /// Cancel an in-progress prompt
    fn cancel<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;
}
