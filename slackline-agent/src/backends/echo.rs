// ABOUTME: Echo backend - a minimal tool dispatcher that streams the prompt back word by word.
// ABOUTME: Recognises "join <channel>" and routes it through the registered joinChannel tool.

use crate::event::{AgentEvent, ErrorCode};
use crate::tool::ToolSet;
use crate::traits::{AgentBackend, PromptRequest};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

const JOIN_TOOL: &str = "joinChannel";

/// Demo backend that echoes the prompt and can call the join-channel tool.
pub struct EchoBackend {
    tools: ToolSet,
    chunk_delay: Duration,
    running: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl EchoBackend {
    pub fn new(tools: ToolSet) -> Self {
        Self {
            tools,
            chunk_delay: Duration::from_millis(30),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Delay between streamed words
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Prompts whose script is still running
    pub fn running_prompts(&self) -> usize {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl AgentBackend for EchoBackend {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn prompt<'a>(
        &'a self,
        request: &'a PromptRequest,
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        Box::pin(async move {
            let (tx, mut rx) = mpsc::channel::<AgentEvent>(64);
            let tools = self.tools.clone();
            let delay = self.chunk_delay;
            let request_owned = request.clone();
            let running = Arc::clone(&self.running);
            let session_id = request.session_id.clone();

            {
                // Held across the spawn so the task cannot remove its entry before it exists
                let mut guard = self.running.lock().unwrap_or_else(|e| e.into_inner());
                let task = tokio::spawn(async move {
                    run_script(tools, delay, request_owned, tx).await;
                    running
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&session_id);
                });
                guard.insert(request.session_id.clone(), task.abort_handle());
            }

            let stream = stream::poll_fn(move |cx| rx.poll_recv(cx));
            Ok(Box::pin(stream) as BoxStream<'a, AgentEvent>)
        })
    }

    fn cancel<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let handle = self
                .running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(session_id);
            if let Some(handle) = handle {
                tracing::info!(session_id, "Cancelling echo prompt");
                handle.abort();
            }
            Ok(())
        })
    }
}

async fn run_script(
    tools: ToolSet,
    delay: Duration,
    request: PromptRequest,
    tx: mpsc::Sender<AgentEvent>,
) {
    let text = request.text.trim();

    let _ = tx
        .send(AgentEvent::Reasoning(format!("Considering: {}", text)))
        .await;

    let reply = match parse_join_command(text, request.context.viewing_channel_id.as_deref()) {
        Some(Ok(channel_id)) if tools.get(JOIN_TOOL).is_some() => {
            let call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
            let input = json!({ "channel_id": channel_id });
            let _ = tx
                .send(AgentEvent::ToolStart {
                    id: call_id.clone(),
                    name: JOIN_TOOL.to_string(),
                    input: input.clone(),
                })
                .await;

            let started = Instant::now();
            let outcome = tools.call(&request.context, &call_id, JOIN_TOOL, input).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (output, success) = match outcome {
                Ok(output) => {
                    let success = output["success"].as_bool().unwrap_or(false);
                    (output, success)
                }
                Err(e) => (json!({ "success": false, "error": e.to_string() }), false),
            };
            let message = output["message"]
                .as_str()
                .unwrap_or("The join request finished.")
                .to_string();

            let _ = tx
                .send(AgentEvent::ToolEnd {
                    id: call_id,
                    name: JOIN_TOOL.to_string(),
                    output,
                    success,
                    duration_ms,
                })
                .await;
            message
        }
        Some(Ok(_)) => "I don't have a tool for joining channels here.".to_string(),
        Some(Err(hint)) => hint,
        None => format!("You said: {}", text),
    };

    if reply.is_empty() {
        let _ = tx
            .send(AgentEvent::Error {
                code: ErrorCode::BackendError,
                message: "Nothing to echo".to_string(),
                recoverable: false,
            })
            .await;
        return;
    }

    let segment = "echo-1".to_string();
    let _ = tx
        .send(AgentEvent::TextStart {
            id: segment.clone(),
        })
        .await;
    for word in reply.split_inclusive(' ') {
        if tx.send(AgentEvent::Text(word.to_string())).await.is_err() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
    let _ = tx.send(AgentEvent::TextEnd { id: segment }).await;
    let _ = tx
        .send(AgentEvent::Result {
            text: reply,
            usage: None,
            metadata: json!({ "backend": "echo" }),
        })
        .await;
}

/// Parse `join <#C123|name>`, `join C123` or `join this channel`.
///
/// Returns `None` when the text is not a join command and `Some(Err(hint))`
/// when it is one but names no usable channel.
pub fn parse_join_command(text: &str, viewing_channel: Option<&str>) -> Option<Result<String, String>> {
    let rest = text
        .strip_prefix("join")
        .or_else(|| text.strip_prefix("Join"))?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();

    if target.is_empty() || target.eq_ignore_ascii_case("this channel") {
        return Some(
            viewing_channel
                .map(str::to_string)
                .ok_or_else(|| "Which channel should I join?".to_string()),
        );
    }

    if let Some(mention) = target.strip_prefix("<#").and_then(|t| t.strip_suffix('>')) {
        let id = mention.split('|').next().unwrap_or_default();
        if !id.is_empty() {
            return Some(Ok(id.to_string()));
        }
    }

    let candidate = target.split_whitespace().next().unwrap_or_default();
    if candidate.len() > 1
        && (candidate.starts_with('C') || candidate.starts_with('G'))
        && candidate.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Some(Ok(candidate.to_string()));
    }

    Some(Err(format!(
        "I couldn't find a channel id in \"{}\". Try mentioning the channel.",
        target
    )))
}
