// ABOUTME: Maps agent lifecycle and tool events to transient "is doing X..." assistant status text.
// ABOUTME: The map is validated at construction; status calls are best effort and cleared on exit.

use crate::error::ConfigError;
use crate::metrics;
use crate::traits::{SetStatusRequest, SlackApi, ThreadRef};
use slackline_agent::{AgentEvent, EventKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Ephemeral description of what the agent is doing right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub kind: EventKind,
    pub tool_name: Option<String>,
}

impl StatusEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            tool_name: None,
        }
    }

    pub fn tool(kind: EventKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            tool_name: Some(name.into()),
        }
    }
}

impl From<&AgentEvent> for StatusEvent {
    fn from(event: &AgentEvent) -> Self {
        Self {
            kind: event.kind(),
            tool_name: event.tool_name().map(str::to_string),
        }
    }
}

// =============================================================================
// StatusMap
// =============================================================================

/// Event kind and tool name to status text.
///
/// Terminal kinds always map to the empty string, which clears the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMap {
    kinds: HashMap<EventKind, String>,
    tools: HashMap<String, String>,
    loading_messages: Vec<String>,
}

impl StatusMap {
    pub fn builder() -> StatusMapBuilder {
        StatusMapBuilder::default()
    }

    /// Status text for an event: tool name first, then event kind
    pub fn lookup(&self, event: &StatusEvent) -> Option<&str> {
        if let Some(text) = event
            .tool_name
            .as_deref()
            .and_then(|name| self.tools.get(name))
        {
            return Some(text);
        }
        self.kinds.get(&event.kind).map(String::as_str)
    }

    pub fn loading_messages(&self) -> &[String] {
        &self.loading_messages
    }
}

impl Default for StatusMap {
    fn default() -> Self {
        let kinds = [
            (EventKind::Start, "is typing..."),
            (EventKind::Reasoning, "is thinking..."),
            (EventKind::TextStart, "is typing..."),
            (EventKind::ToolCall, "is using a tool..."),
            (EventKind::ToolResult, "is working..."),
            (EventKind::TextEnd, ""),
            (EventKind::Finish, ""),
            (EventKind::Error, ""),
        ];
        Self {
            kinds: kinds
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect(),
            tools: HashMap::from([("joinChannel".to_string(), "is joining channel...".to_string())]),
            loading_messages: vec!["is thinking...".to_string()],
        }
    }
}

/// Builds a [`StatusMap`], starting from the defaults.
#[derive(Debug, Clone)]
pub struct StatusMapBuilder {
    map: StatusMap,
}

impl Default for StatusMapBuilder {
    fn default() -> Self {
        Self {
            map: StatusMap::default(),
        }
    }
}

impl StatusMapBuilder {
    /// Start from nothing instead of the defaults
    pub fn empty() -> Self {
        Self {
            map: StatusMap {
                kinds: HashMap::new(),
                tools: HashMap::new(),
                loading_messages: Vec::new(),
            },
        }
    }

    pub fn kind(mut self, kind: EventKind, text: impl Into<String>) -> Self {
        self.map.kinds.insert(kind, text.into());
        self
    }

    /// Remove the entry for a kind so it no longer changes the status
    pub fn silence(mut self, kind: EventKind) -> Self {
        self.map.kinds.remove(&kind);
        self
    }

    pub fn tool(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.map.tools.insert(name.into(), text.into());
        self
    }

    pub fn loading_messages(mut self, messages: Vec<String>) -> Self {
        self.map.loading_messages = messages;
        self
    }

    pub fn build(self) -> Result<StatusMap, ConfigError> {
        for (kind, text) in &self.map.kinds {
            if kind.is_terminal() && !text.is_empty() {
                return Err(ConfigError::TerminalStatusNotEmpty(kind.to_string()));
            }
        }
        if self.map.tools.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::EmptyToolName);
        }
        Ok(self.map)
    }
}

// =============================================================================
// StatusNotifier
// =============================================================================

/// Issues assistant status updates for one thread.
pub struct StatusNotifier {
    api: Arc<dyn SlackApi>,
    map: Arc<StatusMap>,
    thread: Option<ThreadRef>,
    /// Last status sent, to skip identical updates
    last: Mutex<Option<String>>,
}

impl StatusNotifier {
    pub fn new(api: Arc<dyn SlackApi>, map: Arc<StatusMap>, thread: Option<ThreadRef>) -> Self {
        Self {
            api,
            map,
            thread,
            last: Mutex::new(None),
        }
    }

    /// Initial status, set before any model or tool work
    pub async fn begin(&self) {
        let Some(text) = self.map.lookup(&StatusEvent::new(EventKind::Start)) else {
            return;
        };
        let loading = self.map.loading_messages().to_vec();
        self.send(text.to_string(), &loading).await;
    }

    pub async fn notify(&self, event: &StatusEvent) {
        if let Some(text) = self.map.lookup(event) {
            self.send(text.to_string(), &[]).await;
        }
    }

    pub async fn notify_agent(&self, event: &AgentEvent) {
        self.notify(&StatusEvent::from(event)).await;
    }

    /// Set an arbitrary status string
    pub async fn set(&self, text: &str) {
        self.send(text.to_string(), &[]).await;
    }

    pub async fn clear(&self) {
        self.send(String::new(), &[]).await;
    }

    /// A guard that clears this thread's status when dropped
    pub fn guard(&self) -> StatusGuard {
        StatusGuard {
            api: Arc::clone(&self.api),
            thread: self.thread.clone(),
            armed: true,
        }
    }

    async fn send(&self, text: String, loading: &[String]) {
        let Some(thread) = &self.thread else {
            return;
        };
        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_deref() == Some(text.as_str()) {
                return;
            }
            *last = Some(text.clone());
        }

        let cleared = text.is_empty();
        let req = SetStatusRequest::new(thread, text).with_loading_messages(loading);
        match self.api.set_status(&req).await {
            Ok(()) => metrics::record_status_update(cleared),
            Err(e) => {
                tracing::warn!(thread = %thread, status = %req.status, error = %e, "Failed to set status");
            }
        }
    }
}

/// Clears the status on drop unless disarmed.
///
/// Covers the path where a turn future is dropped before reaching its own
/// cleanup. Dropping outside a tokio runtime is a no-op.
pub struct StatusGuard {
    api: Arc<dyn SlackApi>,
    thread: Option<ThreadRef>,
    armed: bool,
}

impl StatusGuard {
    /// The owner cleared the status itself
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let api = Arc::clone(&self.api);
        runtime.spawn(async move {
            let req = SetStatusRequest::new(&thread, "");
            if let Err(e) = api.set_status(&req).await {
                tracing::warn!(thread = %thread, error = %e, "Failed to clear status on drop");
            }
        });
    }
}
