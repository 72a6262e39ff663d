// ABOUTME: Tool seam between agent backends (the tool dispatcher) and side-effecting tools.
// ABOUTME: Tools receive an explicit per-turn ToolContext instead of ambient client state.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Conversation identity a tool call runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContext {
    /// Channel where the conversation thread lives
    pub channel_id: String,
    /// Thread timestamp of the conversation
    pub thread_ts: String,
    /// Channel the user is currently looking at, if known
    pub viewing_channel_id: Option<String>,
    /// User who started the turn
    pub user_id: Option<String>,
}

impl ToolContext {
    pub fn new(channel_id: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: thread_ts.into(),
            viewing_channel_id: None,
            user_id: None,
        }
    }
}

/// A tool an agent backend may invoke.
///
/// `call` may suspend for a long time (e.g. waiting for a human approval);
/// it only blocks the calling tool invocation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the agent uses to call this tool
    fn name(&self) -> &'static str;

    /// Short description for tool listings
    fn description(&self) -> &'static str;

    /// Execute the tool. `call_id` is unique per invocation.
    async fn call(&self, ctx: &ToolContext, call_id: &str, input: Value) -> Result<Value>;
}

/// Name-indexed set of tools handed to a backend.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call by tool name
    pub async fn call(
        &self,
        ctx: &ToolContext,
        call_id: &str,
        name: &str,
        input: Value,
    ) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tracing::debug!(tool = name, call_id, "Dispatching tool call");
        tool.call(ctx, call_id, input).await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn description(&self) -> &'static str {
            "Uppercase the input text"
        }

        async fn call(&self, _ctx: &ToolContext, _call_id: &str, input: Value) -> Result<Value> {
            let text = input["text"].as_str().unwrap_or_default();
            Ok(json!({ "text": text.to_uppercase() }))
        }
    }

    #[tokio::test]
    async fn test_toolset_dispatches_by_name() {
        let tools = ToolSet::new().with_tool(Arc::new(Upper));
        let ctx = ToolContext::new("C1", "1.0");
        let out = tools
            .call(&ctx, "call-1", "upper", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out["text"], "HI");
        assert_eq!(tools.names(), vec!["upper"]);
    }

    #[tokio::test]
    async fn test_toolset_unknown_tool_errors() {
        let tools = ToolSet::new();
        let ctx = ToolContext::new("C1", "1.0");
        let err = tools
            .call(&ctx, "call-1", "missing", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }
}
