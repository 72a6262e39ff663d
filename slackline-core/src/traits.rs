// ABOUTME: Chat API traits the relay drives: streaming, assistant status, reactions, channels, messages.
// ABOUTME: Request/response shapes mirror the Slack Web API; implementations live in the platform crate.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Slack only accepts up to 10 loading messages
pub const MAX_LOADING_MESSAGES: usize = 10;

/// Slack's cap on `assistant.threads.setSuggestedPrompts`
pub const MAX_SUGGESTED_PROMPTS: usize = 4;

// =============================================================================
// Identity
// =============================================================================

/// A conversation thread: channel plus the thread's root timestamp
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub channel: String,
    pub thread_ts: String,
}

impl ThreadRef {
    pub fn new(channel: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: thread_ts.into(),
        }
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.thread_ts)
    }
}

/// A single posted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

impl MessageRef {
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
        }
    }
}

// =============================================================================
// Chat stream
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartStreamRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unfurl_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unfurl_media: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendStreamRequest {
    pub channel: String,
    pub ts: String,
    pub markdown_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopStreamRequest {
    pub channel: String,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Value>>,
}

/// `{ ok, channel, ts }` answer shared by the three stream methods
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamResponse {
    pub channel: String,
    pub ts: String,
}

/// The append-only streaming message surface.
#[async_trait]
pub trait ChatStreamApi: Send + Sync {
    async fn start_stream(&self, req: &StartStreamRequest) -> Result<StreamResponse, TransportError>;

    async fn append_stream(&self, req: &AppendStreamRequest)
        -> Result<StreamResponse, TransportError>;

    async fn stop_stream(&self, req: &StopStreamRequest) -> Result<StreamResponse, TransportError>;
}

// =============================================================================
// Assistant status
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetStatusRequest {
    pub channel_id: String,
    pub thread_ts: String,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loading_messages: Vec<String>,
}

impl SetStatusRequest {
    pub fn new(thread: &ThreadRef, status: impl Into<String>) -> Self {
        Self {
            channel_id: thread.channel.clone(),
            thread_ts: thread.thread_ts.clone(),
            status: status.into(),
            loading_messages: Vec::new(),
        }
    }

    /// Attach loading messages, keeping only the first ten
    pub fn with_loading_messages(mut self, messages: &[String]) -> Self {
        self.loading_messages = messages
            .iter()
            .take(MAX_LOADING_MESSAGES)
            .cloned()
            .collect();
        self
    }
}

/// One preset prompt offered in the assistant pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedPrompt {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedPromptsRequest {
    pub channel_id: String,
    pub thread_ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub prompts: Vec<SuggestedPrompt>,
}

impl SuggestedPromptsRequest {
    /// Slack shows at most four prompts
    pub fn new(thread: &ThreadRef, title: Option<String>, mut prompts: Vec<SuggestedPrompt>) -> Self {
        prompts.truncate(MAX_SUGGESTED_PROMPTS);
        Self {
            channel_id: thread.channel.clone(),
            thread_ts: thread.thread_ts.clone(),
            title,
            prompts,
        }
    }
}

#[async_trait]
pub trait AssistantStatusApi: Send + Sync {
    async fn set_status(&self, req: &SetStatusRequest) -> Result<(), TransportError>;

    async fn set_suggested_prompts(
        &self,
        req: &SuggestedPromptsRequest,
    ) -> Result<(), TransportError>;
}

// =============================================================================
// Reactions
// =============================================================================

#[async_trait]
pub trait ReactionApi: Send + Sync {
    async fn add_reaction(&self, target: &MessageRef, name: &str) -> Result<(), TransportError>;

    async fn remove_reaction(&self, target: &MessageRef, name: &str)
        -> Result<(), TransportError>;
}

// =============================================================================
// Channels
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_member: bool,
}

#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// `conversations.info`
    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError>;

    /// `conversations.join`
    async fn join_channel(&self, channel: &str) -> Result<ChannelInfo, TransportError>;
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostMessageRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Value>>,
}

impl PostMessageRequest {
    /// Plain text reply in a thread
    pub fn threaded(thread: &ThreadRef, text: impl Into<String>) -> Self {
        Self {
            channel: thread.channel.clone(),
            thread_ts: Some(thread.thread_ts.clone()),
            text: text.into(),
            blocks: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateMessageRequest {
    pub channel: String,
    pub ts: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EphemeralRequest {
    pub channel: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// `chat.postMessage`
    async fn post_message(&self, req: &PostMessageRequest) -> Result<MessageRef, TransportError>;

    /// `chat.update`
    async fn update_message(&self, req: &UpdateMessageRequest) -> Result<(), TransportError>;

    /// `chat.postEphemeral`
    async fn post_ephemeral(&self, req: &EphemeralRequest) -> Result<(), TransportError>;
}

// =============================================================================
// Combined surface
// =============================================================================

/// Everything the relay needs from the chat platform.
pub trait SlackApi:
    ChatStreamApi + AssistantStatusApi + ReactionApi + ChannelApi + MessageApi
{
}

impl<T> SlackApi for T where
    T: ChatStreamApi + AssistantStatusApi + ReactionApi + ChannelApi + MessageApi
{
}
