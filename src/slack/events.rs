// ABOUTME: Inbound Slack payloads: Events API envelopes and block_actions interaction payloads.
// ABOUTME: Normalizes mentions and direct messages into one InboundMessage; also carries assistant pane events.

use serde::Deserialize;
use slackline_core::thread_context::AssistantContext;
use slackline_core::traits::ThreadRef;

// =============================================================================
// Events API
// =============================================================================

/// Top-level body posted to the events endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: SlackEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    AppMention(MessageEvent),
    Message(MessageEvent),
    /// The user opened the assistant pane
    AssistantThreadStarted(AssistantThreadEvent),
    /// The user switched channels with the assistant pane open
    AssistantThreadContextChanged(AssistantThreadEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantThreadEvent {
    pub assistant_thread: AssistantThread,
}

/// The DM thread backing an assistant pane, with what the user is looking at
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantThread {
    #[serde(default)]
    pub user_id: Option<String>,
    pub channel_id: String,
    pub thread_ts: String,
    #[serde(default)]
    pub context: AssistantContext,
}

impl AssistantThread {
    pub fn thread(&self) -> ThreadRef {
        ThreadRef::new(self.channel_id.clone(), self.thread_ts.clone())
    }
}

/// Fields shared by `app_mention` and `message` events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub ts: String,
    pub channel: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

/// A user message the bot should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    /// Root of the reply thread: the message's thread, or the message itself
    pub thread_ts: String,
    /// The message that triggered the turn (reaction target)
    pub ts: String,
    pub user: Option<String>,
    pub text: String,
    pub is_direct: bool,
}

impl SlackEvent {
    /// Keep app mentions and plain direct messages from humans; drop everything else.
    pub fn into_inbound(self, bot_user_id: Option<&str>) -> Option<InboundMessage> {
        let (event, is_direct) = match self {
            SlackEvent::AppMention(event) => (event, false),
            SlackEvent::Message(event) if event.channel_type.as_deref() == Some("im") => {
                (event, true)
            }
            _ => return None,
        };

        if event.bot_id.is_some() || event.subtype.is_some() {
            return None;
        }
        if let (Some(user), Some(bot)) = (event.user.as_deref(), bot_user_id) {
            if user == bot {
                return None;
            }
        }

        let text = strip_mention(event.text.as_deref().unwrap_or_default(), bot_user_id);
        if text.is_empty() {
            return None;
        }

        let thread_ts = event.thread_ts.clone().unwrap_or_else(|| event.ts.clone());
        Some(InboundMessage {
            channel: event.channel,
            thread_ts,
            ts: event.ts,
            user: event.user,
            text,
            is_direct,
        })
    }
}

/// Remove the bot's `<@U...>` mention. Without a known bot id, a leading mention is dropped.
pub fn strip_mention(text: &str, bot_user_id: Option<&str>) -> String {
    let stripped = match bot_user_id {
        Some(bot) => text.replace(&format!("<@{}>", bot), ""),
        None => match text.trim_start().strip_prefix("<@") {
            Some(rest) => rest.split_once('>').map(|(_, tail)| tail).unwrap_or(rest).to_string(),
            None => text.to_string(),
        },
    };
    stripped.trim().to_string()
}

// =============================================================================
// Interactivity
// =============================================================================

/// `block_actions` payload from the form-encoded `payload` field
#[derive(Debug, Clone, Deserialize)]
pub struct BlockActionsPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: ActionUser,
    #[serde(default)]
    pub channel: Option<ActionChannel>,
    #[serde(default)]
    pub message: Option<ActionMessage>,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionChannel {
    pub id: String,
}

/// The message that carried the clicked button
#[derive(Debug, Clone, Deserialize)]
pub struct ActionMessage {
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl BlockActionsPayload {
    pub fn channel_id(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.id.as_str())
    }
}
