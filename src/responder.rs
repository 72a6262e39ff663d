// ABOUTME: Turns inbound app mentions and direct messages into relayed agent turns.
// ABOUTME: Deduplicates Slack's event retries, routes assistant pane events and tracks tasks for shutdown.

use slackline_agent::{AgentHandle, PromptRequest, ToolContext};
use slackline_core::reaction::{ReactionIndicator, ReactionSet};
use slackline_core::traits::{MessageRef, SlackApi, ThreadRef};
use slackline_core::turn::{TurnOptions, TurnOutcome, TurnRelay};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::task::TaskTracker;

use crate::assistant::AssistantPane;
use crate::slack::blocks;
use crate::slack::events::{InboundMessage, SlackEvent};

/// Event ids remembered for retry deduplication
const SEEN_EVENT_CAPACITY: usize = 1024;

/// Bounded memory of recently accepted event ids
#[derive(Debug, Default)]
struct SeenEvents {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenEvents {
    /// Record `id`; false when it was already seen
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= SEEN_EVENT_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

/// Answers Slack messages by running one [`TurnRelay`] turn per message.
#[derive(Clone)]
pub struct Responder {
    api: Arc<dyn SlackApi>,
    agent: AgentHandle,
    relay: TurnRelay,
    bot_user_id: Option<String>,
    feedback_buttons: bool,
    reactions: Option<ReactionSet>,
    assistant: Option<AssistantPane>,
    seen: Arc<Mutex<SeenEvents>>,
    tasks: TaskTracker,
}

impl Responder {
    pub fn new(api: Arc<dyn SlackApi>, agent: AgentHandle, relay: TurnRelay) -> Self {
        Self {
            api,
            agent,
            relay,
            bot_user_id: None,
            feedback_buttons: true,
            reactions: None,
            assistant: None,
            seen: Arc::new(Mutex::new(SeenEvents::default())),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_bot_user_id(mut self, bot_user_id: Option<String>) -> Self {
        self.bot_user_id = bot_user_id;
        self
    }

    pub fn with_feedback_buttons(mut self, enabled: bool) -> Self {
        self.feedback_buttons = enabled;
        self
    }

    /// Mark the triggering message with working/done/failed reactions
    pub fn with_reactions(mut self, reactions: Option<ReactionSet>) -> Self {
        self.reactions = reactions;
        self
    }

    /// Handle assistant pane events and use their saved context for direct messages
    pub fn with_assistant_pane(mut self, assistant: AssistantPane) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Accept an Events API callback. Returns true when the event was acted on.
    pub fn accept(&self, event_id: Option<&str>, event: SlackEvent) -> bool {
        if let Some(id) = event_id {
            let fresh = self.seen.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
            if !fresh {
                tracing::debug!(event_id = id, "Skipping duplicate event delivery");
                return false;
            }
        }

        let event = match (event, &self.assistant) {
            (SlackEvent::AssistantThreadStarted(started), Some(assistant)) => {
                assistant.save_context(&started.assistant_thread);
                let assistant = assistant.clone();
                self.tasks.spawn(async move {
                    assistant.started(started.assistant_thread).await;
                });
                return true;
            }
            (SlackEvent::AssistantThreadContextChanged(changed), Some(assistant)) => {
                assistant.save_context(&changed.assistant_thread);
                return true;
            }
            (event, _) => event,
        };

        let Some(inbound) = event.into_inbound(self.bot_user_id.as_deref()) else {
            return false;
        };

        let responder = self.clone();
        self.tasks.spawn(async move {
            responder.respond(inbound).await;
        });
        true
    }

    /// Run one turn for `inbound` to completion
    pub async fn respond(&self, inbound: InboundMessage) -> TurnOutcome {
        let preview: String = inbound.text.chars().take(50).collect();
        tracing::info!(
            channel = %inbound.channel,
            thread_ts = %inbound.thread_ts,
            direct = inbound.is_direct,
            preview = %preview,
            "Responding to message"
        );

        let mut context = ToolContext::new(inbound.channel.clone(), inbound.thread_ts.clone());
        context.user_id = inbound.user.clone();
        context.viewing_channel_id = if inbound.is_direct {
            let thread = ThreadRef::new(inbound.channel.clone(), inbound.thread_ts.clone());
            self.assistant
                .as_ref()
                .and_then(|assistant| assistant.viewing_channel(&thread))
        } else {
            Some(inbound.channel.clone())
        };

        let target = MessageRef::new(inbound.channel.clone(), inbound.ts.clone());
        let reactions = match &self.reactions {
            Some(names) => ReactionIndicator::new(Arc::clone(&self.api), target, names.clone()),
            None => ReactionIndicator::disabled(Arc::clone(&self.api), target),
        };
        let options = TurnOptions {
            feedback_blocks: self
                .feedback_buttons
                .then(|| blocks::feedback_blocks(&inbound.thread_ts)),
            reactions: Some(reactions),
        };

        let request = PromptRequest::new(inbound.text, context);
        self.relay.run(&self.agent, request, options).await
    }

    /// Stop accepting turns and wait for running ones to wind down
    pub async fn shutdown(&self) {
        self.tasks.close();
        tracing::info!(running = self.tasks.len(), "Waiting for running turns");
        self.tasks.wait().await;
    }

    pub fn running_turns(&self) -> usize {
        self.tasks.len()
    }
}
