// ABOUTME: Assistant pane lifecycle: greets new assistant threads, offers suggested prompts, tracks context.
// ABOUTME: The saved context supplies the viewed channel to direct-message turns in the pane.

use slackline_core::thread_context::ThreadContextStore;
use slackline_core::traits::{
    PostMessageRequest, SetStatusRequest, SlackApi, SuggestedPrompt, SuggestedPromptsRequest,
    ThreadRef,
};
use std::sync::Arc;

use crate::slack::events::AssistantThread;

pub const GREETING: &str = "Hi, how can I help?";
pub const GATHERING_STATUS: &str = "is gathering context...";
pub const GENERAL_PROMPTS_TITLE: &str = "What can I help you with?";
pub const CHANNEL_PROMPTS_TITLE: &str = "Perform an action based on the channel";

const IDEAS_PROMPT: &str = "Pretend you are a marketing associate and you need new ideas for an \
enterprise productivity feature. Generate 10 ideas for a new feature launch.";

/// Handles assistant thread events and answers "what is the user looking at".
#[derive(Clone)]
pub struct AssistantPane {
    api: Arc<dyn SlackApi>,
    contexts: ThreadContextStore,
}

impl AssistantPane {
    pub fn new(api: Arc<dyn SlackApi>, contexts: ThreadContextStore) -> Self {
        Self { api, contexts }
    }

    /// Remember what the pane of `assistant` is open beside.
    ///
    /// Runs inline with event delivery so a later context change always wins.
    pub fn save_context(&self, assistant: &AssistantThread) {
        let thread = assistant.thread();
        tracing::debug!(
            channel = %thread.channel,
            thread_ts = %thread.thread_ts,
            viewing = ?assistant.context.channel_id,
            "Saving assistant thread context"
        );
        if let Err(e) = self.contexts.save(&thread, &assistant.context) {
            tracing::error!(error = %e, "Failed to save assistant thread context");
        }
    }

    /// Greet a new assistant thread and offer suggested prompts.
    ///
    /// Every step is best effort; failures are logged and the next step still runs.
    pub async fn started(&self, assistant: AssistantThread) {
        let thread = assistant.thread();
        tracing::info!(
            channel = %thread.channel,
            thread_ts = %thread.thread_ts,
            viewing = ?assistant.context.channel_id,
            "Assistant thread started"
        );

        let greeting = PostMessageRequest::threaded(&thread, GREETING);
        if let Err(e) = self.api.post_message(&greeting).await {
            tracing::error!(error = %e, "Failed to greet assistant thread");
        }

        let prompts = match assistant.context.channel_id.as_deref() {
            Some(channel_id) => self.channel_prompts(&thread, channel_id).await,
            None => Some(SuggestedPromptsRequest::new(
                &thread,
                Some(GENERAL_PROMPTS_TITLE.to_string()),
                vec![SuggestedPrompt {
                    title: "Generate ideas".to_string(),
                    message: IDEAS_PROMPT.to_string(),
                }],
            )),
        };

        if let Some(prompts) = prompts {
            if let Err(e) = self.api.set_suggested_prompts(&prompts).await {
                tracing::error!(error = %e, "Failed to set suggested prompts");
            }
        }
    }

    /// Channel the user had open beside the pane of `thread`, if one was reported
    pub fn viewing_channel(&self, thread: &ThreadRef) -> Option<String> {
        match self.contexts.get(thread) {
            Ok(context) => context.and_then(|c| c.channel_id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read assistant thread context");
                None
            }
        }
    }

    async fn channel_prompts(
        &self,
        thread: &ThreadRef,
        channel_id: &str,
    ) -> Option<SuggestedPromptsRequest> {
        let status = SetStatusRequest::new(thread, GATHERING_STATUS);
        if let Err(e) = self.api.set_status(&status).await {
            tracing::warn!(error = %e, "Failed to set gathering status");
        }

        let info = self.api.channel_info(channel_id).await;

        if let Err(e) = self.api.set_status(&SetStatusRequest::new(thread, "")).await {
            tracing::warn!(error = %e, "Failed to clear gathering status");
        }

        let name = match info {
            Ok(info) => info.name.unwrap_or_else(|| channel_id.to_string()),
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "Channel lookup failed, no prompts offered");
                return None;
            }
        };

        Some(SuggestedPromptsRequest::new(
            thread,
            Some(CHANNEL_PROMPTS_TITLE.to_string()),
            vec![SuggestedPrompt {
                title: format!("Summarize {}", name),
                message: format!("Summarize the activity in {}", name),
            }],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slackline_core::testing::{RecordingSlackApi, CHANNEL_INFO, POST_MESSAGE};
    use slackline_core::thread_context::AssistantContext;

    fn pane() -> (Arc<RecordingSlackApi>, AssistantPane) {
        let api = Arc::new(RecordingSlackApi::new());
        let store = ThreadContextStore::open_in_memory().unwrap();
        let pane = AssistantPane::new(Arc::clone(&api) as Arc<dyn SlackApi>, store);
        (api, pane)
    }

    fn pane_thread(viewing: Option<&str>) -> AssistantThread {
        AssistantThread {
            user_id: Some("U1".into()),
            channel_id: "D1".into(),
            thread_ts: "1.0".into(),
            context: AssistantContext {
                channel_id: viewing.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_failed_channel_lookup_still_greets_without_prompts() {
        let (api, pane) = pane();
        api.fail_next(CHANNEL_INFO, "channel_not_found");

        pane.started(pane_thread(Some("C404"))).await;

        assert_eq!(api.count(POST_MESSAGE), 1);
        assert!(api.suggested_prompts().is_empty());
        assert_eq!(api.statuses(), vec![GATHERING_STATUS, ""]);
    }

    #[test]
    fn test_viewing_channel_follows_latest_context() {
        let (_api, pane) = pane();
        let thread = ThreadRef::new("D1", "1.0");
        assert_eq!(pane.viewing_channel(&thread), None);

        pane.save_context(&pane_thread(Some("C1")));
        pane.save_context(&pane_thread(Some("C2")));
        assert_eq!(pane.viewing_channel(&thread).as_deref(), Some("C2"));

        // Closing the pane beside a channel leaves no viewed channel
        pane.save_context(&pane_thread(None));
        assert_eq!(pane.viewing_channel(&thread), None);
    }
}
