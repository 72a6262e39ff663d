// ABOUTME: Button click handlers: channel-join approvals and feedback thumbs.
// ABOUTME: Resolves approvals exactly once, always updates the request message, finishes detached joins.

use slackline_core::approval::{ApprovalDecision, ApprovalRegistry, ResumeOutcome};
use slackline_core::error::ApprovalError;
use slackline_core::metrics;
use slackline_core::traits::{
    EphemeralRequest, MessageRef, PostMessageRequest, SetStatusRequest, SlackApi, ThreadRef,
    UpdateMessageRequest,
};
use std::sync::Arc;
use thiserror::Error;

use crate::slack::blocks::{self, ApprovalValue};
use crate::slack::events::{BlockAction, BlockActionsPayload};
use crate::tools::join_channel::{self, JoinChannelOutcome};

pub const JOINING_STATUS: &str = "is joining channel...";
pub const PROCESSING_STATUS: &str = "is processing...";

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action {0} carried no value")]
    MissingValue(String),

    #[error("malformed approval value: {0}")]
    InvalidApprovalValue(#[from] serde_json::Error),

    #[error("malformed feedback value: {0}")]
    InvalidFeedbackValue(String),

    #[error("payload has no channel")]
    MissingChannel,
}

/// What a click on an approval button led to.
#[derive(Debug)]
pub enum ApprovalClick {
    /// The waiting tool call received the decision
    Delivered,
    /// Nobody was waiting; the handler finished the work itself
    Continued(JoinChannelOutcome),
    /// The registry refused the decision (duplicate click, unknown token, mismatch)
    Refused(ApprovalError),
}

/// Handles `block_actions` payloads from the interactivity endpoint.
#[derive(Clone)]
pub struct ActionHandler {
    api: Arc<dyn SlackApi>,
    approvals: ApprovalRegistry,
}

impl ActionHandler {
    pub fn new(api: Arc<dyn SlackApi>, approvals: ApprovalRegistry) -> Self {
        Self { api, approvals }
    }

    /// Dispatch every action in the payload. Failures are logged per action.
    pub async fn handle(&self, payload: &BlockActionsPayload) {
        if payload.kind != "block_actions" {
            tracing::debug!(kind = %payload.kind, "Ignoring interaction payload");
            return;
        }

        for action in &payload.actions {
            let result = match action.action_id.as_str() {
                blocks::APPROVE_ACTION_ID | blocks::REJECT_ACTION_ID => {
                    self.handle_approval(payload, action).await.map(|_| ())
                }
                blocks::FEEDBACK_ACTION_ID => self.handle_feedback(payload, action).await,
                other => {
                    tracing::debug!(action_id = other, "Ignoring unknown action");
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::warn!(action_id = %action.action_id, error = %e, "Failed to handle action");
                metrics::record_error("action_payload");
            }
        }
    }

    pub async fn handle_approval(
        &self,
        payload: &BlockActionsPayload,
        action: &BlockAction,
    ) -> Result<ApprovalClick, ActionError> {
        let raw = action
            .value
            .as_deref()
            .ok_or_else(|| ActionError::MissingValue(action.action_id.clone()))?;
        let value = ApprovalValue::parse(raw)?;

        tracing::info!(
            token = %value.tool_call_id,
            channel = %value.channel_id,
            approved = value.approved,
            user = %payload.user.id,
            "Channel join {}",
            if value.approved { "approved" } else { "rejected" }
        );

        let clicked_thread = match (payload.channel_id(), &payload.message) {
            (Some(channel), Some(message)) => message
                .thread_ts
                .as_deref()
                .map(|ts| ThreadRef::new(channel, ts)),
            _ => None,
        };
        if let Some(thread) = &clicked_thread {
            let status = if value.approved {
                JOINING_STATUS
            } else {
                PROCESSING_STATUS
            };
            self.set_status(thread, status).await;
        }

        let decision = ApprovalDecision {
            approved: value.approved,
            channel_id: value.channel_id.clone(),
            channel_name: value.channel_name.clone(),
        };
        let click = match self.approvals.resume(&value.tool_call_id, decision) {
            Ok(ResumeOutcome::Delivered) => ApprovalClick::Delivered,
            Ok(ResumeOutcome::Detached(approval)) => {
                tracing::info!(token = %approval.token, "No live waiter, continuing join from the click");
                let outcome = if value.approved {
                    join_channel::join(self.api.as_ref(), &approval.channel_id).await
                } else {
                    JoinChannelOutcome::Declined {
                        channel_id: approval.channel_id.clone(),
                        channel_name: approval.channel_name.clone(),
                    }
                };
                let thread = approval.origin().or_else(|| clicked_thread.clone());
                if let Some(thread) = &thread {
                    self.post(thread, &outcome.message()).await;
                    self.set_status(thread, "").await;
                }
                ApprovalClick::Continued(outcome)
            }
            Err(e) => {
                tracing::warn!(token = %value.tool_call_id, error = %e, "Approval resume refused");
                metrics::record_error("approval_resume");
                if let Some(thread) = &clicked_thread {
                    self.set_status(thread, "").await;
                }
                ApprovalClick::Refused(e)
            }
        };

        // A refused click must not overwrite a decision that was already persisted
        let shown = match &click {
            ApprovalClick::Refused(_) => self
                .approvals
                .get(&value.tool_call_id)
                .ok()
                .flatten()
                .and_then(|row| row.approved)
                .unwrap_or(value.approved),
            _ => value.approved,
        };
        if let (Some(channel), Some(message)) = (payload.channel_id(), &payload.message) {
            self.update_request(&MessageRef::new(channel, &message.ts), shown, &value.channel_id)
                .await;
        }

        Ok(click)
    }

    pub async fn handle_feedback(
        &self,
        payload: &BlockActionsPayload,
        action: &BlockAction,
    ) -> Result<(), ActionError> {
        let raw = action
            .value
            .as_deref()
            .ok_or_else(|| ActionError::MissingValue(action.action_id.clone()))?;
        let (thread_ts, kind) = blocks::parse_feedback_value(raw)
            .ok_or_else(|| ActionError::InvalidFeedbackValue(raw.to_string()))?;
        let channel = payload.channel_id().ok_or(ActionError::MissingChannel)?;

        tracing::info!(feedback = kind, user = %payload.user.id, "Feedback button action received");
        metrics::record_feedback(kind.starts_with("positive"));

        let request = EphemeralRequest {
            channel: channel.to_string(),
            user: payload.user.id.clone(),
            thread_ts: Some(thread_ts.to_string()),
            text: blocks::FEEDBACK_THANKS.to_string(),
        };
        if let Err(e) = self.api.post_ephemeral(&request).await {
            tracing::warn!(error = %e, "Failed to send feedback acknowledgement");
        }
        Ok(())
    }

    async fn update_request(&self, message: &MessageRef, approved: bool, channel_id: &str) {
        let request = UpdateMessageRequest {
            channel: message.channel.clone(),
            ts: message.ts.clone(),
            text: blocks::approval_decision_text(approved, channel_id),
            blocks: Some(blocks::approval_decision_blocks(approved, channel_id)),
        };
        if let Err(e) = self.api.update_message(&request).await {
            tracing::error!(channel = %message.channel, ts = %message.ts, error = %e, "Failed to update approval message");
            metrics::record_error("approval_update");
        }
    }

    async fn set_status(&self, thread: &ThreadRef, status: &str) {
        if let Err(e) = self.api.set_status(&SetStatusRequest::new(thread, status)).await {
            tracing::warn!(thread = %thread, error = %e, "Failed to set status");
        }
    }

    async fn post(&self, thread: &ThreadRef, text: &str) {
        if let Err(e) = self
            .api
            .post_message(&PostMessageRequest::threaded(thread, text))
            .await
        {
            tracing::error!(thread = %thread, error = %e, "Failed to post join outcome");
        }
    }
}
