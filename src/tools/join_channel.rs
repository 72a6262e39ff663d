// ABOUTME: joinChannel tool - asks a human for consent via Approve/Reject buttons before joining.
// ABOUTME: Suspends on the durable approval registry; access errors short-circuit without asking.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use slackline_agent::{Tool, ToolContext};
use slackline_core::approval::{ApprovalRegistry, ApprovalRequest};
use slackline_core::metrics;
use slackline_core::traits::{ChannelInfo, PostMessageRequest, SlackApi, ThreadRef};
use std::sync::Arc;

use crate::slack::blocks;

pub const TOOL_NAME: &str = "joinChannel";

/// Result handed back to the agent. Declines and access problems are answers, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinChannelOutcome {
    Joined(ChannelInfo),
    Declined {
        channel_id: String,
        channel_name: Option<String>,
    },
    /// The bot cannot see the channel (private, unknown, missing scope)
    Inaccessible { channel_id: String, error: String },
    Failed { channel_id: String, error: String },
}

impl JoinChannelOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Joined(_))
    }

    /// Sentence suitable for posting in the thread
    pub fn message(&self) -> String {
        match self {
            Self::Joined(info) => format!(
                "Successfully joined channel {}",
                info.name.as_deref().unwrap_or(&info.id)
            ),
            Self::Declined { channel_id, .. } => {
                format!("The request to join channel {} was declined.", channel_id)
            }
            Self::Inaccessible { channel_id, .. } => format!(
                "Channel {} is private or not accessible. Ask someone to invite the bot instead.",
                channel_id
            ),
            Self::Failed { .. } => "Failed to join channel".to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        let message = self.message();
        match self {
            Self::Joined(info) => json!({
                "success": true,
                "message": message,
                "channel": info,
            }),
            Self::Declined {
                channel_id,
                channel_name,
            } => json!({
                "success": false,
                "declined": true,
                "message": message,
                "channelId": channel_id,
                "channelName": channel_name,
            }),
            Self::Inaccessible { channel_id, error } => json!({
                "success": false,
                "isPrivate": true,
                "message": message,
                "channelId": channel_id,
                "error": error,
            }),
            Self::Failed { channel_id, error } => json!({
                "success": false,
                "message": message,
                "channelId": channel_id,
                "error": error,
            }),
        }
    }
}

/// `conversations.join`, turned into an outcome
pub async fn join(api: &dyn SlackApi, channel_id: &str) -> JoinChannelOutcome {
    match api.join_channel(channel_id).await {
        Ok(info) => {
            tracing::info!(channel = %channel_id, name = ?info.name, "Joined channel");
            JoinChannelOutcome::Joined(info)
        }
        Err(e) => {
            tracing::error!(channel = %channel_id, error = %e, "Failed to join channel");
            metrics::record_error("join_channel");
            JoinChannelOutcome::Failed {
                channel_id: channel_id.to_string(),
                error: e.message,
            }
        }
    }
}

pub struct JoinChannelTool {
    api: Arc<dyn SlackApi>,
    approvals: ApprovalRegistry,
}

impl JoinChannelTool {
    pub fn new(api: Arc<dyn SlackApi>, approvals: ApprovalRegistry) -> Self {
        Self { api, approvals }
    }

    /// Full consent flow for one tool invocation
    pub async fn run(
        &self,
        ctx: &ToolContext,
        call_id: &str,
        channel_id: &str,
    ) -> Result<JoinChannelOutcome> {
        let info = match self.api.channel_info(channel_id).await {
            Ok(info) => info,
            Err(e) if e.is_access_error() => {
                tracing::info!(channel = %channel_id, code = ?e.code, "Channel not accessible, not asking for approval");
                return Ok(JoinChannelOutcome::Inaccessible {
                    channel_id: channel_id.to_string(),
                    error: e.message,
                });
            }
            Err(e) => {
                tracing::error!(channel = %channel_id, error = %e, "Channel lookup failed");
                return Ok(JoinChannelOutcome::Failed {
                    channel_id: channel_id.to_string(),
                    error: e.message,
                });
            }
        };

        let origin = ThreadRef::new(ctx.channel_id.clone(), ctx.thread_ts.clone());
        let request = PostMessageRequest {
            blocks: Some(blocks::approval_request_blocks(
                call_id,
                channel_id,
                info.name.as_deref(),
            )),
            ..PostMessageRequest::threaded(&origin, blocks::approval_request_text(channel_id))
        };
        // The row exists before any button does, so every click finds it
        let waiter = self.approvals.create(
            ApprovalRequest::new(call_id, channel_id)
                .with_channel_name(info.name.clone())
                .with_origin(origin),
        )?;

        let posted = match self.api.post_message(&request).await {
            Ok(posted) => posted,
            Err(e) => {
                if let Err(discard_err) = self.approvals.discard(call_id) {
                    tracing::warn!(token = %call_id, error = %discard_err, "Failed to discard unposted approval");
                }
                return Err(e).context("Failed to post approval request");
            }
        };
        if let Err(e) = self.approvals.attach_request_ts(call_id, &posted.ts) {
            tracing::warn!(token = %call_id, error = %e, "Failed to record approval request ts");
        }

        tracing::info!(channel = %channel_id, token = %call_id, "Waiting for channel join approval");
        let decision = waiter.wait().await?;

        if !decision.approved {
            tracing::info!(channel = %channel_id, token = %call_id, "Channel join declined");
            return Ok(JoinChannelOutcome::Declined {
                channel_id: decision.channel_id,
                channel_name: decision.channel_name.or(info.name),
            });
        }

        Ok(join(self.api.as_ref(), &decision.channel_id).await)
    }
}

#[async_trait]
impl Tool for JoinChannelTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Join a public Slack channel after the user approves. Use this when you need a channel's messages but aren't a member yet."
    }

    async fn call(&self, ctx: &ToolContext, call_id: &str, input: Value) -> Result<Value> {
        let channel_id = input["channel_id"]
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .context("joinChannel requires a channel_id")?;

        metrics::record_tool_used(TOOL_NAME);
        let outcome = self.run(ctx, call_id, channel_id).await?;
        Ok(outcome.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inaccessible_json_flags_private() {
        let outcome = JoinChannelOutcome::Inaccessible {
            channel_id: "C999".into(),
            error: "channel_not_found".into(),
        };
        let json = outcome.to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["isPrivate"], true);
    }

    #[test]
    fn test_declined_message_names_channel() {
        let outcome = JoinChannelOutcome::Declined {
            channel_id: "C123".into(),
            channel_name: None,
        };
        assert!(!outcome.is_success());
        assert!(outcome.to_json()["message"].as_str().unwrap().contains("C123"));
    }

    #[test]
    fn test_joined_message_prefers_name() {
        let outcome = JoinChannelOutcome::Joined(ChannelInfo {
            id: "C1".into(),
            name: Some("general".into()),
            is_private: false,
            is_member: true,
        });
        assert_eq!(outcome.message(), "Successfully joined channel general");
        assert_eq!(outcome.to_json()["channel"]["id"], "C1");
    }
}
