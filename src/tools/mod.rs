// ABOUTME: Tools the agent can call from a Slack conversation.
// ABOUTME: Builds the ToolSet handed to agent backends.

pub mod join_channel;

pub use join_channel::{JoinChannelOutcome, JoinChannelTool};

use slackline_agent::ToolSet;
use slackline_core::approval::ApprovalRegistry;
use slackline_core::traits::SlackApi;
use std::sync::Arc;

/// Every tool available to the agent
pub fn toolset(api: Arc<dyn SlackApi>, approvals: ApprovalRegistry) -> ToolSet {
    ToolSet::new().with_tool(Arc::new(JoinChannelTool::new(api, approvals)))
}
