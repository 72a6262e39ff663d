// ABOUTME: Block Kit JSON builders for approval requests, approval decisions, and feedback buttons.
// ABOUTME: Also defines the button value payloads that round-trip through Slack's action callbacks.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Approve button on a join request
pub const APPROVE_ACTION_ID: &str = "channel_join_approval";

/// Reject button on a join request
pub const REJECT_ACTION_ID: &str = "channel_join_approval_reject";

/// Thumbs up/down buttons attached to the final stream
pub const FEEDBACK_ACTION_ID: &str = "feedback";

pub const FEEDBACK_THANKS: &str = "Thank you for your feedback!";

/// JSON embedded in each approval button's `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalValue {
    pub tool_call_id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    pub approved: bool,
}

impl ApprovalValue {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

fn channel_link(channel_id: &str) -> String {
    format!("<#{}>", channel_id)
}

// =============================================================================
// Approval request
// =============================================================================

/// Fallback text for notifications of the approval request
pub fn approval_request_text(channel_id: &str) -> String {
    format!(
        "Permission request: join {} to help with your request?",
        channel_link(channel_id)
    )
}

/// Section plus Approve/Reject buttons. Both buttons carry the full decision.
pub fn approval_request_blocks(
    tool_call_id: &str,
    channel_id: &str,
    channel_name: Option<&str>,
) -> Vec<Value> {
    let value = |approved: bool| {
        let payload = ApprovalValue {
            tool_call_id: tool_call_id.to_string(),
            channel_id: channel_id.to_string(),
            channel_name: channel_name.map(str::to_string),
            approved,
        };
        // Plain strings and a bool always serialize
        serde_json::to_string(&payload).unwrap_or_default()
    };

    vec![
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "🔐 *Permission Request*\n\nI'd like to join the channel {} to help with your request. Do you approve?",
                    channel_link(channel_id)
                ),
            }
        }),
        json!({
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Approve", "emoji": true },
                    "style": "primary",
                    "action_id": APPROVE_ACTION_ID,
                    "value": value(true),
                },
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Reject", "emoji": true },
                    "style": "danger",
                    "action_id": REJECT_ACTION_ID,
                    "value": value(false),
                }
            ]
        }),
    ]
}

// =============================================================================
// Approval decision
// =============================================================================

pub fn approval_decision_text(approved: bool, channel_id: &str) -> String {
    let label = if approved { "Approved" } else { "Rejected" };
    format!("{}: Join channel {}", label, channel_link(channel_id))
}

/// Replaces the request message once a button was clicked; the buttons go away.
pub fn approval_decision_blocks(approved: bool, channel_id: &str) -> Vec<Value> {
    let (emoji, label) = if approved {
        ("✅", "Approved")
    } else {
        ("❌", "Rejected")
    };
    vec![json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!("{} *{}*: Request to join {}", emoji, label, channel_link(channel_id)),
        }
    })]
}

// =============================================================================
// Feedback
// =============================================================================

pub fn feedback_blocks(thread_ts: &str) -> Vec<Value> {
    vec![json!({
        "type": "context_actions",
        "elements": [{
            "type": "feedback_buttons",
            "action_id": FEEDBACK_ACTION_ID,
            "positive_button": {
                "text": { "type": "plain_text", "text": "👍" },
                "value": format!("{}:positive_feedback", thread_ts),
            },
            "negative_button": {
                "text": { "type": "plain_text", "text": "👎" },
                "value": format!("{}:negative_feedback", thread_ts),
            }
        }]
    })]
}

/// Split a feedback button value into `(thread_ts, feedback_type)`
pub fn parse_feedback_value(value: &str) -> Option<(&str, &str)> {
    let (thread_ts, kind) = value.rsplit_once(':')?;
    if thread_ts.is_empty() || kind.is_empty() {
        return None;
    }
    Some((thread_ts, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_buttons_embed_decision() {
        let blocks = approval_request_blocks("tc-1", "C123", Some("general"));
        assert_eq!(blocks.len(), 2);

        let elements = blocks[1]["elements"].as_array().unwrap();
        assert_eq!(elements[0]["action_id"], APPROVE_ACTION_ID);
        assert_eq!(elements[1]["action_id"], REJECT_ACTION_ID);

        let approve = ApprovalValue::parse(elements[0]["value"].as_str().unwrap()).unwrap();
        assert_eq!(approve.tool_call_id, "tc-1");
        assert_eq!(approve.channel_name.as_deref(), Some("general"));
        assert!(approve.approved);

        let reject = ApprovalValue::parse(elements[1]["value"].as_str().unwrap()).unwrap();
        assert!(!reject.approved);
    }

    #[test]
    fn test_value_uses_camel_case_and_omits_missing_name() {
        let blocks = approval_request_blocks("tc-2", "C9", None);
        let raw = blocks[1]["elements"][0]["value"].as_str().unwrap();
        let json: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(json["toolCallId"], "tc-2");
        assert_eq!(json["channelId"], "C9");
        assert!(json.get("channelName").is_none());
    }

    #[test]
    fn test_request_text_links_channel() {
        let blocks = approval_request_blocks("tc-1", "C123", None);
        let text = blocks[0]["text"]["text"].as_str().unwrap();
        assert!(text.starts_with("🔐 *Permission Request*"));
        assert!(text.contains("<#C123>"));
    }

    #[test]
    fn test_decision_blocks() {
        let approved = approval_decision_blocks(true, "C1");
        assert_eq!(
            approved[0]["text"]["text"],
            "✅ *Approved*: Request to join <#C1>"
        );
        let rejected = approval_decision_blocks(false, "C1");
        assert_eq!(
            rejected[0]["text"]["text"],
            "❌ *Rejected*: Request to join <#C1>"
        );
        assert_eq!(approval_decision_text(false, "C1"), "Rejected: Join channel <#C1>");
    }

    #[test]
    fn test_feedback_value_parsing() {
        let blocks = feedback_blocks("1700000000.000100");
        let raw = blocks[0]["elements"][0]["positive_button"]["value"]
            .as_str()
            .unwrap();
        assert_eq!(
            parse_feedback_value(raw),
            Some(("1700000000.000100", "positive_feedback"))
        );
        assert_eq!(parse_feedback_value("garbage"), None);
        assert_eq!(parse_feedback_value(":positive_feedback"), None);
    }
}
