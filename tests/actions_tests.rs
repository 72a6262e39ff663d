// ABOUTME: Tests for approval and feedback click handling, including detached and duplicate clicks.
// ABOUTME: Also runs a full echo-backend turn that suspends on approval and resumes from a click.

use serde_json::json;
use slackline::actions::{ActionHandler, ApprovalClick, JOINING_STATUS, PROCESSING_STATUS};
use slackline::slack::blocks::{self, ApprovalValue, FEEDBACK_THANKS};
use slackline::slack::events::BlockActionsPayload;
use slackline::tools::{self, JoinChannelOutcome};
use slackline_agent::backends::echo::EchoBackend;
use slackline_agent::{AgentHandle, PromptRequest, ToolContext};
use slackline_core::approval::{ApprovalRegistry, ApprovalRequest};
use slackline_core::error::ApprovalError;
use slackline_core::status::StatusMap;
use slackline_core::testing::{RecordingSlackApi, JOIN_CHANNEL, POST_MESSAGE, STOP_STREAM};
use slackline_core::traits::{SlackApi, ThreadRef};
use slackline_core::turn::{TurnOptions, TurnOutcome, TurnRelay};
use std::sync::Arc;
use std::time::Duration;

fn handler() -> (Arc<RecordingSlackApi>, ApprovalRegistry, ActionHandler) {
    let api = Arc::new(RecordingSlackApi::new());
    let registry = ApprovalRegistry::open_in_memory().unwrap();
    let handler = ActionHandler::new(Arc::clone(&api) as Arc<dyn SlackApi>, registry.clone());
    (api, registry, handler)
}

/// A click on one of the approval buttons posted in thread `1.0` of C9
fn approval_click(token: &str, channel: &str, approved: bool) -> BlockActionsPayload {
    let value = ApprovalValue {
        tool_call_id: token.to_string(),
        channel_id: channel.to_string(),
        channel_name: None,
        approved,
    };
    let action_id = if approved {
        blocks::APPROVE_ACTION_ID
    } else {
        blocks::REJECT_ACTION_ID
    };
    serde_json::from_value(json!({
        "type": "block_actions",
        "user": { "id": "U1" },
        "channel": { "id": "C9" },
        "message": { "ts": "5.0", "thread_ts": "1.0" },
        "actions": [{
            "action_id": action_id,
            "value": serde_json::to_string(&value).unwrap(),
        }]
    }))
    .unwrap()
}

// =============================================================================
// Approval clicks
// =============================================================================

#[tokio::test]
async fn test_live_click_delivers_and_updates_request() {
    let (api, registry, handler) = handler();
    let waiter = registry.create(ApprovalRequest::new("tc-1", "C123")).unwrap();

    let payload = approval_click("tc-1", "C123", true);
    let click = handler
        .handle_approval(&payload, &payload.actions[0])
        .await
        .unwrap();

    assert!(matches!(click, ApprovalClick::Delivered));
    assert!(waiter.wait().await.unwrap().approved);

    assert_eq!(api.statuses(), vec![JOINING_STATUS]);
    let update = &api.updates()[0];
    assert_eq!(update.channel, "C9");
    assert_eq!(update.ts, "5.0");
    assert_eq!(update.text, "Approved: Join channel <#C123>");
    assert_eq!(
        update.blocks.as_ref().unwrap()[0]["text"]["text"],
        "✅ *Approved*: Request to join <#C123>"
    );
}

#[tokio::test]
async fn test_reject_click_shows_processing_status() {
    let (api, registry, handler) = handler();
    let waiter = registry.create(ApprovalRequest::new("tc-2", "C123")).unwrap();

    let payload = approval_click("tc-2", "C123", false);
    handler.handle(&payload).await;

    assert!(!waiter.wait().await.unwrap().approved);
    assert_eq!(api.statuses(), vec![PROCESSING_STATUS]);
    assert_eq!(api.updates()[0].text, "Rejected: Join channel <#C123>");
}

#[tokio::test]
async fn test_detached_click_joins_and_reports_in_origin_thread() {
    let (api, registry, handler) = handler();
    let waiter = registry
        .create(
            ApprovalRequest::new("tc-3", "C123").with_origin(ThreadRef::new("C7", "0.5")),
        )
        .unwrap();
    drop(waiter);

    let payload = approval_click("tc-3", "C123", true);
    let click = handler
        .handle_approval(&payload, &payload.actions[0])
        .await
        .unwrap();

    match click {
        ApprovalClick::Continued(JoinChannelOutcome::Joined(info)) => assert_eq!(info.id, "C123"),
        other => panic!("Expected a detached join, got {:?}", other),
    }
    assert_eq!(api.count(JOIN_CHANNEL), 1);

    let post = &api.posts()[0];
    assert_eq!(post.channel, "C7");
    assert_eq!(post.thread_ts.as_deref(), Some("0.5"));
    assert!(post.text.starts_with("Successfully joined channel"));
    assert_eq!(api.updates().len(), 1);
}

#[tokio::test]
async fn test_detached_decline_does_not_join() {
    let (api, registry, handler) = handler();
    drop(registry.create(ApprovalRequest::new("tc-4", "C123")).unwrap());

    let payload = approval_click("tc-4", "C123", false);
    let click = handler
        .handle_approval(&payload, &payload.actions[0])
        .await
        .unwrap();

    assert!(matches!(
        click,
        ApprovalClick::Continued(JoinChannelOutcome::Declined { .. })
    ));
    assert_eq!(api.count(JOIN_CHANNEL), 0);
    // Without a persisted origin the clicked thread is used
    assert_eq!(api.posts()[0].thread_ts.as_deref(), Some("1.0"));
}

#[tokio::test]
async fn test_duplicate_click_keeps_first_decision_on_message() {
    let (api, registry, handler) = handler();
    let _waiter = registry.create(ApprovalRequest::new("tc-5", "C123")).unwrap();

    let reject = approval_click("tc-5", "C123", false);
    handler.handle_approval(&reject, &reject.actions[0]).await.unwrap();

    let approve = approval_click("tc-5", "C123", true);
    let click = handler
        .handle_approval(&approve, &approve.actions[0])
        .await
        .unwrap();

    assert!(matches!(
        click,
        ApprovalClick::Refused(ApprovalError::AlreadyResolved(_))
    ));
    let updates = api.updates();
    assert_eq!(updates.len(), 2, "the message is edited even when resume fails");
    assert_eq!(updates[1].text, "Rejected: Join channel <#C123>");
    assert_eq!(api.count(JOIN_CHANNEL), 0);
}

#[tokio::test]
async fn test_unknown_token_still_updates_message() {
    let (api, _registry, handler) = handler();

    let payload = approval_click("nope", "C123", true);
    let click = handler
        .handle_approval(&payload, &payload.actions[0])
        .await
        .unwrap();

    assert!(matches!(
        click,
        ApprovalClick::Refused(ApprovalError::UnknownToken(_))
    ));
    assert_eq!(api.updates().len(), 1);
    // Processing status is set, then cleared
    assert_eq!(api.statuses(), vec![JOINING_STATUS, ""]);
}

#[tokio::test]
async fn test_malformed_value_is_rejected_without_side_effects() {
    let (api, _registry, handler) = handler();
    let payload: BlockActionsPayload = serde_json::from_value(json!({
        "type": "block_actions",
        "user": { "id": "U1" },
        "channel": { "id": "C9" },
        "message": { "ts": "5.0" },
        "actions": [{ "action_id": blocks::APPROVE_ACTION_ID, "value": "{not json" }]
    }))
    .unwrap();

    assert!(handler
        .handle_approval(&payload, &payload.actions[0])
        .await
        .is_err());
    assert!(api.calls().is_empty());
}

// =============================================================================
// Feedback
// =============================================================================

#[tokio::test]
async fn test_feedback_click_sends_ephemeral_thanks() {
    let (api, _registry, handler) = handler();
    let payload: BlockActionsPayload = serde_json::from_value(json!({
        "type": "block_actions",
        "user": { "id": "U42" },
        "channel": { "id": "C9" },
        "message": { "ts": "7.0", "thread_ts": "1700000000.000100" },
        "actions": [{
            "action_id": blocks::FEEDBACK_ACTION_ID,
            "value": "1700000000.000100:negative_feedback"
        }]
    }))
    .unwrap();

    handler.handle(&payload).await;

    let ephemeral = &api.ephemerals()[0];
    assert_eq!(ephemeral.channel, "C9");
    assert_eq!(ephemeral.user, "U42");
    assert_eq!(ephemeral.thread_ts.as_deref(), Some("1700000000.000100"));
    assert_eq!(ephemeral.text, FEEDBACK_THANKS);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_turn_suspends_on_approval_and_resumes_from_click() {
    let api = Arc::new(RecordingSlackApi::new());
    let dyn_api = Arc::clone(&api) as Arc<dyn SlackApi>;
    let registry = ApprovalRegistry::open_in_memory().unwrap();
    let agent = AgentHandle::spawn(
        EchoBackend::new(tools::toolset(Arc::clone(&dyn_api), registry.clone()))
            .with_chunk_delay(Duration::from_millis(1)),
    );
    let relay = TurnRelay::new(Arc::clone(&dyn_api), Arc::new(StatusMap::default()))
        .with_debounce(Duration::from_millis(10));
    let handler = ActionHandler::new(Arc::clone(&dyn_api), registry.clone());

    let request = PromptRequest::new("join <#C123|general>", ToolContext::new("C9", "1.0"));
    let turn = tokio::spawn(async move {
        relay.run(&agent, request, TurnOptions::default()).await
    });

    assert!(api.wait_for(POST_MESSAGE, 1).await, "approval request posted");
    let pending = loop {
        if let Some(row) = registry.pending().unwrap().into_iter().next() {
            if registry.has_waiter(&row.token) {
                break row;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(pending.channel_id, "C123");

    let payload = approval_click(&pending.token, "C123", true);
    handler.handle(&payload).await;

    let outcome = turn.await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    assert_eq!(api.count(JOIN_CHANNEL), 1);
    assert_eq!(api.count(STOP_STREAM), 1);
    let streamed = api.appends().concat();
    assert!(
        streamed.starts_with("Successfully joined channel"),
        "streamed: {:?}",
        streamed
    );
}
