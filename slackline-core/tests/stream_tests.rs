// ABOUTME: Tests for the stream lifecycle controller's state machine and transport handling.
// ABOUTME: Verifies protocol violations never reach the transport and stop is idempotent.

use slackline_core::stream::{StopOptions, StreamController, StreamHandle, StreamState};
use slackline_core::testing::{RecordingSlackApi, RecordedCall, APPEND_STREAM, START_STREAM, STOP_STREAM};
use slackline_core::traits::SlackApi;
use std::sync::Arc;

fn controller(api: &Arc<RecordingSlackApi>) -> StreamController {
    StreamController::new(Arc::clone(api) as Arc<dyn SlackApi>)
}

#[tokio::test]
async fn test_start_returns_open_handle() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api).with_unfurl(true, false);

    let handle = ctl.start("C1", Some("1.0"), "").await.unwrap();

    assert_eq!(handle.state, StreamState::Open);
    assert_eq!(handle.channel, "C1");
    assert_eq!(handle.thread_ts.as_deref(), Some("1.0"));
    assert!(!handle.ts.is_empty());

    match &api.calls()[0] {
        RecordedCall::StartStream(req) => {
            assert_eq!(req.thread_ts.as_deref(), Some("1.0"));
            assert_eq!(req.markdown_text, None);
            assert_eq!(req.unfurl_links, Some(true));
            assert_eq!(req.unfurl_media, Some(false));
        }
        other => panic!("Expected startStream, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_failure_is_transport_error() {
    let api = Arc::new(RecordingSlackApi::new());
    api.fail_next(START_STREAM, "not_in_channel");

    let err = controller(&api).start("C1", None, "hi").await.unwrap_err();

    assert!(!err.is_protocol_violation());
    assert_eq!(api.count(START_STREAM), 1, "start is not retried");
}

#[tokio::test]
async fn test_append_on_unopened_handle_is_protocol_violation() {
    let api = Arc::new(RecordingSlackApi::new());
    let mut handle = StreamHandle::unopened("C1", None);

    let err = controller(&api).append(&mut handle, "text").await.unwrap_err();

    assert!(err.is_protocol_violation());
    assert!(api.calls().is_empty(), "no transport call for a violation");
}

#[tokio::test]
async fn test_append_after_stop_is_protocol_violation() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api);
    let mut handle = ctl.start("C1", None, "").await.unwrap();
    ctl.stop(&mut handle, StopOptions::default()).await.unwrap();

    let err = ctl.append(&mut handle, "late").await.unwrap_err();

    assert_eq!(err.to_string(), "protocol violation: append on a closed stream");
    assert_eq!(api.count(APPEND_STREAM), 0);
}

#[tokio::test]
async fn test_append_targets_current_ts() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api);
    let mut handle = ctl.start("C1", None, "").await.unwrap();
    let ts = handle.ts.clone();

    ctl.append(&mut handle, "a").await.unwrap();
    ctl.append(&mut handle, "b").await.unwrap();

    for call in api.calls() {
        if let RecordedCall::AppendStream(req) = call {
            assert_eq!(req.ts, ts);
        }
    }
    assert_eq!(api.appends(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_failed_append_leaves_handle_open() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api);
    let mut handle = ctl.start("C1", None, "").await.unwrap();

    api.fail_next(APPEND_STREAM, "internal_error");
    assert!(ctl.append(&mut handle, "x").await.is_err());
    assert!(handle.is_open());
}

#[tokio::test]
async fn test_stop_is_noop_once_closed() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api);
    let mut handle = ctl.start("C1", None, "").await.unwrap();

    ctl.stop(&mut handle, StopOptions::with_text("bye")).await.unwrap();
    ctl.stop(&mut handle, StopOptions::with_text("bye again")).await.unwrap();

    assert_eq!(api.count(STOP_STREAM), 1);
    assert_eq!(api.stops()[0].markdown_text.as_deref(), Some("bye"));
}

#[tokio::test]
async fn test_failed_stop_still_closes() {
    let api = Arc::new(RecordingSlackApi::new());
    let ctl = controller(&api);
    let mut handle = ctl.start("C1", None, "").await.unwrap();

    api.fail_next(STOP_STREAM, "internal_error");
    assert!(ctl.stop(&mut handle, StopOptions::default()).await.is_err());
    assert_eq!(handle.state, StreamState::Closed);

    // A best-effort second stop does not reach the transport
    ctl.stop(&mut handle, StopOptions::with_text("note")).await.unwrap();
    assert_eq!(api.count(STOP_STREAM), 1);
}

#[tokio::test]
async fn test_stop_on_unopened_handle_is_protocol_violation() {
    let api = Arc::new(RecordingSlackApi::new());
    let mut handle = StreamHandle::unopened("C1", None);

    let err = controller(&api)
        .stop(&mut handle, StopOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_protocol_violation());
    assert!(api.calls().is_empty());
}
