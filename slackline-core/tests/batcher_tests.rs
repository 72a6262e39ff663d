// ABOUTME: Tests for the debounced stream batcher - coalescing, ordering, and failure handling.
// ABOUTME: Runs on paused tokio time so debounce windows elapse deterministically.

use slackline_core::batcher::StreamBatcher;
use slackline_core::stream::{StreamController, StreamHandle};
use slackline_core::testing::{RecordingSlackApi, APPEND_STREAM, STOP_STREAM};
use slackline_core::traits::SlackApi;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_millis(100);

async fn open_batcher(api: &Arc<RecordingSlackApi>) -> StreamBatcher {
    let controller = StreamController::new(Arc::clone(api) as Arc<dyn SlackApi>);
    let handle = controller
        .start("C123", Some("1700000000.000100"), "")
        .await
        .unwrap();
    StreamBatcher::new(controller, handle, WINDOW)
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_snapshots_within_one_window_become_one_append() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("Hel").await;
    batcher.on_fragment("Hello wor").await;
    batcher.on_fragment("Hello world!").await;

    assert_eq!(api.count(APPEND_STREAM), 0, "nothing flushes before the window");

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(api.appends(), vec!["Hello world!".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_each_fragment_rearms_the_timer() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("a").await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    batcher.on_fragment("ab").await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    // 160ms since the first fragment but only 80ms since the last
    assert_eq!(api.count(APPEND_STREAM), 0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(api.appends(), vec!["ab".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_separate_windows_append_in_order() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("one ").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    batcher.on_fragment("one two ").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    batcher.on_fragment("one two three").await;
    batcher.flush().await;

    assert_eq!(api.appends(), vec!["one ", "two ", "three"]);
}

// =============================================================================
// Invariants
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_never_appends_empty_delta() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.flush().await;
    batcher.on_fragment("").await;
    batcher.on_fragment("same").await;
    batcher.flush().await;
    batcher.on_fragment("same").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    batcher.flush().await;

    let appends = api.appends();
    assert_eq!(appends, vec!["same".to_string()]);
    assert!(appends.iter().all(|a| !a.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_flushed_deltas_concatenate_to_final_snapshot() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    let words = ["The ", "quick ", "brown ", "fox ", "jumps ", "over ", "the ", "lazy ", "dog"];
    let mut snapshot = String::new();
    for (i, word) in words.iter().enumerate() {
        snapshot.push_str(word);
        batcher.on_fragment(&snapshot).await;
        // Irregular pacing: some gaps exceed the window, some don't
        let gap = if i % 3 == 0 { 130 } else { 20 };
        tokio::time::sleep(Duration::from_millis(gap)).await;
    }
    batcher.finish(None).await.unwrap();

    assert_eq!(api.appends().concat(), snapshot);
    assert!(api.count(APPEND_STREAM) > 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_prefix_snapshot_falls_back_to_offset() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("Hello").await;
    batcher.flush().await;
    // Producer rewrote the first word; only the tail past what was sent goes out
    batcher.on_fragment("Howdy there").await;
    batcher.flush().await;

    assert_eq!(api.appends(), vec!["Hello", " there"]);
    assert_eq!(batcher.accepted().await, "Howdy there");
}

// =============================================================================
// Failures and closing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_append_keeps_text_for_next_flush() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    api.fail_next(APPEND_STREAM, "ratelimited");
    batcher.on_fragment("first").await;
    batcher.flush().await;

    batcher.on_fragment("first second").await;
    batcher.flush().await;

    // Both attempts are recorded; the retry carries everything, in order
    assert_eq!(api.appends(), vec!["first", "first second"]);
    let stats = batcher.stats().await;
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.appends, 1);
    assert_eq!(stats.chars, "first second".len());
}

#[tokio::test(start_paused = true)]
async fn test_finish_flushes_before_stop() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("pending text").await;
    let stats = batcher.finish(None).await.unwrap();

    assert_eq!(stats.appends, 1);
    assert_eq!(
        api.methods(),
        vec!["chat.startStream", "chat.appendStream", "chat.stopStream"]
    );
    assert!(!batcher.handle().await.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_finish_surfaces_stop_failure() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    api.fail_next(STOP_STREAM, "message_not_found");
    batcher.on_fragment("text").await;
    let err = batcher.finish(None).await.unwrap_err();

    assert!(err.to_string().contains("message_not_found"));
    assert_eq!(api.appends(), vec!["text".to_string()]);
    assert!(!batcher.handle().await.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_abort_stops_once_with_note() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("partial").await;
    batcher.abort("\n\n_Error_").await;
    batcher.abort("\n\n_Error_").await;

    let stops = api.stops();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].markdown_text.as_deref(), Some("\n\n_Error_"));
    assert_eq!(api.appends(), vec!["partial".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_not_fire_after_finish() {
    let api = Arc::new(RecordingSlackApi::new());
    let batcher = open_batcher(&api).await;

    batcher.on_fragment("done").await;
    batcher.finish(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(api.count(APPEND_STREAM), 1);
    assert_eq!(api.count(STOP_STREAM), 1);
}
