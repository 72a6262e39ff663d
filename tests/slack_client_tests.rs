// ABOUTME: Wire-level tests for the reqwest Slack client against a wiremock server.
// ABOUTME: Checks auth, method paths, error-code mapping, rate limits and benign reaction codes.

use serde_json::json;
use slackline::slack::SlackWebClient;
use slackline_core::traits::{
    AppendStreamRequest, AssistantStatusApi, ChannelApi, ChatStreamApi, MessageApi, MessageRef,
    PostMessageRequest, ReactionApi, StartStreamRequest, SuggestedPrompt, SuggestedPromptsRequest,
    ThreadRef,
};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SlackWebClient {
    SlackWebClient::new("xoxb-test", server.uri()).unwrap()
}

#[tokio::test]
async fn start_stream_sends_bearer_token_and_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat.startStream"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_partial_json(json!({
            "channel": "C1",
            "thread_ts": "1.0",
            "markdown_text": "Hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": "C1",
            "ts": "2.0"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .start_stream(&StartStreamRequest {
            channel: "C1".into(),
            thread_ts: Some("1.0".into()),
            markdown_text: Some("Hello".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.channel, "C1");
    assert_eq!(response.ts, "2.0");
}

#[tokio::test]
async fn ok_false_maps_to_error_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat.appendStream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "message_not_in_streaming_state"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .append_stream(&AppendStreamRequest {
            channel: "C1".into(),
            ts: "2.0".into(),
            markdown_text: "more".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.method, "chat.appendStream");
    assert_eq!(err.code.as_deref(), Some("message_not_in_streaming_state"));
    assert!(!err.is_access_error());
}

#[tokio::test]
async fn rate_limit_maps_to_ratelimited_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat.appendStream"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
        .mount(&server)
        .await;

    let err = client(&server)
        .append_stream(&AppendStreamRequest {
            channel: "C1".into(),
            ts: "2.0".into(),
            markdown_text: "more".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code.as_deref(), Some("ratelimited"));
}

#[tokio::test]
async fn channel_info_is_form_encoded_and_access_errors_are_flagged() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversations.info"))
        .and(body_string_contains("channel=C123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": "C123", "name": "general", "is_private": false, "is_member": false }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversations.info"))
        .and(body_string_contains("channel=C999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "channel_not_found"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let info = client.channel_info("C123").await.unwrap();
    assert_eq!(info.name.as_deref(), Some("general"));
    assert!(!info.is_member);

    let err = client.channel_info("C999").await.unwrap_err();
    assert!(err.is_access_error());
}

#[tokio::test]
async fn join_marks_channel_as_member() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversations.join"))
        .and(body_partial_json(json!({ "channel": "C123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": "C123", "name": "general" }
        })))
        .mount(&server)
        .await;

    let info = client(&server).join_channel("C123").await.unwrap();
    assert!(info.is_member);
}

#[tokio::test]
async fn post_message_returns_posted_ts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .and(body_partial_json(json!({ "channel": "C9", "thread_ts": "1.0" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": "C9",
            "ts": "3.0"
        })))
        .mount(&server)
        .await;

    let posted = client(&server)
        .post_message(&PostMessageRequest::threaded(
            &ThreadRef::new("C9", "1.0"),
            "Successfully joined channel general",
        ))
        .await
        .unwrap();

    assert_eq!(posted, MessageRef::new("C9", "3.0"));
}

#[tokio::test]
async fn already_reacted_counts_as_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/reactions.add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "already_reacted"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/reactions.remove"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "message_not_found"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let target = MessageRef::new("C1", "1.0");
    assert!(client.add_reaction(&target, "eyes").await.is_ok());
    assert!(client.remove_reaction(&target, "eyes").await.is_err());
}

#[tokio::test]
async fn suggested_prompts_are_capped_at_four() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/assistant.threads.setSuggestedPrompts"))
        .and(body_partial_json(json!({
            "channel_id": "D1",
            "thread_ts": "1.0",
            "title": "What can I help you with?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let prompts = (0..6)
        .map(|i| SuggestedPrompt {
            title: format!("Prompt {}", i),
            message: format!("Do thing {}", i),
        })
        .collect();
    let request = SuggestedPromptsRequest::new(
        &ThreadRef::new("D1", "1.0"),
        Some("What can I help you with?".into()),
        prompts,
    );
    assert_eq!(request.prompts.len(), 4);

    client(&server).set_suggested_prompts(&request).await.unwrap();

    let received = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(body["prompts"].as_array().unwrap().len(), 4);
    assert_eq!(body["prompts"][3]["title"], "Prompt 3");
}
