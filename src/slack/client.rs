// ABOUTME: Slack Web API client over reqwest, implementing every chat API trait the relay drives.
// ABOUTME: Maps `ok: false` answers to TransportError codes so access failures stay distinguishable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use slackline_core::config::SlackConfig;
use slackline_core::error::TransportError;
use slackline_core::traits::{
    AppendStreamRequest, AssistantStatusApi, ChannelApi, ChannelInfo, ChatStreamApi,
    EphemeralRequest, MessageApi, MessageRef, PostMessageRequest, ReactionApi, SetStatusRequest,
    StartStreamRequest, StopStreamRequest, StreamResponse, SuggestedPromptsRequest,
    UpdateMessageRequest,
};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reaction answers that already describe the state we wanted
const BENIGN_REACTION_CODES: &[&str] = &["already_reacted", "no_reaction"];

/// Bot-token client for `https://slack.com/api/*` (or a test server).
#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackWebClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self> {
        Self::new(config.bot_token.clone(), config.api_base_url.clone())
    }

    fn url(&self, method: &str) -> String {
        format!("{}/api/{}", self.base_url, method)
    }

    /// POST a JSON body to a Web API method and return the `ok: true` payload
    async fn call<B>(&self, method: &'static str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::network(method, e))?;
        Self::read(method, response).await
    }

    /// Read methods such as `conversations.info` only take form-encoded arguments
    async fn call_form(
        &self,
        method: &'static str,
        params: &[(&str, &str)],
    ) -> Result<Value, TransportError> {
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await
            .map_err(|e| TransportError::network(method, e))?;
        Self::read(method, response).await
    }

    async fn read(method: &'static str, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            tracing::warn!(method, retry_after = %retry_after, "Slack rate limited the request");
            return Err(TransportError::api(method, "ratelimited"));
        }

        let body: Value = response.json().await.map_err(|e| {
            TransportError::network(method, format!("HTTP {}: unreadable body: {}", status, e))
        })?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            if let Some(warning) = body.get("warning").and_then(Value::as_str) {
                tracing::debug!(method, warning, "Slack returned a warning");
            }
            return Ok(body);
        }

        let code = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        tracing::debug!(method, code, http_status = status.as_u16(), "Slack call failed");
        Err(TransportError::api(method, code))
    }

    fn decode<T: DeserializeOwned>(method: &'static str, value: Value) -> Result<T, TransportError> {
        serde_json::from_value(value)
            .map_err(|e| TransportError::network(method, format!("unexpected response: {}", e)))
    }

    /// Stream answers normally echo channel and ts; fall back to what we sent
    fn stream_response(body: Value, channel: &str, ts: Option<&str>) -> Result<StreamResponse, TransportError> {
        #[derive(Deserialize)]
        struct Raw {
            channel: Option<String>,
            ts: Option<String>,
        }

        let raw: Raw = Self::decode("chat.stream", body)?;
        let ts = raw
            .ts
            .or_else(|| ts.map(str::to_string))
            .ok_or_else(|| TransportError::network("chat.stream", "response carried no ts"))?;
        Ok(StreamResponse {
            channel: raw.channel.unwrap_or_else(|| channel.to_string()),
            ts,
        })
    }

    async fn react(
        &self,
        method: &'static str,
        target: &MessageRef,
        name: &str,
    ) -> Result<(), TransportError> {
        let body = json!({
            "channel": target.channel,
            "timestamp": target.ts,
            "name": name,
        });
        match self.call(method, &body).await {
            Ok(_) => Ok(()),
            Err(e) if e.code.as_deref().is_some_and(|c| BENIGN_REACTION_CODES.contains(&c)) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Chat API traits
// =============================================================================

#[async_trait]
impl ChatStreamApi for SlackWebClient {
    async fn start_stream(&self, req: &StartStreamRequest) -> Result<StreamResponse, TransportError> {
        let body = self.call("chat.startStream", req).await?;
        Self::stream_response(body, &req.channel, None)
    }

    async fn append_stream(
        &self,
        req: &AppendStreamRequest,
    ) -> Result<StreamResponse, TransportError> {
        let body = self.call("chat.appendStream", req).await?;
        Self::stream_response(body, &req.channel, Some(&req.ts))
    }

    async fn stop_stream(&self, req: &StopStreamRequest) -> Result<StreamResponse, TransportError> {
        let body = self.call("chat.stopStream", req).await?;
        Self::stream_response(body, &req.channel, Some(&req.ts))
    }
}

#[async_trait]
impl AssistantStatusApi for SlackWebClient {
    async fn set_status(&self, req: &SetStatusRequest) -> Result<(), TransportError> {
        self.call("assistant.threads.setStatus", req).await?;
        Ok(())
    }

    async fn set_suggested_prompts(
        &self,
        req: &SuggestedPromptsRequest,
    ) -> Result<(), TransportError> {
        self.call("assistant.threads.setSuggestedPrompts", req).await?;
        Ok(())
    }
}

#[async_trait]
impl ReactionApi for SlackWebClient {
    async fn add_reaction(&self, target: &MessageRef, name: &str) -> Result<(), TransportError> {
        self.react("reactions.add", target, name).await
    }

    async fn remove_reaction(
        &self,
        target: &MessageRef,
        name: &str,
    ) -> Result<(), TransportError> {
        self.react("reactions.remove", target, name).await
    }
}

#[async_trait]
impl ChannelApi for SlackWebClient {
    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        let mut body = self
            .call_form("conversations.info", &[("channel", channel)])
            .await?;
        Self::decode("conversations.info", body["channel"].take())
    }

    async fn join_channel(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        let mut body = self
            .call("conversations.join", &json!({ "channel": channel }))
            .await?;
        let mut info: ChannelInfo = Self::decode("conversations.join", body["channel"].take())?;
        info.is_member = true;
        Ok(info)
    }
}

#[async_trait]
impl MessageApi for SlackWebClient {
    async fn post_message(&self, req: &PostMessageRequest) -> Result<MessageRef, TransportError> {
        let body = self.call("chat.postMessage", req).await?;
        let ts = body["ts"]
            .as_str()
            .ok_or_else(|| TransportError::network("chat.postMessage", "response carried no ts"))?;
        let channel = body["channel"].as_str().unwrap_or(&req.channel);
        Ok(MessageRef::new(channel, ts))
    }

    async fn update_message(&self, req: &UpdateMessageRequest) -> Result<(), TransportError> {
        self.call("chat.update", req).await?;
        Ok(())
    }

    async fn post_ephemeral(&self, req: &EphemeralRequest) -> Result<(), TransportError> {
        self.call("chat.postEphemeral", req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_method() {
        let client = SlackWebClient::new("xoxb-1", "http://localhost:9999/").unwrap();
        assert_eq!(
            client.url("chat.startStream"),
            "http://localhost:9999/api/chat.startStream"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = SlackWebClient::new("xoxb-secret", "https://slack.com").unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("xoxb-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_stream_response_falls_back_to_request() {
        let response =
            SlackWebClient::stream_response(json!({ "ok": true }), "C1", Some("1.0")).unwrap();
        assert_eq!(response.channel, "C1");
        assert_eq!(response.ts, "1.0");

        let err = SlackWebClient::stream_response(json!({ "ok": true }), "C1", None).unwrap_err();
        assert!(err.message.contains("no ts"));
    }
}
