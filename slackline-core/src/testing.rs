// ABOUTME: In-memory SlackApi double that records every call and can inject failures per method.
// ABOUTME: Used by the relay, approval and HTTP handler tests across the workspace.

use crate::error::TransportError;
use crate::traits::{
    AppendStreamRequest, AssistantStatusApi, ChannelApi, ChannelInfo, ChatStreamApi,
    EphemeralRequest, MessageApi, MessageRef, PostMessageRequest, ReactionApi, SetStatusRequest,
    StartStreamRequest, StopStreamRequest, StreamResponse, SuggestedPromptsRequest,
    UpdateMessageRequest,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const START_STREAM: &str = "chat.startStream";
pub const APPEND_STREAM: &str = "chat.appendStream";
pub const STOP_STREAM: &str = "chat.stopStream";
pub const SET_STATUS: &str = "assistant.threads.setStatus";
pub const SET_SUGGESTED_PROMPTS: &str = "assistant.threads.setSuggestedPrompts";
pub const ADD_REACTION: &str = "reactions.add";
pub const REMOVE_REACTION: &str = "reactions.remove";
pub const CHANNEL_INFO: &str = "conversations.info";
pub const JOIN_CHANNEL: &str = "conversations.join";
pub const POST_MESSAGE: &str = "chat.postMessage";
pub const UPDATE_MESSAGE: &str = "chat.update";
pub const POST_EPHEMERAL: &str = "chat.postEphemeral";

/// One call observed by [`RecordingSlackApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    StartStream(StartStreamRequest),
    AppendStream(AppendStreamRequest),
    StopStream(StopStreamRequest),
    SetStatus(SetStatusRequest),
    SetSuggestedPrompts(SuggestedPromptsRequest),
    AddReaction { target: MessageRef, name: String },
    RemoveReaction { target: MessageRef, name: String },
    ChannelInfo(String),
    JoinChannel(String),
    PostMessage(PostMessageRequest),
    UpdateMessage(UpdateMessageRequest),
    PostEphemeral(EphemeralRequest),
}

impl RecordedCall {
    /// Web API method name of the call
    pub fn method(&self) -> &'static str {
        match self {
            Self::StartStream(_) => START_STREAM,
            Self::AppendStream(_) => APPEND_STREAM,
            Self::StopStream(_) => STOP_STREAM,
            Self::SetStatus(_) => SET_STATUS,
            Self::SetSuggestedPrompts(_) => SET_SUGGESTED_PROMPTS,
            Self::AddReaction { .. } => ADD_REACTION,
            Self::RemoveReaction { .. } => REMOVE_REACTION,
            Self::ChannelInfo(_) => CHANNEL_INFO,
            Self::JoinChannel(_) => JOIN_CHANNEL,
            Self::PostMessage(_) => POST_MESSAGE,
            Self::UpdateMessage(_) => UPDATE_MESSAGE,
            Self::PostEphemeral(_) => POST_EPHEMERAL,
        }
    }
}

#[derive(Default)]
struct Failures {
    /// Consumed one per call, in order
    next: HashMap<&'static str, VecDeque<TransportError>>,
    /// Returned on every call
    always: HashMap<&'static str, TransportError>,
}

/// Recording test double for the whole chat surface.
///
/// Calls are recorded before failures are injected, so a failed call still
/// shows up in [`RecordingSlackApi::calls`].
#[derive(Default)]
pub struct RecordingSlackApi {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<Failures>,
    channels: Mutex<HashMap<String, ChannelInfo>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    next_ts: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingSlackApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register what `conversations.info` returns for a channel
    pub fn with_channel(self, info: ChannelInfo) -> Self {
        lock(&self.channels).insert(info.id.clone(), info);
        self
    }

    /// Fail the next call to `method` with a Slack error code
    pub fn fail_next(&self, method: &'static str, code: &str) {
        lock(&self.failures)
            .next
            .entry(method)
            .or_default()
            .push_back(TransportError::api(method, code));
    }

    /// Fail every call to `method` with a Slack error code
    pub fn fail_always(&self, method: &'static str, code: &str) {
        lock(&self.failures)
            .always
            .insert(method, TransportError::api(method, code));
    }

    /// Make every call to `method` take `delay` before it is recorded
    pub fn delay(&self, method: &'static str, delay: Duration) {
        lock(&self.delays).insert(method, delay);
    }

    pub fn clear_failures(&self) {
        let mut failures = lock(&self.failures);
        failures.next.clear();
        failures.always.clear();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls to `method`
    pub fn count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.method() == method).count()
    }

    /// Method names in call order
    pub fn methods(&self) -> Vec<&'static str> {
        lock(&self.calls).iter().map(RecordedCall::method).collect()
    }

    /// Text of every append, in order
    pub fn appends(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::AppendStream(req) => Some(req.markdown_text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<StopStreamRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::StopStream(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    /// Status strings in order; an empty string is a clear
    pub fn statuses(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::SetStatus(req) => Some(req.status.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn suggested_prompts(&self) -> Vec<SuggestedPromptsRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::SetSuggestedPrompts(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn posts(&self) -> Vec<PostMessageRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::PostMessage(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<UpdateMessageRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::UpdateMessage(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<EphemeralRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::PostEphemeral(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    /// Poll until at least `n` calls to `method` were recorded.
    ///
    /// Returns false after roughly a second of waiting.
    pub async fn wait_for(&self, method: &str, n: usize) -> bool {
        for _ in 0..200 {
            if self.count(method) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.count(method) >= n
    }

    async fn pause(&self, method: &'static str) {
        let delay = lock(&self.delays).get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: RecordedCall) -> Result<(), TransportError> {
        let method = call.method();
        lock(&self.calls).push(call);

        let mut failures = lock(&self.failures);
        if let Some(err) = failures.always.get(method) {
            return Err(err.clone());
        }
        if let Some(err) = failures.next.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(())
    }

    fn mint_ts(&self) -> String {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
        format!("1700000000.{:06}", n)
    }
}

#[async_trait]
impl ChatStreamApi for RecordingSlackApi {
    async fn start_stream(&self, req: &StartStreamRequest) -> Result<StreamResponse, TransportError> {
        self.pause(START_STREAM).await;
        self.record(RecordedCall::StartStream(req.clone()))?;
        Ok(StreamResponse {
            channel: req.channel.clone(),
            ts: self.mint_ts(),
        })
    }

    async fn append_stream(
        &self,
        req: &AppendStreamRequest,
    ) -> Result<StreamResponse, TransportError> {
        self.pause(APPEND_STREAM).await;
        self.record(RecordedCall::AppendStream(req.clone()))?;
        Ok(StreamResponse {
            channel: req.channel.clone(),
            ts: req.ts.clone(),
        })
    }

    async fn stop_stream(&self, req: &StopStreamRequest) -> Result<StreamResponse, TransportError> {
        self.pause(STOP_STREAM).await;
        self.record(RecordedCall::StopStream(req.clone()))?;
        Ok(StreamResponse {
            channel: req.channel.clone(),
            ts: req.ts.clone(),
        })
    }
}

#[async_trait]
impl AssistantStatusApi for RecordingSlackApi {
    async fn set_status(&self, req: &SetStatusRequest) -> Result<(), TransportError> {
        self.pause(SET_STATUS).await;
        self.record(RecordedCall::SetStatus(req.clone()))
    }

    async fn set_suggested_prompts(
        &self,
        req: &SuggestedPromptsRequest,
    ) -> Result<(), TransportError> {
        self.pause(SET_SUGGESTED_PROMPTS).await;
        self.record(RecordedCall::SetSuggestedPrompts(req.clone()))
    }
}

#[async_trait]
impl ReactionApi for RecordingSlackApi {
    async fn add_reaction(&self, target: &MessageRef, name: &str) -> Result<(), TransportError> {
        self.pause(ADD_REACTION).await;
        self.record(RecordedCall::AddReaction {
            target: target.clone(),
            name: name.to_string(),
        })
    }

    async fn remove_reaction(
        &self,
        target: &MessageRef,
        name: &str,
    ) -> Result<(), TransportError> {
        self.pause(REMOVE_REACTION).await;
        self.record(RecordedCall::RemoveReaction {
            target: target.clone(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl ChannelApi for RecordingSlackApi {
    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        self.pause(CHANNEL_INFO).await;
        self.record(RecordedCall::ChannelInfo(channel.to_string()))?;
        Ok(lock(&self.channels)
            .get(channel)
            .cloned()
            .unwrap_or_else(|| ChannelInfo {
                id: channel.to_string(),
                ..Default::default()
            }))
    }

    async fn join_channel(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        self.pause(JOIN_CHANNEL).await;
        self.record(RecordedCall::JoinChannel(channel.to_string()))?;
        let mut channels = lock(&self.channels);
        let info = channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelInfo {
                id: channel.to_string(),
                ..Default::default()
            });
        info.is_member = true;
        Ok(info.clone())
    }
}

#[async_trait]
impl MessageApi for RecordingSlackApi {
    async fn post_message(&self, req: &PostMessageRequest) -> Result<MessageRef, TransportError> {
        self.pause(POST_MESSAGE).await;
        self.record(RecordedCall::PostMessage(req.clone()))?;
        Ok(MessageRef::new(req.channel.clone(), self.mint_ts()))
    }

    async fn update_message(&self, req: &UpdateMessageRequest) -> Result<(), TransportError> {
        self.pause(UPDATE_MESSAGE).await;
        self.record(RecordedCall::UpdateMessage(req.clone()))
    }

    async fn post_ephemeral(&self, req: &EphemeralRequest) -> Result<(), TransportError> {
        self.pause(POST_EPHEMERAL).await;
        self.record(RecordedCall::PostEphemeral(req.clone()))
    }
}
