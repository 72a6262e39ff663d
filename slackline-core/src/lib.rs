// ABOUTME: Platform-agnostic streaming relay and durable approval hooks for chat agents.
// ABOUTME: Chat API traits, the stream state machine and batching, plus durable approvals and thread context.

pub mod approval;
pub mod batcher;
pub mod config;
pub mod error;
pub mod metrics;
pub mod paths;
pub mod reaction;
pub mod status;
pub mod stream;
pub mod testing;
pub mod thread_context;
pub mod traits;
pub mod turn;

pub use approval::{
    ApprovalDecision, ApprovalRegistry, ApprovalRequest, ApprovalWaiter, PendingApproval,
    ResumeOutcome,
};
pub use batcher::{BatchStats, StreamBatcher};
pub use config::Config;
pub use error::{ApprovalError, ConfigError, RelayError, ThreadContextError, TransportError};
pub use reaction::{ReactionIndicator, ReactionSet};
pub use status::{StatusEvent, StatusMap, StatusNotifier};
pub use thread_context::{AssistantContext, ThreadContextStore};
pub use stream::{StopOptions, StreamController, StreamHandle, StreamState};
pub use traits::{MessageRef, SlackApi, ThreadRef};
pub use turn::{TurnOptions, TurnOutcome, TurnRelay};

// Re-export agent types used across the relay
pub use slackline_agent::{AgentEvent, AgentHandle, EventKind, PromptRequest, ToolContext};
