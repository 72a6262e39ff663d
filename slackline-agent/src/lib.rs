// ABOUTME: Agent event model and pluggable backend abstraction for slackline.
// ABOUTME: Backends stream typed events through Send+Sync handles; tools plug in via the Tool trait.

pub mod backends;
pub mod event;
pub mod handle;
pub mod tool;
pub mod traits;

pub use event::{AgentEvent, ErrorCode, EventKind, Usage};
pub use handle::{AgentHandle, EventReceiver};
pub use tool::{Tool, ToolContext, ToolSet};
pub use traits::{AgentBackend, PromptRequest};
