// ABOUTME: Event types emitted by agent backends while answering a prompt.
// ABOUTME: Covers text segments, reasoning, tool lifecycle, results, errors, and the EventKind projection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by agent backends during prompt execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// A new text segment begins; the previous segment (if any) has ended
    TextStart {
        /// Segment identifier
        id: String,
    },

    /// Incremental text chunk belonging to the current segment
    Text(String),

    /// The current text segment is complete
    TextEnd {
        /// Matches the id from TextStart
        id: String,
    },

    /// Reasoning/thinking chunk. Never rendered, only drives status.
    Reasoning(String),

    /// Tool started execution
    ToolStart {
        /// Unique identifier for this tool invocation
        id: String,
        /// Tool name (e.g., "joinChannel")
        name: String,
        /// Full input passed to the tool
        input: Value,
    },

    /// Tool completed execution
    ToolEnd {
        /// Matches the id from ToolStart
        id: String,
        /// Tool name
        name: String,
        /// Full output from the tool
        output: Value,
        /// Whether the tool succeeded
        success: bool,
        /// Execution time in milliseconds
        duration_ms: u64,
    },

    /// Final result with optional usage statistics
    Result {
        /// The final text response
        text: String,
        /// Token usage (if available)
        usage: Option<Usage>,
        /// Backend-specific metadata
        metadata: Value,
    },

    /// Error occurred during execution
    Error {
        /// Typed error code for programmatic handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Whether the error is recoverable (can retry)
        recoverable: bool,
    },

    /// Backend-specific event for extensibility
    Custom {
        /// Event kind (e.g., "echo.heartbeat")
        kind: String,
        /// Event payload
        payload: Value,
    },
}

impl AgentEvent {
    /// The status-relevant kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TextStart { .. } => EventKind::TextStart,
            Self::Text(_) => EventKind::TextDelta,
            Self::TextEnd { .. } => EventKind::TextEnd,
            Self::Reasoning(_) => EventKind::Reasoning,
            Self::ToolStart { .. } => EventKind::ToolCall,
            Self::ToolEnd { .. } => EventKind::ToolResult,
            Self::Result { .. } => EventKind::Finish,
            Self::Error { .. } => EventKind::Error,
            Self::Custom { .. } => EventKind::Custom,
        }
    }

    /// Tool name for tool lifecycle events
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolStart { name, .. } | Self::ToolEnd { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Enumerated event kinds used to key status text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Turn accepted, before any model/tool work
    Start,
    TextStart,
    TextDelta,
    TextEnd,
    Reasoning,
    ToolCall,
    ToolResult,
    Finish,
    Error,
    Custom,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::Start,
        Self::TextStart,
        Self::TextDelta,
        Self::TextEnd,
        Self::Reasoning,
        Self::ToolCall,
        Self::ToolResult,
        Self::Finish,
        Self::Error,
        Self::Custom,
    ];

    /// Terminal kinds end a phase of work; their status entry clears the status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TextEnd | Self::Finish | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TextStart => "text_start",
            Self::TextDelta => "text_delta",
            Self::TextEnd => "text_end",
            Self::Reasoning => "reasoning",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Finish => "finish",
            Self::Error => "error",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "text_start" => Ok(Self::TextStart),
            "text_delta" => Ok(Self::TextDelta),
            "text_end" => Ok(Self::TextEnd),
            // "thinking" is accepted as an alias in config files
            "reasoning" | "thinking" => Ok(Self::Reasoning),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "finish" => Ok(Self::Finish),
            "error" => Ok(Self::Error),
            "custom" => Ok(Self::Custom),
            _ => anyhow::bail!("Unknown event kind: {}", s),
        }
    }
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Rate limited by the backend
    RateLimited,
    /// Authentication failed
    AuthFailed,
    /// Tool execution failed
    ToolFailed,
    /// Backend-specific error
    BackendError,
    /// Unknown error
    Unknown,
}

/// Token usage tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    /// Input tokens consumed
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
}
