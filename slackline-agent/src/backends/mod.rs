// ABOUTME: Backend implementations (scripted mock, echo demo).
// ABOUTME: Each backend either implements AgentBackend or produces an AgentHandle directly.

pub mod echo;
pub mod mock;
