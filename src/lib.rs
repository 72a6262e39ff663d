// ABOUTME: Slack front end for the slackline relay: Web API client, tools, click handlers, HTTP server.
// ABOUTME: Wires the platform-agnostic core and agent crates to Slack.

pub mod actions;
pub mod app;
pub mod assistant;
pub mod responder;
pub mod server;
pub mod slack;
pub mod tools;

// Re-export platform-agnostic modules from slackline-core
pub use slackline_core::approval;
pub use slackline_core::config;
pub use slackline_core::metrics;
pub use slackline_core::paths;

// Re-export agent types for convenience
pub use slackline_agent::{AgentEvent, AgentHandle};
