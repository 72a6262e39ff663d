// ABOUTME: Slack platform layer: Web API client, Block Kit builders, and inbound payload types.
// ABOUTME: Everything Slack-specific that the platform-agnostic core is kept free of.

pub mod blocks;
pub mod client;
pub mod events;

pub use client::SlackWebClient;
pub use events::{BlockActionsPayload, EventEnvelope, InboundMessage, SlackEvent};
