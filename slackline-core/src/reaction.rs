// ABOUTME: Best-effort emoji reactions on the triggering message to show turn progress.
// ABOUTME: Adds a "working" reaction at start and swaps it for a done/failed one at the end.

use crate::traits::{MessageRef, SlackApi};
use std::sync::Arc;

/// Reaction names used for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSet {
    pub working: String,
    pub done: String,
    pub failed: String,
}

impl Default for ReactionSet {
    fn default() -> Self {
        Self {
            working: "eyes".to_string(),
            done: "white_check_mark".to_string(),
            failed: "x".to_string(),
        }
    }
}

pub struct ReactionIndicator {
    api: Arc<dyn SlackApi>,
    target: MessageRef,
    names: ReactionSet,
    enabled: bool,
}

impl ReactionIndicator {
    pub fn new(api: Arc<dyn SlackApi>, target: MessageRef, names: ReactionSet) -> Self {
        Self {
            api,
            target,
            names,
            enabled: true,
        }
    }

    /// An indicator that never calls the API
    pub fn disabled(api: Arc<dyn SlackApi>, target: MessageRef) -> Self {
        Self {
            api,
            target,
            names: ReactionSet::default(),
            enabled: false,
        }
    }

    pub async fn begin(&self) {
        if self.enabled {
            self.add(&self.names.working).await;
        }
    }

    pub async fn complete(&self, success: bool) {
        if !self.enabled {
            return;
        }
        self.remove(&self.names.working).await;
        let name = if success {
            &self.names.done
        } else {
            &self.names.failed
        };
        self.add(name).await;
    }

    async fn add(&self, name: &str) {
        if let Err(e) = self.api.add_reaction(&self.target, name).await {
            tracing::warn!(reaction = name, channel = %self.target.channel, error = %e, "Failed to add reaction");
        }
    }

    async fn remove(&self, name: &str) {
        if let Err(e) = self.api.remove_reaction(&self.target, name).await {
            tracing::warn!(reaction = name, channel = %self.target.channel, error = %e, "Failed to remove reaction");
        }
    }
}
