// ABOUTME: Assembles the running service from config: agent backend, relay, responder, handlers.
// ABOUTME: Kept separate from main so tests can build the same wiring against test doubles.

use anyhow::{bail, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use slackline_agent::backends::echo::EchoBackend;
use slackline_agent::AgentHandle;
use slackline_core::approval::ApprovalRegistry;
use slackline_core::config::Config;
use slackline_core::thread_context::ThreadContextStore;
use slackline_core::traits::SlackApi;
use slackline_core::turn::TurnRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionHandler;
use crate::assistant::AssistantPane;
use crate::responder::Responder;
use crate::server::AppState;
use crate::tools;

/// Start the configured agent backend with the Slack tools registered
pub fn spawn_agent(
    config: &Config,
    api: Arc<dyn SlackApi>,
    approvals: ApprovalRegistry,
) -> Result<AgentHandle> {
    let toolset = tools::toolset(api, approvals);
    match config.agent.backend_type.as_str() {
        "echo" => {
            let backend = EchoBackend::new(toolset)
                .with_chunk_delay(Duration::from_millis(config.agent.chunk_delay_ms));
            Ok(AgentHandle::spawn(backend))
        }
        other => bail!("Unknown agent backend type: {}", other),
    }
}

/// Build the shared HTTP state
pub fn build_state(
    config: &Config,
    api: Arc<dyn SlackApi>,
    approvals: ApprovalRegistry,
    thread_contexts: ThreadContextStore,
    agent: AgentHandle,
    shutdown: CancellationToken,
    metrics: PrometheusHandle,
) -> Result<AppState> {
    let status_map = Arc::new(config.status.status_map()?);
    let relay = TurnRelay::new(Arc::clone(&api), status_map)
        .with_debounce(config.streaming.debounce())
        .with_turn_timeout(config.streaming.turn_timeout())
        .with_unfurl(config.slack.unfurl_links, config.slack.unfurl_media)
        .with_shutdown(shutdown);

    let reactions = config
        .reactions
        .enabled
        .then(|| config.reactions.reaction_set());

    let responder = Responder::new(Arc::clone(&api), agent, relay)
        .with_bot_user_id(config.slack.bot_user_id.clone())
        .with_feedback_buttons(config.streaming.feedback_buttons)
        .with_reactions(reactions)
        .with_assistant_pane(AssistantPane::new(Arc::clone(&api), thread_contexts));

    Ok(AppState {
        responder,
        actions: ActionHandler::new(api, approvals.clone()),
        approvals,
        metrics,
    })
}
