// ABOUTME: Entry point: `serve` runs the Slack relay server, `pending` lists unresolved approvals.
// ABOUTME: Initializes logging, config, the approval registry, metrics, and graceful shutdown.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slackline::{app, approval::ApprovalRegistry, config::Config, metrics, server, slack::SlackWebClient};
use slackline_core::traits::SlackApi;
use slackline_core::thread_context::ThreadContextStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "slackline", version, about = "Stream agent responses into Slack threads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// List approvals still waiting for a click
    Pending {
        /// Print as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! slackline crashed with the following error:       ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();

    // SLACKLINE_LOG_JSON=1 switches to one JSON object per line
    let json_logs = std::env::var("SLACKLINE_LOG_JSON").is_ok_and(|v| v != "0");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Pending { json } => list_pending(&config, json),
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting slackline");
    tracing::info!(
        api = %config.slack.api_base_url,
        host = %config.server.host,
        port = config.server.port,
        agent = %config.agent.backend_type,
        debounce_ms = config.streaming.debounce_ms,
        "Configuration loaded"
    );

    if config.slack.bot_token.is_empty() {
        tracing::warn!("No Slack bot token configured; every API call will fail");
    }

    let approvals = ApprovalRegistry::open(config.data_dir())?;
    let recovered = approvals
        .recover()
        .context("Failed to recover pending approvals")?;
    if !recovered.is_empty() {
        tracing::info!(
            count = recovered.len(),
            "Pending approvals from a previous run will be finished when clicked"
        );
    }

    let thread_contexts = ThreadContextStore::open(config.data_dir())?;

    let metrics_handle = metrics::init_metrics()?;
    let api: Arc<dyn SlackApi> = Arc::new(SlackWebClient::from_config(&config.slack)?);
    let agent = app::spawn_agent(&config, Arc::clone(&api), approvals.clone())?;

    let shutdown = CancellationToken::new();
    let state = app::build_state(
        &config,
        api,
        approvals,
        thread_contexts,
        agent,
        shutdown.clone(),
        metrics_handle,
    )?;
    let responder = state.responder.clone();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    server::serve(&addr, state, shutdown).await?;

    responder.shutdown().await;
    tracing::info!("slackline stopped");
    Ok(())
}

fn list_pending(config: &Config, json: bool) -> Result<()> {
    let approvals = ApprovalRegistry::open(config.data_dir())?;
    let pending = approvals.pending().context("Failed to read approvals")?;

    if json {
        for approval in &pending {
            println!("{}", serde_json::to_string(approval)?);
        }
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending approvals.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    for approval in &pending {
        let waited = now - approval.requested_at;
        println!(
            "{}  channel={}{}  requested={} ({}m ago)  thread={}",
            approval.token,
            approval.channel_id,
            approval
                .channel_name
                .as_deref()
                .map(|n| format!(" (#{})", n))
                .unwrap_or_default(),
            approval.requested_at.to_rfc3339(),
            waited.num_minutes(),
            approval
                .origin()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}
