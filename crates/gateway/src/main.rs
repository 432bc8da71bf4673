use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ad_broker::Broker;
use ad_domain::config::{Config, ConfigSeverity};
use ad_gateway::api;
use ad_gateway::cli::{Cli, Command, ConfigCommand};
use ad_gateway::engine::TaskEngine;
use ad_gateway::scheduler::Dispatch;
use ad_gateway::state::AppState;
use ad_llm::{OpenAiResponsesClient, UsageLedger};
use ad_notify::SessionNotifier;
use ad_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = ad_gateway::cli::load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = ad_gateway::cli::load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                println!("{:?}: {issue}", issue.severity);
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("configuration OK");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = ad_gateway::cli::load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("dispatchd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ad_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("dispatchd starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let store = Store::connect(&config.database)
        .await
        .context("connecting to MySQL")?;
    tracing::info!("store ready");

    // ── Broker ───────────────────────────────────────────────────────
    let broker = Arc::new(
        Broker::connect(&config.redis)
            .await
            .context("connecting to Redis")?,
    );
    tracing::info!("broker ready");

    // ── LLM facade ───────────────────────────────────────────────────
    let llm = Arc::new(
        OpenAiResponsesClient::from_config(&config.llm)
            .context("initializing LLM client")?,
    );
    tracing::info!(model = %config.llm.model, "LLM facade ready");

    // ── Notifier ─────────────────────────────────────────────────────
    let notifier = Arc::new(
        SessionNotifier::from_config(&config.notifier)
            .context("initializing session notifier")?,
    );
    tracing::info!(
        configured = !config.notifier.base_url.is_empty(),
        "session notifier ready"
    );

    // ── Usage ledger ─────────────────────────────────────────────────
    let usage = Arc::new(UsageLedger::new());

    // ── Engine ───────────────────────────────────────────────────────
    let engine = Arc::new(TaskEngine::new(
        store.clone(),
        broker.clone(),
        llm.clone(),
        notifier.clone(),
        usage.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        store,
        broker: broker.clone(),
        llm,
        notifier,
        usage,
        engine,
    };

    // ── Scheduler (producers + consumers) ────────────────────────────
    Dispatch::start(&state)
        .await
        .context("starting scheduler")?;

    // ── Router ───────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors_allowed_origins);
    let app = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "dispatchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(broker))
        .await
        .context("axum server error")?;

    Ok(())
}

/// Wait for ctrl-c, then drain the broker's consumer fibers.
async fn shutdown_signal(broker: Arc<Broker>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested, stopping consumers");
    broker.shutdown().await;
}

/// CORS from the configured origins. A single `"*"` allows everything.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    let allow_origin = if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(hv) => Some(hv),
                Err(_) => {
                    tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
