//! mcp-bridge binary entry point (§4.7).

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_bridge::cli::Cli;
use mcp_bridge::config::BridgeConfig;
use mcp_bridge::http::build_router;
use mcp_bridge::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if let Some(port) = cli.port {
        std::env::set_var("PORT", port.to_string());
    }

    let config = BridgeConfig::load(cli.config).context("failed to load configuration")?;
    tracing::info!(
        target: "mcp_bridge::main",
        "configuration loaded: command={}, port={}",
        config.tool.command,
        config.port
    );

    let orchestrator = Orchestrator::new(&config)
        .await
        .context("failed to construct orchestrator")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", orchestrator.port))
        .await
        .with_context(|| format!("failed to bind port {}", orchestrator.port))?;
    tracing::info!(target: "mcp_bridge::main", "listening on port {}", orchestrator.port);

    let router = build_router(orchestrator.app_state());

    let shutdown_signal = async {
        wait_for_shutdown_signal().await;
        tracing::info!(target: "mcp_bridge::main", "shutdown signal received");
    };

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await;

    if let Err(err) = orchestrator.shutdown().await {
        tracing::warn!(target: "mcp_bridge::main", "shutdown sequencing: {err}");
    }

    serve_result.context("HTTP server exited with an error")?;
    Ok(())
}

/// Waits for either Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcp_bridge=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
