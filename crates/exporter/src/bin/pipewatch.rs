//! pipewatch: Prometheus exporter for GitLab CI pipelines.
//!
//! Polls the configured projects (plus those discovered through wildcards)
//! and serves the resulting metrics on `GET /metrics`.
//!
//! # Usage
//!
//! ```bash
//! pipewatch --config pipewatch.yml --listen-address 0.0.0.0:8080
//!
//! # Replay recent pipeline history once at startup
//! pipewatch --on-init
//!
//! # Via environment variables
//! PIPEWATCH_CONFIG=/etc/pipewatch.yml PIPEWATCH_GITLAB_TOKEN=glpat-... pipewatch
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pipewatch_core::{load_dotenv, Config};
use pipewatch_exporter::{join_within, server, Metrics, Orchestrator};
use tokio::sync::{oneshot, watch};

/// Grace window for in-flight polls and scrapes once shutdown starts.
const HTTP_GRACE: Duration = Duration::from_secs(5);

/// Prometheus exporter for GitLab CI pipelines.
#[derive(Parser, Debug)]
#[command(name = "pipewatch", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "PIPEWATCH_CONFIG", default_value = "pipewatch.yml")]
    config: PathBuf,

    /// Address the metrics endpoint binds to.
    #[arg(long, env = "PIPEWATCH_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    listen_address: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "PIPEWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Replay recent pipelines at startup even if the config does not ask for it.
    #[arg(long, env = "PIPEWATCH_ON_INIT")]
    on_init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!(?cli, "starting pipewatch");

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    config.log_summary();

    let (directory, version) = pipewatch_exporter::connect(&config)
        .await
        .context("GitLab connectivity check failed")?;
    tracing::info!(%version, url = %config.gitlab.url, "connected to GitLab");

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let replay = cli.on_init || config.on_init_fetch_refs_from_pipelines;
    let orchestrator = Arc::new(Orchestrator::new(config, directory, Arc::clone(&metrics)));

    let (stop_tx, stop_rx) = oneshot::channel();
    let (on_init_tx, on_init_rx) = oneshot::channel();
    if replay {
        let _ = on_init_tx.send(());
    } else {
        drop(on_init_tx);
    }
    let polling = Arc::clone(&orchestrator).orchestrate_polling(stop_rx, on_init_rx);

    let listener = tokio::net::TcpListener::bind(&cli.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen_address))?;
    tracing::info!(address = %cli.listen_address, "serving /metrics");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http = tokio::spawn(async move {
        axum::serve(listener, server::router(metrics))
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    let _ = stop_tx.send(());
    let _ = shutdown_tx.send(true);

    // polls and scrapes share one grace budget
    let deadline = tokio::time::Instant::now() + HTTP_GRACE;
    join_within(polling, HTTP_GRACE).await;

    match tokio::time::timeout_at(deadline, http).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "metrics server failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "metrics server task failed"),
        Err(_) => tracing::warn!(grace = ?HTTP_GRACE, "metrics server did not stop in time"),
    }

    tracing::info!("pipewatch exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
