//! Process wiring: configuration, supervisor, transport, and shutdown.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::cli::Args;
use crate::clock::SystemClock;
use crate::config::{AppConfig, Transport};
use crate::dispatcher::ToolDispatcher;
use crate::error::ConfigError;
use crate::mcp::McpServer;
use crate::paths::PathResolver;
use crate::player::PlayerCommand;
use crate::supervisor::PlaybackSupervisor;
use crate::transport::{http, stdio};

/// Load configuration and apply command-line overrides.
pub(crate) fn load_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, args)?;
    Ok(config)
}

fn apply_overrides(config: &mut AppConfig, args: &Args) -> Result<(), ConfigError> {
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(bind) = args.bind.as_deref() {
        let (host, port) = split_bind(bind).ok_or_else(|| ConfigError::Invalid {
            key: "--bind",
            value: bind.to_string(),
            reason: "expected HOST:PORT".to_string(),
        })?;
        config.http.host = host;
        config.http.port = port;
    }
    Ok(())
}

fn split_bind(raw: &str) -> Option<(String, u16)> {
    let (host, port) = raw.trim().rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

/// Build the supervisor and serve the configured transport until it ends.
pub(crate) async fn run(config: AppConfig) -> Result<()> {
    tracing::info!(
        root_dir = %config.root_dir.display(),
        output_device = %config.output_device,
        player = %config.player_path,
        transport = ?config.transport,
        "starting audio-playback-server"
    );

    let resolver = PathResolver::new(&config.root_dir, &config.default_format, config.list_max_depth)?;
    tracing::debug!(root = %resolver.root().display(), "sandbox root ready");
    let supervisor = Arc::new(PlaybackSupervisor::new(
        resolver,
        PlayerCommand::new(config.player_path.clone(), config.output_device.clone()),
        Arc::new(SystemClock),
        config.stop_grace,
    ));
    let server = McpServer::new(ToolDispatcher::new(supervisor.clone()));
    let shutdown = shutdown_signal();

    let mut interrupted = false;
    let result = match config.transport {
        Transport::Stdio => {
            tokio::select! {
                result = stdio::run(&server) => result,
                () = shutdown => {
                    tracing::info!("interrupted");
                    interrupted = true;
                    Ok(())
                }
            }
        }
        Transport::Http => http::run(server, &config.http, &config.http.bind_addr(), shutdown).await,
    };

    supervisor.shutdown().await;
    tracing::info!("audio-playback-server stopped");
    if interrupted {
        // The blocking stdin reader would otherwise hold runtime teardown open.
        std::process::exit(0);
    }
    result
}

/// Resolves on Ctrl+C (and SIGTERM).
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        tracing::warn!(error = %e, "failed to install signal handler");
    }
    async move {
        if rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
