//! Daemon mode: owns the pipeline and serves it over the IPC socket.

pub mod handler;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::ipc::server::IpcServer;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::stages::{Stages, http_stages};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Run the daemon: build the HTTP stages, start the pipeline, serve IPC until
/// a signal or a `shutdown` command arrives.
///
/// # Arguments
/// * `config` - Validated configuration
/// * `socket_path` - Unix socket for IPC; defaults to [`IpcServer::default_socket_path`]
///
/// # Returns
/// Ok(()) on graceful shutdown, error otherwise
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    let stages = http_stages(&config.services)?;
    tracing::info!(
        recognizer = %config.services.asr_url,
        translator = %config.services.translation_url,
        synthesizer = %config.services.synthesis_url,
        converter = %config.services.conversion_url,
        "stage services configured"
    );

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    serve(config, stages, socket_path, wait_for_signal()).await
}

/// Serve `stages` until `stop` resolves or a client sends `shutdown`.
pub async fn serve<F>(config: Config, stages: Stages, socket_path: PathBuf, stop: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let pipeline = Arc::new(Pipeline::new(PipelineConfig::from_config(&config), stages)?);
    pipeline.start()?;

    let shutdown = Arc::new(Notify::new());
    let server = Arc::new(IpcServer::new(socket_path));
    let handler = Arc::new(handler::DaemonCommandHandler::new(
        Arc::clone(&pipeline),
        Arc::clone(&shutdown),
    ));

    let running = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { running.start(handler).await });
    tracing::info!(
        version = %crate::version_string(),
        socket = %server.socket_path().display(),
        "daemon ready"
    );

    tokio::select! {
        _ = stop => {}
        _ = shutdown.notified() => {}
        res = wait_for_server(server_handle) => {
            // The accept loop only ends early on a bind or accept failure.
            pipeline.stop().await;
            return res;
        }
    }

    server.stop()?;
    pipeline.stop().await;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn wait_for_server(handle: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(Ok(())) => Err(RelayError::IpcSocket {
            message: "IPC server exited unexpectedly".to_string(),
        }),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(RelayError::Other(format!("IPC server task failed: {}", e))),
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn wait_for_signal() {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| RelayError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
