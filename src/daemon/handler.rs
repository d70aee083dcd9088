//! Command handler implementation for the daemon.

use crate::ipc::protocol::{Command, Response, StatsReport, decode_audio};
use crate::ipc::server::CommandHandler;
use crate::pipeline::{Pipeline, RequestId, StatusReport};
use std::sync::Arc;
use tokio::sync::Notify;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    pipeline: Arc<Pipeline>,
    shutdown: Arc<Notify>,
}

impl DaemonCommandHandler {
    /// Creates a new command handler.
    ///
    /// A `shutdown` command wakes `shutdown`; the daemon owns the actual stop.
    pub fn new(pipeline: Arc<Pipeline>, shutdown: Arc<Notify>) -> Self {
        Self { pipeline, shutdown }
    }

    async fn submit(
        &self,
        audio: &str,
        source_language: Option<String>,
        target_language: Option<String>,
        wait: bool,
    ) -> Response {
        let audio = match decode_audio(audio) {
            Ok(audio) => audio,
            Err(e) => {
                return Response::Error {
                    message: format!("Audio is not valid base64: {}", e),
                };
            }
        };

        let pending = match self
            .pipeline
            .enqueue(audio, source_language, target_language)
        {
            Ok(pending) => pending,
            Err(e) => return Response::from(&e),
        };

        if !wait {
            return Response::from(&pending.detach());
        }

        let id = pending.id;
        let report = match pending.wait().await {
            Ok(output) => StatusReport::Completed(output),
            Err(failure) => StatusReport::Failed { id, failure },
        };
        // The waiter got the outcome; don't leave a copy behind for polling.
        self.pipeline.discard(id);
        Response::from(&report)
    }

    fn status(&self, id: &str) -> Response {
        match id.parse::<RequestId>() {
            Ok(id) => Response::from(&self.pipeline.status(id)),
            Err(e) => Response::Error {
                message: format!("Invalid request id '{}': {}", id, e),
            },
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Submit {
                audio,
                source_language,
                target_language,
                wait,
            } => {
                self.submit(&audio, source_language, target_language, wait)
                    .await
            }
            Command::Status { id } => self.status(&id),
            Command::Stats => Response::Stats {
                stats: StatsReport::from(&self.pipeline.stats()),
            },
            Command::Shutdown => {
                tracing::info!("shutdown requested over IPC");
                self.shutdown.notify_one();
                Response::Ok
            }
        }
    }
}
