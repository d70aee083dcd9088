//! IPC client for sending commands to the daemon.

use crate::error::{RelayError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send a command to the daemon via Unix socket.
///
/// # Arguments
/// * `socket_path` - Path to the Unix socket
/// * `command` - Command to send
///
/// # Errors
/// Returns `RelayError::IpcConnection` if connection fails
/// Returns `RelayError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| RelayError::IpcConnection {
                message: format!(
                    "Failed to connect to daemon at {}: {}",
                    socket_path.display(),
                    e
                ),
            })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut command_json = command.to_json().map_err(|e| RelayError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;
    command_json.push('\n');

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    if response_line.trim().is_empty() {
        return Err(RelayError::IpcProtocol {
            message: "Daemon closed the connection without responding".to_string(),
        });
    }

    Response::from_json(response_line.trim()).map_err(|e| RelayError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{CommandHandler, IpcServer};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    // Mock handler for testing
    struct MockHandler;

    #[async_trait::async_trait]
    impl CommandHandler for MockHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Submit { audio, .. } => Response::Accepted {
                    id: audio,
                    queue_position: 2,
                    eta_ms: 6000,
                },
                Command::Status { id } => Response::Processing {
                    id,
                    stage: "converting".to_string(),
                    eta_ms: 1500,
                },
                Command::Stats => Response::Error {
                    message: "not available".to_string(),
                },
                Command::Shutdown => Response::Ok,
            }
        }
    }

    async fn start_server(temp_dir: &TempDir) -> std::path::PathBuf {
        let socket_path = temp_dir.path().join("test.sock");
        let server = Arc::new(IpcServer::new(socket_path.clone()));
        tokio::spawn(async move { server.start(Arc::new(MockHandler)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        socket_path
    }

    #[tokio::test]
    async fn test_send_submit() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = start_server(&temp_dir).await;

        let response = send_command(&socket_path, Command::submit(b"hi", None, None, false))
            .await
            .unwrap();

        match response {
            Response::Accepted {
                id,
                queue_position,
                eta_ms,
            } => {
                // The mock echoes the base64 payload as the id.
                assert_eq!(id, "aGk=");
                assert_eq!(queue_position, 2);
                assert_eq!(eta_ms, 6000);
            }
            other => panic!("Expected Accepted response, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_status() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = start_server(&temp_dir).await;

        let response = send_command(
            &socket_path,
            Command::Status {
                id: "r-1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            response,
            Response::Processing {
                id: "r-1".to_string(),
                stage: "converting".to_string(),
                eta_ms: 1500,
            }
        );
    }

    #[tokio::test]
    async fn test_send_shutdown_and_error() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = start_server(&temp_dir).await;

        let response = send_command(&socket_path, Command::Shutdown).await.unwrap();
        assert_eq!(response, Response::Ok);

        let response = send_command(&socket_path, Command::Stats).await.unwrap();
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_connection_error_when_daemon_not_running() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("nonexistent.sock");

        let result = send_command(&socket_path, Command::Stats).await;
        match result {
            Err(RelayError::IpcConnection { message }) => {
                assert!(message.contains("Failed to connect to daemon"));
            }
            other => panic!("Expected IpcConnection error, got: {:?}", other),
        }
    }
}
