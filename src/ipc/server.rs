//! Async Unix socket IPC server for the daemon.

use crate::defaults;
use crate::error::{RelayError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// How often the accept loop rechecks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;
}

/// IPC server for handling daemon commands via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl IpcServer {
    /// Create a new IPC server bound to the specified socket path.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR")
            && !xdg_runtime.is_empty()
        {
            PathBuf::from(xdg_runtime).join(defaults::SOCKET_NAME)
        } else {
            // SAFETY: getuid has no preconditions and cannot fail.
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/voxrelay-{}.sock", uid))
        }
    }

    /// Accept connections until [`IpcServer::stop`] is called.
    ///
    /// Each connection is served on its own task, so a client waiting for a
    /// long translation does not block other clients.
    pub async fn start<H>(&self, handler: Arc<H>) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| RelayError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| RelayError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        tracing::info!(socket = %self.socket_path.display(), "IPC server listening");

        while !self.shutdown.load(Ordering::SeqCst) {
            match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            tracing::warn!(error = %e, "error handling client");
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(RelayError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        tracing::debug!("IPC server stopped accepting");
        Ok(())
    }

    /// Stop accepting and remove the socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| RelayError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Handle a single client connection: one command line in, one response line out.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let response = match Command::from_json(line.trim()) {
        Ok(command) => handler.handle(command).await,
        Err(e) => {
            tracing::debug!(error = %e, "malformed command");
            Response::Error {
                message: format!("Failed to parse command: {}", e),
            }
        }
    };

    let mut response_json = response.to_json().map_err(|e| RelayError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;
    response_json.push('\n');

    writer
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| RelayError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    // Mock handler for testing
    struct MockCommandHandler;

    #[async_trait::async_trait]
    impl CommandHandler for MockCommandHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Submit { wait: true, .. } => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Response::Failed {
                        id: "slow".to_string(),
                        reason: "no speech detected".to_string(),
                    }
                }
                Command::Submit { .. } => Response::Accepted {
                    id: "abc".to_string(),
                    queue_position: 1,
                    eta_ms: 3000,
                },
                Command::Status { id } => Response::Unknown { id, eta_ms: 0 },
                Command::Stats | Command::Shutdown => Response::Ok,
            }
        }
    }

    async fn roundtrip(socket_path: &Path, payload: &[u8]) -> Response {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream.write_all(payload).await.unwrap();

        let mut response_data = Vec::new();
        stream.read_to_end(&mut response_data).await.unwrap();
        let response_str = String::from_utf8(response_data).unwrap();
        Response::from_json(response_str.trim()).unwrap()
    }

    fn spawn_server(socket_path: PathBuf) -> Arc<IpcServer> {
        let server = Arc::new(IpcServer::new(socket_path));
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.start(Arc::new(MockCommandHandler)).await });
        server
    }

    #[test]
    fn test_default_socket_path_returns_valid_path() {
        let path = IpcServer::default_socket_path();
        let path_str = path.to_string_lossy();
        match std::env::var("XDG_RUNTIME_DIR") {
            Ok(dir) if !dir.is_empty() => {
                assert_eq!(path, PathBuf::from(dir).join("voxrelay.sock"));
            }
            _ => {
                let uid = unsafe { libc::getuid() };
                assert_eq!(path_str, format!("/tmp/voxrelay-{}.sock", uid));
            }
        }
    }

    #[tokio::test]
    async fn test_server_binds_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let server = spawn_server(socket_path.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(socket_path.exists());
        assert_eq!(server.socket_path(), socket_path.as_path());

        server.stop().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_start_returns_after_stop() {
        let temp_dir = TempDir::new().unwrap();
        let server = Arc::new(IpcServer::new(temp_dir.path().join("test.sock")));
        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.start(Arc::new(MockCommandHandler)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        server.stop().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop should notice the flag");
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_client_receives_response() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let _server = spawn_server(socket_path.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let command = Command::Status {
            id: "1234".to_string(),
        };
        let payload = format!("{}\n", command.to_json().unwrap());
        let response = roundtrip(&socket_path, payload.as_bytes()).await;
        assert_eq!(
            response,
            Response::Unknown {
                id: "1234".to_string(),
                eta_ms: 0
            }
        );
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_others() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let _server = spawn_server(socket_path.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let slow = {
            let socket_path = socket_path.clone();
            tokio::spawn(async move {
                let payload = format!("{}\n", Command::submit(b"a", None, None, true).to_json().unwrap());
                roundtrip(&socket_path, payload.as_bytes()).await
            })
        };

        let payload = format!("{}\n", Command::submit(b"b", None, None, false).to_json().unwrap());
        let fast = roundtrip(&socket_path, payload.as_bytes()).await;
        assert!(matches!(fast, Response::Accepted { .. }));
        assert!(!slow.is_finished());

        assert!(matches!(slow.await.unwrap(), Response::Failed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_gets_error_response() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let _server = spawn_server(socket_path.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = roundtrip(&socket_path, b"not valid json\n").await;
        assert!(matches!(response, Response::Error { .. }));
    }
}
