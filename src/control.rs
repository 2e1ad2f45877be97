//! Local control socket.
//!
//! One request per connection: the client writes a JSON object such as
//! `{"command": "status"}`, the server answers with
//! `{"success": bool, "message"?: string, "data"?: {...}}` and closes the
//! connection. Connections are served one at a time.

use crate::context::MonitorContext;
use crate::error::{FmonError, FmonResult};
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time;

const MAX_REQUEST_LEN: usize = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub command: String,
}

impl ControlRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Stop,
}

impl Command {
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "status" => Some(Command::Status),
            "stop" => Some(Command::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    pub running: bool,
    pub watch_count: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

impl ControlResponse {
    pub fn ok(message: Option<String>, data: Option<StatusData>) -> Self {
        Self {
            success: true,
            message,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Accept loop bound to the configured socket path.
pub struct ControlServer {
    ctx: Arc<MonitorContext>,
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ControlServer {
    /// Binds the socket, replacing a stale socket file left by an earlier run.
    pub fn bind(ctx: Arc<MonitorContext>) -> FmonResult<Self> {
        let socket_path = ctx.config.socket_path.clone();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!("control channel listening on {}", socket_path.display());

        Ok(Self {
            ctx,
            listener,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serves connections until shutdown, then removes the socket file.
    pub async fn run(self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        if let Err(e) = self.serve(stream).await {
                            tracing::warn!("control connection failed: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("control accept failed: {}", e);
                    }
                },
                _ = self.ctx.shutdown.cancelled() => break,
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!("removing {} failed: {}", self.socket_path.display(), e);
        }
        tracing::debug!("control channel closed");
    }

    async fn serve(&self, mut stream: UnixStream) -> FmonResult<()> {
        let request = match time::timeout(REQUEST_TIMEOUT, read_request(&mut stream)).await {
            Ok(result) => result?,
            Err(_) => Vec::new(),
        };

        let (response, command) = self.respond(&request);
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stream.write_all(&payload).await?;
        stream.shutdown().await?;

        if command == Some(Command::Stop) {
            self.ctx.log.record("[STOP] Stop requested over control channel");
            self.ctx.shutdown.trigger();
        }
        Ok(())
    }

    fn respond(&self, raw: &[u8]) -> (ControlResponse, Option<Command>) {
        let request: ControlRequest = match serde_json::from_slice(raw) {
            Ok(request) => request,
            Err(e) => return (ControlResponse::failure(format!("invalid request: {e}")), None),
        };

        match Command::parse(&request.command) {
            Some(Command::Status) => {
                let data = StatusData {
                    running: !self.ctx.shutdown.is_triggered(),
                    watch_count: self.ctx.registry.len(),
                    stats: self.ctx.latest_snapshot(),
                };
                (ControlResponse::ok(None, Some(data)), Some(Command::Status))
            }
            Some(Command::Stop) => (
                ControlResponse::ok(Some("Stopping monitoring".to_string()), None),
                Some(Command::Stop),
            ),
            None => (
                ControlResponse::failure(format!("unknown command '{}'", request.command)),
                None,
            ),
        }
    }
}

/// Reads until the bytes parse as one JSON value, the peer stops writing,
/// or the size limit is hit.
async fn read_request(stream: &mut UnixStream) -> FmonResult<Vec<u8>> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..n]);

        match serde_json::from_slice::<serde_json::Value>(&request) {
            Ok(_) => break,
            Err(e) if e.is_eof() && request.len() < MAX_REQUEST_LEN => continue,
            Err(_) => break,
        }
    }
    Ok(request)
}

/// Sends one command to a running monitor and returns its reply.
pub async fn send_command(socket_path: &Path, command: &str) -> FmonResult<ControlResponse> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
        FmonError::Control(format!("cannot connect to {}: {}", socket_path.display(), e))
    })?;

    let request = serde_json::to_vec(&ControlRequest::new(command))?;
    stream.write_all(&request).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    if reply.is_empty() {
        return Err(FmonError::Control("empty reply".to_string()));
    }
    Ok(serde_json::from_slice(&reply)?)
}
