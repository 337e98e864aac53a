//! Publishing the local port under a public URL.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExposureError {
    #[error("Failed to start tunnel `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel exited without reporting a public URL")]
    NoUrl,
}

/// Something that can make a local port reachable from outside.
#[async_trait]
pub trait PortExposer: Send + Sync {
    /// Returns the public URL once it is known. Callers bound the wait.
    async fn expose(&self, port: u16) -> Result<String, ExposureError>;
}

/// A URL known up front, e.g. a reverse proxy configured by the operator.
#[derive(Debug, Clone)]
pub struct FixedUrl(pub String);

#[async_trait]
impl PortExposer for FixedUrl {
    async fn expose(&self, _port: u16) -> Result<String, ExposureError> {
        Ok(self.0.clone())
    }
}

/// Runs an external tunnel binary and scrapes the first `https://` URL it
/// prints on stdout or stderr.
///
/// The child is kept for as long as this value lives and is killed when it
/// is dropped.
pub struct TunnelCommand {
    command: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl TunnelCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            child: Mutex::new(None),
        }
    }

    fn args_for(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args.iter().map(|arg| arg.replace("{port}", &port)).collect()
    }
}

#[async_trait]
impl PortExposer for TunnelCommand {
    async fn expose(&self, port: u16) -> Result<String, ExposureError> {
        let args = self.args_for(port);
        debug!(command = %self.command, ?args, "starting tunnel");

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExposureError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let (line_tx, mut line_rx) = mpsc::channel(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
        }

        while let Some(line) = line_rx.recv().await {
            if let Some(url) = extract_public_url(&line) {
                info!(%url, command = %self.command, "tunnel reported public URL");
                *self.child.lock().await = Some(child);
                return Ok(url);
            }
        }

        Err(ExposureError::NoUrl)
    }
}

/// Reads lines until the stream ends. Keeps draining after the receiver is
/// gone so the child never blocks on a full pipe.
async fn forward_lines<R>(stream: R, lines: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if !lines.is_closed() {
            let _ = lines.send(line).await;
        }
    }
}

/// First `https://` URL in a line of tunnel output.
pub fn extract_public_url(line: &str) -> Option<String> {
    let start = line.find("https://")?;
    let candidate: String = line[start..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '|' | '<' | '>'))
        .collect();
    let url = candidate.trim_end_matches(['.', ',', ';', ')']);

    if url.len() > "https://".len() {
        Some(url.to_string())
    } else {
        None
    }
}
