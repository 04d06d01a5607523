//! Parsing context hosted in a child process
//!
//! The child runs this crate's binary in worker mode and speaks
//! newline-delimited JSON on stdin/stdout. A crash of the HTML parser takes
//! down only the child; the crawler sees end-of-file and reports the
//! connection as lost.

use crate::channel::{ContextLauncher, ParseContext, ParseRequest, ParseResponse};
use crate::config::WorkerConfig;
use crate::ChannelError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Spawns worker processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    response_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, response_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            response_timeout,
        }
    }

    /// Uses the configured worker program, or the running executable
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ChannelError> {
        let program = match &config.program {
            Some(program) => PathBuf::from(program),
            None => std::env::current_exe().map_err(|e| {
                ChannelError::Unavailable(format!("cannot locate worker executable: {}", e))
            })?,
        };

        Ok(Self::new(
            program,
            config.args.clone(),
            Duration::from_secs(config.parse_timeout_secs),
        ))
    }
}

#[async_trait]
impl ContextLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<Box<dyn ParseContext>, ChannelError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ChannelError::Unavailable(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::Unavailable("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::Unavailable("worker stdout not captured".to_string()))?;

        tracing::info!("Started parsing worker (pid {:?})", child.id());

        Ok(Box::new(ProcessContext {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            response_timeout: self.response_timeout,
        }))
    }
}

struct ProcessContext {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    response_timeout: Duration,
}

impl ProcessContext {
    async fn round_trip(&mut self, line: &[u8]) -> Result<String, ChannelError> {
        self.stdin.write_all(line).await.map_err(connection_lost)?;
        self.stdin.flush().await.map_err(connection_lost)?;

        let mut response = String::new();
        let read = self
            .stdout
            .read_line(&mut response)
            .await
            .map_err(connection_lost)?;

        if read == 0 {
            return Err(ChannelError::ConnectionLost(
                "worker closed its output without responding".to_string(),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ParseContext for ProcessContext {
    async fn exchange(&mut self, request: ParseRequest) -> Result<ParseResponse, ChannelError> {
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| ChannelError::Malformed(format!("cannot encode request: {}", e)))?;
        line.push(b'\n');

        let timeout = self.response_timeout;
        let response = match tokio::time::timeout(timeout, self.round_trip(&line)).await {
            Ok(response) => response?,
            Err(_) => {
                // A late answer would desynchronise the stream
                if let Err(e) = self.child.start_kill() {
                    tracing::warn!("Failed to kill unresponsive worker: {}", e);
                }
                return Err(ChannelError::ConnectionLost(format!(
                    "worker did not respond within {}s",
                    timeout.as_secs()
                )));
            }
        };

        serde_json::from_str(response.trim_end()).map_err(|e| ChannelError::Malformed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.child
            .kill()
            .await
            .map_err(|e| ChannelError::Teardown(e.to_string()))
    }
}

fn connection_lost(error: std::io::Error) -> ChannelError {
    ChannelError::ConnectionLost(error.to_string())
}
