//! Parsing context hosted on a dedicated thread
//!
//! Requests travel over a tokio channel to an OS thread that owns the HTML
//! parser. Extractor panics are caught on that thread and answered as
//! failure payloads.

use crate::channel::{handle_request, ContextLauncher, ParseContext, ParseRequest, ParseResponse};
use crate::ChannelError;
use async_trait::async_trait;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

type Job = (ParseRequest, oneshot::Sender<ParseResponse>);

/// Spawns extraction threads
#[derive(Debug, Clone)]
pub struct ThreadLauncher {
    response_timeout: Duration,
}

impl ThreadLauncher {
    pub fn new(response_timeout: Duration) -> Self {
        Self { response_timeout }
    }
}

#[async_trait]
impl ContextLauncher for ThreadLauncher {
    async fn launch(&self) -> Result<Box<dyn ParseContext>, ChannelError> {
        let (sender, mut receiver) = mpsc::channel::<Job>(1);

        let handle = std::thread::Builder::new()
            .name("extract-worker".to_string())
            .spawn(move || {
                while let Some((request, reply)) = receiver.blocking_recv() {
                    // The requester may have given up; nothing to do then
                    let _ = reply.send(handle_request(&request));
                }
                tracing::debug!("Extraction thread exiting");
            })
            .map_err(|e| ChannelError::Unavailable(format!("failed to spawn thread: {}", e)))?;

        Ok(Box::new(ThreadContext {
            sender: Some(sender),
            handle: Some(handle),
            response_timeout: self.response_timeout,
        }))
    }
}

struct ThreadContext {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    response_timeout: Duration,
}

#[async_trait]
impl ParseContext for ThreadContext {
    async fn exchange(&mut self, request: ParseRequest) -> Result<ParseResponse, ChannelError> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            ChannelError::ConnectionLost("extraction thread was shut down".to_string())
        })?;

        let (reply, response) = oneshot::channel();
        sender
            .send((request, reply))
            .await
            .map_err(|_| ChannelError::ConnectionLost("extraction thread has exited".to_string()))?;

        match tokio::time::timeout(self.response_timeout, response).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::ConnectionLost(
                "extraction thread dropped the request".to_string(),
            )),
            Err(_) => {
                // A hung thread cannot be joined; detach it
                self.sender = None;
                self.handle = None;
                Err(ChannelError::ConnectionLost(format!(
                    "extraction thread did not respond within {}s",
                    self.response_timeout.as_secs()
                )))
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.sender = None;

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| ChannelError::Teardown(e.to_string()))?
            .map_err(|_| ChannelError::Teardown("extraction thread panicked".to_string()))
    }
}
