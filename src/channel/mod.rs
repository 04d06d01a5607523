//! Isolated parsing channel
//!
//! Untrusted markup is never parsed on the crawler's own task. It is handed
//! to a separate parsing context (a child process or a dedicated thread) and
//! the answer comes back over a message protocol. This module owns that
//! context's lifecycle:
//!
//! - the context is created lazily on the first parse request
//! - concurrent callers of [`ParsingChannel::ensure_ready`] share a single
//!   in-flight creation
//! - transport failures are translated into [`ChannelError`], with
//!   [`ChannelError::ConnectionLost`] reserved for a context that is gone
//! - [`ParsingChannel::close`] tears the context down

mod process;
mod protocol;
mod thread;
mod worker;

pub use process::ProcessLauncher;
pub use protocol::{decode_response, handle_request, ParseRequest, ParseResponse};
pub use thread::ThreadLauncher;
pub use worker::run_worker;

use crate::config::{WorkerConfig, WorkerMode};
use crate::extract::{ExtractTask, Extracted};
use crate::ChannelError;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A live parsing context reachable only by message passing
#[async_trait]
pub trait ParseContext: Send {
    /// Sends one request and waits for its response
    async fn exchange(&mut self, request: ParseRequest) -> Result<ParseResponse, ChannelError>;

    /// Shuts the context down
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Creates parsing contexts
#[async_trait]
pub trait ContextLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ParseContext>, ChannelError>;
}

/// Builds the launcher selected by the worker configuration
pub fn launcher_from_config(config: &WorkerConfig) -> Result<Arc<dyn ContextLauncher>, ChannelError> {
    let timeout = Duration::from_secs(config.parse_timeout_secs);
    Ok(match config.mode {
        WorkerMode::Process => Arc::new(ProcessLauncher::from_config(config)?),
        WorkerMode::Thread => Arc::new(ThreadLauncher::new(timeout)),
    })
}

type Creation = Shared<BoxFuture<'static, Result<(), ChannelError>>>;

type ContextSlot = Arc<Mutex<Option<Box<dyn ParseContext>>>>;

/// Relays parse requests to a lazily created parsing context
pub struct ParsingChannel {
    launcher: Arc<dyn ContextLauncher>,
    context: ContextSlot,
    creating: Mutex<Option<Creation>>,
}

impl ParsingChannel {
    pub fn new(launcher: Arc<dyn ContextLauncher>) -> Self {
        Self {
            launcher,
            context: Arc::new(Mutex::new(None)),
            creating: Mutex::new(None),
        }
    }

    /// Makes sure a parsing context exists, creating it if needed
    ///
    /// Callers arriving while a creation is in flight await that same
    /// creation. The in-flight marker is cleared once it settles, so a
    /// failed creation can be retried by the next call.
    pub async fn ensure_ready(&self) -> Result<(), ChannelError> {
        let creation = {
            let mut creating = self.creating.lock().await;
            match creating.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    if self.has_active_context().await {
                        return Ok(());
                    }

                    let launcher = Arc::clone(&self.launcher);
                    let slot = Arc::clone(&self.context);
                    let pending = async move {
                        tracing::debug!("Creating parsing context");
                        let context = launcher.launch().await.map_err(|e| {
                            tracing::error!("Error creating parsing context: {}", e);
                            e
                        })?;
                        *slot.lock().await = Some(context);
                        Ok(())
                    }
                    .boxed()
                    .shared();

                    *creating = Some(pending.clone());
                    pending
                }
            }
        };

        let result = creation.clone().await;

        let mut creating = self.creating.lock().await;
        if creating
            .as_ref()
            .is_some_and(|pending| pending.ptr_eq(&creation))
        {
            *creating = None;
        }

        result
    }

    /// Parses markup in the isolated context
    pub async fn parse(&self, task: ExtractTask, markup: String) -> Result<Extracted, ChannelError> {
        self.ensure_ready().await?;

        let request = ParseRequest { task, markup };
        let response = {
            let mut guard = self.context.lock().await;
            let context = guard.as_mut().ok_or_else(|| {
                ChannelError::ConnectionLost("parsing context was closed".to_string())
            })?;
            context.exchange(request).await
        };

        let response = response.map_err(|e| {
            if e.is_connection_lost() {
                tracing::warn!("Connection error suggests the parsing context has died: {}", e);
            } else {
                tracing::error!("Error during exchange for task {:?}: {}", task, e);
            }
            e
        })?;

        protocol::decode_response(task, response)
    }

    /// Returns true if a parsing context currently exists
    pub async fn has_active_context(&self) -> bool {
        self.context.lock().await.is_some()
    }

    /// Tears down the parsing context, if one exists
    pub async fn close(&self) -> Result<(), ChannelError> {
        let context = self.context.lock().await.take();
        match context {
            Some(mut context) => {
                tracing::debug!("Closing parsing context");
                context.close().await
            }
            None => Ok(()),
        }
    }
}
