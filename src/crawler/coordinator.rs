//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl that rebuilds the index from scratch:
//! - Fetching the listing page and extracting guidance links
//! - Fetching and extracting every guidance document in turn
//! - Building and persisting the index
//! - Reporting progress and tearing the parsing context down

use crate::channel::{launcher_from_config, ParsingChannel};
use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_page, page_label, resolve_links, FetchResult};
use crate::extract::{ContentRecord, ExtractTask, Extracted};
use crate::index::{self, Document};
use crate::state::{CrawlPhase, CrawlState, StatusObserver, StatusSnapshot, StatusUpdate};
use crate::storage::{self, SqliteStore};
use crate::{ChannelError, CrawlError};
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Status shown when a previous build is available
pub const STATUS_INDEX_LOADED: &str = "Index loaded from storage. Ready.";

/// Status shown when nothing has been built yet
pub const STATUS_NOT_BUILT: &str = "Index not built yet.";

/// Answer to a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The crawl slot was claimed
    Started,
    /// A crawl is already running; nothing changed
    AlreadyRunning,
    /// The extraction or indexing library failed its startup check
    Unavailable(String),
}

/// What happened to one guidance page
enum PageOutcome {
    Indexed(Document),
    Skipped(String),
    Failed(String),
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: Option<String>,
    client: Client,
    channel: Arc<ParsingChannel>,
    storage: Mutex<SqliteStore>,
    state: Mutex<CrawlState>,
    observer: Arc<dyn StatusObserver>,
    library_status: Result<(), String>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// The extraction and indexing libraries are checked here, once. If the
    /// check fails the status reports it and every later start is refused.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `storage` - Where the index is persisted
    /// * `channel` - The isolated parsing channel
    /// * `observer` - Receives progress notifications
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(GuidanceError)` - The HTTP client could not be built
    pub fn new(
        config: Config,
        storage: SqliteStore,
        channel: Arc<ParsingChannel>,
        observer: Arc<dyn StatusObserver>,
    ) -> crate::Result<Self> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.fetch.request_timeout_secs),
        )?;

        let initial_status = match storage::has_index(&storage) {
            Ok(true) => STATUS_INDEX_LOADED,
            Ok(false) => STATUS_NOT_BUILT,
            Err(e) => {
                tracing::warn!("Could not read persisted index: {}", e);
                STATUS_NOT_BUILT
            }
        };

        let coordinator = Self {
            config: Arc::new(config),
            config_hash: None,
            client,
            channel,
            storage: Mutex::new(storage),
            state: Mutex::new(CrawlState::new(initial_status)),
            observer,
            library_status: Ok(()),
        };

        Ok(coordinator.with_library_status(preflight()))
    }

    /// Creates a coordinator from configuration alone
    ///
    /// Opens the database named by the config and builds the parsing
    /// context launcher the `[worker]` section selects.
    pub fn from_config(
        config: Config,
        config_hash: Option<String>,
        observer: Arc<dyn StatusObserver>,
    ) -> crate::Result<Self> {
        let storage = storage::open_store(Path::new(&config.output.database_path))?;
        let launcher = launcher_from_config(&config.worker)?;
        let channel = Arc::new(ParsingChannel::new(launcher));
        Ok(Self::new(config, storage, channel, observer)?.with_config_hash(config_hash))
    }

    /// Records the hash of the config file beside every persisted build
    pub fn with_config_hash(mut self, config_hash: Option<String>) -> Self {
        self.config_hash = config_hash;
        self
    }

    /// Replaces the startup library check result
    pub fn with_library_status(mut self, status: Result<(), String>) -> Self {
        if let Err(reason) = &status {
            tracing::error!("Required library unavailable: {}", reason);
            self.report(format!("Error: {}", reason), true);
        }
        self.library_status = status;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current status text and whether a crawl is running
    pub fn status(&self) -> StatusSnapshot {
        self.lock_state().snapshot()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.lock_state().phase()
    }

    /// Claims the single crawl slot
    ///
    /// A start while a crawl is running changes nothing.
    pub fn begin(&self) -> StartOutcome {
        if let Err(reason) = &self.library_status {
            return StartOutcome::Unavailable(reason.clone());
        }
        if self.lock_state().try_begin() {
            tracing::info!("Crawl started");
            StartOutcome::Started
        } else {
            tracing::debug!("Start requested while a crawl is running, ignoring");
            StartOutcome::AlreadyRunning
        }
    }

    /// Runs a crawl previously claimed with [`Coordinator::begin`]
    ///
    /// Whatever the outcome, the crawl slot is released and the parsing
    /// context is closed before this returns. Failures are also recorded as
    /// the status text.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of documents indexed
    /// * `Err(CrawlError)` - Why the crawl aborted; the previous index is
    ///   untouched
    pub async fn run(&self) -> Result<usize, CrawlError> {
        {
            let state = self.lock_state();
            if !state.is_indexing() || state.phase() != CrawlPhase::FetchingListing {
                return Err(CrawlError::InvalidTransition {
                    from: state.phase(),
                    to: CrawlPhase::FetchingListing,
                });
            }
        }

        let result = self.execute().await;

        if self.channel.has_active_context().await {
            if let Err(e) = self.channel.close().await {
                tracing::warn!("Error closing parsing context: {}", e);
            }
        }

        let update = {
            let mut state = self.lock_state();
            let text = match &result {
                Ok(count) => {
                    tracing::info!("Crawl completed with {} documents", count);
                    format!("Indexing complete ({} docs). Ready.", count)
                }
                Err(e) => {
                    tracing::error!("Crawl failed: {}", e);
                    state.fail();
                    format!("Error: {}", e)
                }
            };
            state.set_status(text.clone());
            state.finish();
            StatusUpdate::new(text, true)
        };
        self.observer.notify(&update);

        result
    }

    async fn execute(&self) -> Result<usize, CrawlError> {
        let listing_url = Url::parse(&self.config.site.listing_url)
            .map_err(|e| CrawlError::ListingFetch(e.to_string()))?;

        self.report("Starting: Fetching contents page...", false);
        let listing = match fetch_page(&self.client, listing_url.as_str()).await {
            FetchResult::Success { body, .. } => body,
            failure => {
                return Err(CrawlError::ListingFetch(
                    failure.failure().unwrap_or_default(),
                ))
            }
        };

        self.advance(CrawlPhase::ExtractingLinks)?;
        self.report("Parsing contents page for links...", false);
        let relative = match self.channel.parse(ExtractTask::Links, listing).await {
            Ok(Extracted::Links(links)) => links,
            Ok(Extracted::Content(_)) | Err(ChannelError::Malformed(_)) => {
                return Err(CrawlError::NoLinks)
            }
            Err(e) => return Err(CrawlError::ListingParse(e)),
        };
        if relative.is_empty() {
            return Err(CrawlError::NoLinks);
        }

        let urls = resolve_links(&listing_url, &relative);
        self.report(
            format!("Found {} links. Fetching pages...", urls.len()),
            false,
        );
        if urls.is_empty() {
            return Err(CrawlError::NoAbsoluteLinks(relative.len()));
        }

        self.advance(CrawlPhase::FetchingPages)?;
        let documents = self.fetch_documents(&urls).await?;
        if documents.is_empty() {
            return Err(CrawlError::NoDocuments);
        }

        self.advance(CrawlPhase::BuildingIndex)?;
        self.report(
            format!("Building index for {} documents...", documents.len()),
            false,
        );
        let built = index::build(&documents)?;
        {
            let mut storage = self
                .storage
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            index::persist(&mut *storage, &built, self.config_hash.as_deref())?;
        }

        self.advance(CrawlPhase::Done)?;
        Ok(built.document_count())
    }

    /// Fetches and extracts every page strictly one after another
    async fn fetch_documents(&self, urls: &[String]) -> Result<Vec<Document>, CrawlError> {
        let total = urls.len();
        let mut documents = Vec::new();

        for (position, url) in urls.iter().enumerate() {
            let count = position + 1;
            let label = page_label(url);

            match self.process_page(url).await {
                Ok(PageOutcome::Indexed(document)) => {
                    documents.push(document);
                    self.report(format!("Processing {}/{}: {}", count, total, label), false);
                }
                Ok(PageOutcome::Skipped(reason)) => {
                    tracing::warn!("Skipping {}: {}", url, reason);
                    self.report(format!("Skipping {}/{}: {}", count, total, label), false);
                }
                Ok(PageOutcome::Failed(reason)) => {
                    tracing::error!("Error processing page {}: {}", url, reason);
                    self.report(format!("Error on {}/{}: {}", count, total, label), false);
                }
                Err(lost) => {
                    tracing::error!("Error processing page {}: {}", url, lost);
                    self.report(format!("Error on {}/{}: {}", count, total, label), false);
                    return Err(CrawlError::ContextLost(lost));
                }
            }
        }

        Ok(documents)
    }

    /// Handles one page; only a lost parsing context escapes as an error
    async fn process_page(&self, url: &str) -> Result<PageOutcome, ChannelError> {
        let body = match fetch_page(&self.client, url).await {
            FetchResult::Success { body, .. } => body,
            failure @ FetchResult::HttpError { .. } => {
                return Ok(PageOutcome::Skipped(failure.failure().unwrap_or_default()))
            }
            failure @ FetchResult::NetworkError { .. } => {
                return Ok(PageOutcome::Failed(failure.failure().unwrap_or_default()))
            }
        };

        match self.channel.parse(ExtractTask::Content, body).await {
            Ok(Extracted::Content(Some(record))) if record.is_complete() => {
                let ContentRecord { title, body } = record;
                Ok(PageOutcome::Indexed(Document::new(url, title, body)))
            }
            Ok(Extracted::Content(Some(record))) => Ok(PageOutcome::Skipped(format!(
                "extracted partial content (title: {}, body: {})",
                !record.title.is_empty(),
                !record.body.is_empty()
            ))),
            Ok(Extracted::Content(None)) => Ok(PageOutcome::Skipped(
                "parsing context returned no content".to_string(),
            )),
            Ok(Extracted::Links(_)) => Ok(PageOutcome::Failed(
                "parsing context answered the wrong task".to_string(),
            )),
            Err(e) if e.is_connection_lost() => Err(e),
            Err(e) => Ok(PageOutcome::Failed(e.to_string())),
        }
    }

    fn advance(&self, next: CrawlPhase) -> Result<(), CrawlError> {
        let mut state = self.lock_state();
        let from = state.phase();
        state.advance(next)?;
        tracing::debug!("Crawl phase {} -> {}", from, next);
        Ok(())
    }

    /// Records the status text and notifies the observer
    fn report(&self, text: impl Into<String>, done: bool) {
        let update = StatusUpdate::new(text, done);
        self.lock_state().set_status(update.text.clone());
        tracing::info!("{}", update.text);
        self.observer.notify(&update);
    }

    fn lock_state(&self) -> MutexGuard<'_, CrawlState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Startup check of the extraction and indexing libraries
pub fn preflight() -> Result<(), String> {
    crate::extract::preflight().map_err(|e| format!("Extraction library unavailable: {}", e))?;
    index::preflight().map_err(|e| format!("Index library unavailable: {}", e))?;
    Ok(())
}
