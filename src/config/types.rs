use serde::Deserialize;

/// Default listing page enumerating every guidance document
pub const DEFAULT_LISTING_URL: &str =
    "https://www.gov.uk/government/collections/planning-practice-guidance";

/// Main configuration structure for Guidance-Indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    pub output: OutputConfig,
}

/// The site being indexed
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// The single page that links to all guidance documents
    #[serde(rename = "listing-url", default = "default_listing_url")]
    pub listing_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP fetch behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// How the isolated parsing context is realised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// A child process speaking JSON lines on stdio
    Process,
    /// A dedicated thread behind a message channel
    Thread,
}

/// Parsing worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_mode")]
    pub mode: WorkerMode,

    /// Seconds to wait for a single parse response before the context is
    /// presumed dead
    #[serde(rename = "parse-timeout-secs", default = "default_parse_timeout")]
    pub parse_timeout_secs: u64,

    /// Worker executable; the running binary when absent
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments passed to the worker executable
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: default_worker_mode(),
            parse_timeout_secs: default_parse_timeout(),
            program: None,
            args: default_worker_args(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding the persisted index
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_parse_timeout() -> u64 {
    60
}

fn default_worker_mode() -> WorkerMode {
    WorkerMode::Process
}

fn default_worker_args() -> Vec<String> {
    vec!["extract-worker".to_string()]
}
