//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page markup
//! - Error classification
//! - Resolving listing-relative paths to absolute URLs

use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// The server answered with a non-2xx status
    HttpError {
        /// The HTTP status code
        status_code: u16,
        /// Canonical reason phrase, or the bare code when there is none
        reason: String,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Human-readable failure description, `None` on success
    pub fn failure(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::HttpError {
                status_code,
                reason,
            } => Some(format!("HTTP {} {}", status_code, reason)),
            Self::NetworkError { error } => Some(error.clone()),
        }
    }
}

/// Formats the user agent: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use guidance_indexer::config::UserAgentConfig;
/// use guidance_indexer::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "GuidanceIndexer".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page's markup
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTTP 2xx | `Success` with the body |
/// | Any other status | `HttpError` |
/// | Timeout, refused connection, unreadable body | `NetworkError` |
///
/// No retries: a failed page is skipped by the caller and a failed listing
/// aborts the crawl.
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string(),
        };
    }

    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: format!("Failed to read body: {}", e),
        },
    }
}

/// Resolves listing-relative paths against the listing page's origin
///
/// Only root-relative paths (`/guidance/...`) are accepted. Anything else,
/// including protocol-relative `//host/...` forms that would leave the site,
/// is dropped with a warning. Input order is preserved.
pub fn resolve_links(listing_url: &Url, relative: &[String]) -> Vec<String> {
    let origin = listing_url.origin().ascii_serialization();
    let base = match Url::parse(&origin) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!("Listing URL {} has no usable origin: {}", listing_url, e);
            return Vec::new();
        }
    };

    relative
        .iter()
        .filter_map(|path| {
            if !path.starts_with('/') || path.starts_with("//") {
                tracing::warn!("Invalid relative path '{}', skipping", path);
                return None;
            }
            match base.join(path) {
                Ok(absolute) => Some(absolute.to_string()),
                Err(e) => {
                    tracing::warn!("Could not resolve '{}' against {}: {}", path, base, e);
                    None
                }
            }
        })
        .collect()
}

/// Short label for progress messages: the last path segment of a URL
pub fn page_label(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config();
        let client = build_http_client(&config, Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            user_agent_string(&create_test_config()),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_resolve_links_drops_invalid_paths() {
        let base = Url::parse("https://example.test").unwrap();
        let relative = vec![
            "/guidance/a".to_string(),
            "not-a-path".to_string(),
            "/guidance/b".to_string(),
        ];

        assert_eq!(
            resolve_links(&base, &relative),
            vec![
                "https://example.test/guidance/a".to_string(),
                "https://example.test/guidance/b".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_links_uses_origin_only() {
        let listing =
            Url::parse("https://example.test/government/collections/guidance?tab=all").unwrap();
        let relative = vec!["/guidance/flood-risk".to_string(), "//evil.test/x".to_string()];

        assert_eq!(
            resolve_links(&listing, &relative),
            vec!["https://example.test/guidance/flood-risk".to_string()]
        );
    }

    #[test]
    fn test_page_label() {
        assert_eq!(page_label("https://example.test/guidance/flood-risk"), "flood-risk");
        assert_eq!(page_label("flood-risk"), "flood-risk");
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guidance/a"))
            .and(header(
                "user-agent",
                "TestCrawler/1.0 (+https://example.com/about; admin@example.com)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(), Duration::from_secs(5)).unwrap();
        let result = fetch_page(&client, &format!("{}/guidance/a", server.uri())).await;

        match result {
            FetchResult::Success {
                status_code, body, ..
            } => {
                assert_eq!(status_code, 200);
                assert_eq!(body, "<html></html>");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(), Duration::from_secs(5)).unwrap();
        let result = fetch_page(&client, &format!("{}/missing", server.uri())).await;

        assert_eq!(result.failure().as_deref(), Some("HTTP 404 Not Found"));
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        let client = build_http_client(&create_test_config(), Duration::from_secs(5)).unwrap();
        // Port 9 (discard) is closed on test hosts
        let result = fetch_page(&client, "http://127.0.0.1:9/").await;
        assert!(matches!(result, FetchResult::NetworkError { .. }));
    }
}
