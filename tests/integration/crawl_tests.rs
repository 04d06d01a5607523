//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, from the listing page to a
//! searchable index persisted in a temporary database.

use async_trait::async_trait;
use guidance_indexer::channel::{
    handle_request, ContextLauncher, ParseContext, ParseRequest, ParseResponse, ParsingChannel,
};
use guidance_indexer::config::{
    Config, FetchConfig, OutputConfig, SiteConfig, UserAgentConfig, WorkerConfig, WorkerMode,
};
use guidance_indexer::crawler::{Coordinator, IndexService, StartOutcome, STATUS_INDEX_LOADED};
use guidance_indexer::index::{DocumentMetadataMap, QueryEngine, SearchOutcome};
use guidance_indexer::state::{CrawlPhase, StatusUpdate};
use guidance_indexer::storage::{load_index, open_store, SqliteStore};
use guidance_indexer::{ChannelError, CrawlError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PATH: &str = "/government/collections/planning-practice-guidance";

/// Creates a test configuration pointing at the mock listing page
fn create_test_config(listing_url: &str, db_path: &Path, mode: WorkerMode) -> Config {
    Config {
        site: SiteConfig {
            listing_url: listing_url.to_string(),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        fetch: FetchConfig {
            request_timeout_secs: 5,
        },
        worker: WorkerConfig {
            mode,
            parse_timeout_secs: 10,
            program: None,
            args: vec!["extract-worker".to_string()],
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().to_string(),
        },
    }
}

fn listing_html(paths: &[&str]) -> String {
    let items: String = paths
        .iter()
        .map(|p| {
            format!(
                r#"<li class="gem-c-document-list__item">
                     <div class="gem-c-document-list__item-title"><a href="{}">{}</a></div>
                   </li>"#,
                p, p
            )
        })
        .collect();
    format!(
        r#"<html><head><title>Planning practice guidance</title></head><body>
           <ul class="gem-c-document-list">{}</ul>
           </body></html>"#,
        items
    )
}

fn page_html(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{title} - GOV.UK</title></head><body>
           <main id="content">
             <h1 class="govuk-heading-xl">{title}</h1>
             <div class="gem-c-govspeak"><p>{body}</p></div>
           </main>
           </body></html>"#,
        title = title,
        body = body
    )
}

async fn mount_page(server: &MockServer, page_path: &str, status: u16, html: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(html)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts a listing with three guidance pages, the second of which is missing
async fn mount_site_with_missing_page(server: &MockServer) {
    mount_page(
        server,
        LISTING_PATH,
        200,
        listing_html(&[
            "/guidance/flood-risk",
            "/guidance/housing-supply",
            "/guidance/viability",
        ]),
    )
    .await;
    mount_page(
        server,
        "/guidance/flood-risk",
        200,
        page_html(
            "Flood risk and coastal change",
            "Advises how planning can take account of the risks associated with flooding.",
        ),
    )
    .await;
    mount_page(server, "/guidance/housing-supply", 404, String::new()).await;
    mount_page(
        server,
        "/guidance/viability",
        200,
        page_html(
            "Viability",
            "Sets out the role of viability assessment in plan making and decision taking.",
        ),
    )
    .await;
}

fn listing_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), LISTING_PATH)
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("guidance.db")
}

fn drain(receiver: &mut broadcast::Receiver<StatusUpdate>) -> Vec<StatusUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

/// Runs one crawl to completion, returning its result and every status update
async fn run_crawl(config: Config) -> (Result<usize, CrawlError>, Vec<StatusUpdate>, Coordinator) {
    let (sender, mut receiver) = broadcast::channel::<StatusUpdate>(256);
    let coordinator = Coordinator::from_config(config, Some("test-hash".to_string()), Arc::new(sender))
        .expect("Failed to create coordinator");

    assert_eq!(coordinator.begin(), StartOutcome::Started);
    let result = coordinator.run().await;
    let updates = drain(&mut receiver);
    (result, updates, coordinator)
}

#[tokio::test]
async fn test_full_crawl_skips_missing_page() {
    let mock_server = MockServer::start().await;
    mount_site_with_missing_page(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);

    let (result, updates, coordinator) = run_crawl(config).await;

    assert_eq!(result.unwrap(), 2);

    let texts: Vec<&str> = updates.iter().map(|u| u.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Starting: Fetching contents page...",
            "Parsing contents page for links...",
            "Found 3 links. Fetching pages...",
            "Processing 1/3: flood-risk",
            "Skipping 2/3: housing-supply",
            "Processing 3/3: viability",
            "Building index for 2 documents...",
            "Indexing complete (2 docs). Ready.",
        ]
    );
    assert!(updates[..updates.len() - 1].iter().all(|u| !u.done));
    assert!(updates.last().unwrap().done);

    let status = coordinator.status();
    assert!(!status.is_indexing);
    assert_eq!(status.status_text, "Indexing complete (2 docs). Ready.");
    assert_eq!(coordinator.phase(), CrawlPhase::Idle);

    // Metadata keys are exactly the indexed document ids
    let store = open_store(&db_path(&dir)).unwrap();
    let record = load_index(&store).unwrap().expect("index persisted");
    let metadata: DocumentMetadataMap = serde_json::from_str(&record.documents).unwrap();
    let keys: Vec<String> = metadata.keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            format!("{}/guidance/flood-risk", mock_server.uri()),
            format!("{}/guidance/viability", mock_server.uri()),
        ]
    );
    assert_eq!(record.config_hash.as_deref(), Some("test-hash"));
}

#[tokio::test]
async fn test_crawled_index_is_searchable() {
    let mock_server = MockServer::start().await;
    mount_site_with_missing_page(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let (result, _, _) = run_crawl(config).await;
    result.unwrap();

    let store = open_store(&db_path(&dir)).unwrap();
    let engine = QueryEngine::load(&store).unwrap();
    assert_eq!(engine.document_count(), 2);

    match engine.search("coastal change").unwrap() {
        SearchOutcome::Matches(hits) => {
            assert_eq!(hits[0].id, format!("{}/guidance/flood-risk", mock_server.uri()));
            assert_eq!(hits[0].title, "Flood risk and coastal change");
        }
        other => panic!("expected matches, got {:?}", other),
    }
    assert_eq!(engine.search("fl").unwrap(), SearchOutcome::Cleared);
    assert_eq!(engine.search("zeppelin").unwrap(), SearchOutcome::NoMatches);
}

#[tokio::test]
async fn test_listing_failure_keeps_previous_index() {
    let dir = TempDir::new().unwrap();

    // First build succeeds
    let good_server = MockServer::start().await;
    mount_site_with_missing_page(&good_server).await;
    let config = create_test_config(&listing_url(&good_server), &db_path(&dir), WorkerMode::Thread);
    let (result, _, _) = run_crawl(config).await;
    result.unwrap();
    let before = {
        let store = open_store(&db_path(&dir)).unwrap();
        load_index(&store).unwrap().expect("index persisted")
    };

    // Second crawl hits a broken listing page
    let broken_server = MockServer::start().await;
    mount_page(&broken_server, LISTING_PATH, 500, String::new()).await;
    let config = create_test_config(&listing_url(&broken_server), &db_path(&dir), WorkerMode::Thread);

    let (sender, mut receiver) = broadcast::channel::<StatusUpdate>(64);
    let coordinator = Coordinator::from_config(config, None, Arc::new(sender)).unwrap();
    assert_eq!(coordinator.status().status_text, STATUS_INDEX_LOADED);

    assert_eq!(coordinator.begin(), StartOutcome::Started);
    let result = coordinator.run().await;

    assert!(matches!(result, Err(CrawlError::ListingFetch(_))));
    let status = coordinator.status();
    assert!(!status.is_indexing);
    assert!(
        status.status_text.starts_with("Error: Failed to fetch contents page"),
        "unexpected status: {}",
        status.status_text
    );
    assert!(status.status_text.contains("500"));

    let updates = drain(&mut receiver);
    let last = updates.last().unwrap();
    assert!(last.done);
    assert_eq!(last.text, status.status_text);

    let store = open_store(&db_path(&dir)).unwrap();
    assert_eq!(load_index(&store).unwrap(), Some(before));
}

#[tokio::test]
async fn test_listing_without_links_fails() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        LISTING_PATH,
        200,
        "<html><body><p>Nothing listed</p></body></html>".to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let (result, _, coordinator) = run_crawl(config).await;

    assert!(matches!(result, Err(CrawlError::NoLinks)));
    assert_eq!(
        coordinator.status().status_text,
        "Error: Could not extract valid guidance links from the contents page"
    );

    let store = open_store(&db_path(&dir)).unwrap();
    assert_eq!(load_index(&store).unwrap(), None);
}

#[tokio::test]
async fn test_no_usable_pages_fails_before_building() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        LISTING_PATH,
        200,
        listing_html(&["/guidance/gone", "/guidance/title-only"]),
    )
    .await;
    mount_page(&mock_server, "/guidance/gone", 404, String::new()).await;
    mount_page(
        &mock_server,
        "/guidance/title-only",
        200,
        r#"<html><head><title>Just a title</title></head><body></body></html>"#.to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let (result, updates, _) = run_crawl(config).await;

    assert!(matches!(result, Err(CrawlError::NoDocuments)));
    let texts: Vec<&str> = updates.iter().map(|u| u.text.as_str()).collect();
    assert!(texts.contains(&"Skipping 1/2: gone"));
    assert!(texts.contains(&"Skipping 2/2: title-only"));
    assert!(!texts.iter().any(|t| t.starts_with("Building index")));

    let store = open_store(&db_path(&dir)).unwrap();
    assert_eq!(load_index(&store).unwrap(), None);
}

#[tokio::test]
async fn test_start_while_running_is_noop() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_html(&["/guidance/viability"]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(
        &mock_server,
        "/guidance/viability",
        200,
        page_html("Viability", "Viability assessment in plan making."),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let service = IndexService::from_config(config, None).unwrap();
    let mut updates = service.subscribe();

    assert_eq!(service.start(), StartOutcome::Started);
    assert!(service.status().is_indexing);
    assert_eq!(service.start(), StartOutcome::AlreadyRunning);

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match updates.recv().await {
                Ok(update) if update.done => return update,
                Ok(_) => continue,
                Err(e) => panic!("status channel failed: {}", e),
            }
        }
    })
    .await
    .expect("crawl did not finish");

    assert_eq!(finished.text, "Indexing complete (1 docs). Ready.");
    assert!(!service.status().is_indexing);

    // The slot is free again once the crawl is done
    assert_eq!(service.coordinator().begin(), StartOutcome::Started);
}

#[tokio::test]
async fn test_unavailable_library_refuses_start() {
    let mock_server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let (sender, _) = broadcast::channel::<StatusUpdate>(16);
    let coordinator = Coordinator::from_config(config, None, Arc::new(sender.clone()))
        .unwrap()
        .with_library_status(Err("Index library unavailable: no tokenizer".to_string()));
    let service = IndexService::new(coordinator, sender);

    for _ in 0..2 {
        assert!(matches!(service.start(), StartOutcome::Unavailable(_)));
    }

    let status = service.status();
    assert!(!status.is_indexing);
    assert_eq!(status.status_text, "Error: Index library unavailable: no tokenizer");
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_crawl_with_worker_process() {
    let mock_server = MockServer::start().await;
    mount_site_with_missing_page(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let mut config =
        create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Process);
    config.worker.program = Some(env!("CARGO_BIN_EXE_guidance-indexer").to_string());

    let (result, updates, _) = run_crawl(config).await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(
        updates.last().unwrap().text,
        "Indexing complete (2 docs). Ready."
    );
}

/// Context that answers the listing request and then dies
struct DyingContext {
    answered: usize,
}

#[async_trait]
impl ParseContext for DyingContext {
    async fn exchange(&mut self, request: ParseRequest) -> Result<ParseResponse, ChannelError> {
        if self.answered > 0 {
            return Err(ChannelError::ConnectionLost("worker exited".to_string()));
        }
        self.answered += 1;
        Ok(handle_request(&request))
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        Err(ChannelError::Teardown("worker already gone".to_string()))
    }
}

struct DyingLauncher {
    launches: AtomicUsize,
}

#[async_trait]
impl ContextLauncher for DyingLauncher {
    async fn launch(&self) -> Result<Box<dyn ParseContext>, ChannelError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(DyingContext { answered: 0 }))
    }
}

#[tokio::test]
async fn test_lost_context_aborts_crawl() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        LISTING_PATH,
        200,
        listing_html(&["/guidance/first", "/guidance/second"]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/guidance/first"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html("First", "Body")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guidance/second"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html("Second", "Body")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let launcher = Arc::new(DyingLauncher {
        launches: AtomicUsize::new(0),
    });
    let channel = Arc::new(ParsingChannel::new(launcher.clone()));
    let (sender, mut receiver) = broadcast::channel::<StatusUpdate>(64);
    let coordinator = Coordinator::new(
        config,
        SqliteStore::new(&db_path(&dir)).unwrap(),
        Arc::clone(&channel),
        Arc::new(sender),
    )
    .unwrap();

    assert_eq!(coordinator.begin(), StartOutcome::Started);
    let result = coordinator.run().await;

    assert!(matches!(result, Err(CrawlError::ContextLost(_))));
    let texts: Vec<String> = drain(&mut receiver).into_iter().map(|u| u.text).collect();
    assert!(texts.contains(&"Error on 1/2: first".to_string()));
    assert_eq!(
        texts.last().unwrap(),
        "Error: Lost connection to the parsing context during page processing. Aborting."
    );

    // The teardown error was swallowed and the context is gone
    assert!(!channel.has_active_context().await);
    assert!(!coordinator.status().is_indexing);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

/// Context that gives the same answer to every request
struct ScriptedContext {
    response: ParseResponse,
}

#[async_trait]
impl ParseContext for ScriptedContext {
    async fn exchange(&mut self, _request: ParseRequest) -> Result<ParseResponse, ChannelError> {
        Ok(self.response.clone())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct ScriptedLauncher {
    response: ParseResponse,
}

#[async_trait]
impl ContextLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn ParseContext>, ChannelError> {
        Ok(Box::new(ScriptedContext {
            response: self.response.clone(),
        }))
    }
}

/// Crawls a served listing page while the parsing context answers `response`
async fn run_scripted_crawl(
    response: ParseResponse,
) -> (Result<usize, CrawlError>, Vec<String>, Coordinator, TempDir) {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        LISTING_PATH,
        200,
        listing_html(&["/guidance/a"]),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let channel = Arc::new(ParsingChannel::new(Arc::new(ScriptedLauncher { response })));
    let (sender, mut receiver) = broadcast::channel::<StatusUpdate>(64);
    let coordinator = Coordinator::new(
        config,
        SqliteStore::new(&db_path(&dir)).unwrap(),
        channel,
        Arc::new(sender),
    )
    .unwrap();

    assert_eq!(coordinator.begin(), StartOutcome::Started);
    let result = coordinator.run().await;
    let texts = drain(&mut receiver).into_iter().map(|u| u.text).collect();
    (result, texts, coordinator, dir)
}

#[tokio::test]
async fn test_unresolvable_links_fail_with_distinct_reason() {
    let response = ParseResponse::ok(serde_json::json!(["guidance/a", "http://x"]));
    let (result, texts, coordinator, dir) = run_scripted_crawl(response).await;

    assert!(matches!(result, Err(CrawlError::NoAbsoluteLinks(2))));
    assert!(texts.contains(&"Found 0 links. Fetching pages...".to_string()));

    let status = coordinator.status().status_text;
    assert_eq!(
        status,
        "Error: No valid absolute guidance links could be constructed from 2 relative paths"
    );
    assert_ne!(status, format!("Error: {}", CrawlError::NoLinks));
    assert!(!coordinator.status().is_indexing);

    let store = open_store(&db_path(&dir)).unwrap();
    assert_eq!(load_index(&store).unwrap(), None);
}

#[tokio::test]
async fn test_listing_parse_failure_is_reported() {
    let response = ParseResponse::failure("extractor crashed");
    let (result, texts, coordinator, _dir) = run_scripted_crawl(response).await;

    match result {
        Err(CrawlError::ListingParse(ChannelError::Remote(reason))) => {
            assert_eq!(reason, "extractor crashed")
        }
        other => panic!("expected ListingParse, got {:?}", other),
    }
    assert!(!texts.iter().any(|t| t.starts_with("Found")));
    assert_eq!(
        coordinator.status().status_text,
        "Error: Could not parse the contents page: Parsing failed: extractor crashed"
    );
}

#[tokio::test]
async fn test_malformed_link_response_counts_as_no_links() {
    let response = ParseResponse::ok(serde_json::json!({"links": ["/guidance/a"]}));
    let (result, _, coordinator, _dir) = run_scripted_crawl(response).await;

    assert!(matches!(result, Err(CrawlError::NoLinks)));
    assert_eq!(
        coordinator.status().status_text,
        "Error: Could not extract valid guidance links from the contents page"
    );
}

#[tokio::test]
async fn test_rebuild_without_config_hash_clears_old_hash() {
    let mock_server = MockServer::start().await;
    mount_site_with_missing_page(&mock_server).await;
    let dir = TempDir::new().unwrap();

    let config = create_test_config(&listing_url(&mock_server), &db_path(&dir), WorkerMode::Thread);
    let (result, _, _) = run_crawl(config.clone()).await;
    result.unwrap();

    let (sender, _) = broadcast::channel::<StatusUpdate>(64);
    let coordinator = Coordinator::from_config(config, None, Arc::new(sender)).unwrap();
    assert_eq!(coordinator.begin(), StartOutcome::Started);
    assert_eq!(coordinator.run().await.unwrap(), 2);

    let store = open_store(&db_path(&dir)).unwrap();
    let record = load_index(&store).unwrap().expect("index persisted");
    assert_eq!(record.config_hash, None);
}
