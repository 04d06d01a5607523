//! Text extraction from guidance markup
//!
//! Pure functions over raw HTML. Given a page and a task this module returns
//! either the guidance links found on the listing page or the `{title, body}`
//! record of a single guidance document. It runs inside the isolated parsing
//! context, so it reports failures as values and never relies on the caller
//! to survive a fault.

mod selectors;

pub use selectors::{
    Selectors, BODY_CANDIDATES, CONTENT_BEARING, GUIDANCE_PATH_PREFIX, LISTING_LINKS,
    TITLE_CANDIDATES,
};

use crate::ExtractError;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

/// What to extract from a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractTask {
    /// Child document links on the listing page
    Links,
    /// Title and body of a guidance document
    Content,
}

/// Title and body text of one guidance document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl ContentRecord {
    /// Returns true when both title and body are present
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && !self.body.is_empty()
    }
}

/// Result of a single extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Links(Vec<String>),
    /// `None` means the page had neither a title nor a body
    Content(Option<ContentRecord>),
}

/// Extracts links or content from raw markup
///
/// # Example
///
/// ```
/// use guidance_indexer::extract::{extract, Extracted, ExtractTask};
///
/// let html = r#"<html><body><main><h1>Flood risk</h1><p>Some text</p></main></body></html>"#;
/// match extract(html, ExtractTask::Content).unwrap() {
///     Extracted::Content(Some(record)) => assert_eq!(record.title, "Flood risk"),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn extract(markup: &str, task: ExtractTask) -> Result<Extracted, ExtractError> {
    let selectors = Selectors::compile()?;
    let document = Html::parse_document(markup);

    Ok(match task {
        ExtractTask::Links => Extracted::Links(extract_links(&document, &selectors)),
        ExtractTask::Content => Extracted::Content(extract_content(&document, &selectors)),
    })
}

/// Verifies that the extractor can run at all
pub fn preflight() -> Result<(), ExtractError> {
    Selectors::compile().map(|_| ())
}

fn extract_links(document: &Html, selectors: &Selectors) -> Vec<String> {
    document
        .select(&selectors.listing_links)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.starts_with(GUIDANCE_PATH_PREFIX))
        .map(str::to_string)
        .collect()
}

fn extract_content(document: &Html, selectors: &Selectors) -> Option<ContentRecord> {
    let title = selectors
        .titles
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .map(|element| normalize_whitespace(&text_content(element)))
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    let container = selectors
        .bodies
        .iter()
        .find_map(|selector| document.select(selector).next());

    let raw_body = match container {
        Some(container) => {
            let blocks: Vec<String> = container
                .select(&selectors.content_bearing)
                .map(|element| text_content(element).trim().to_string())
                .collect();

            if blocks.is_empty() {
                tracing::warn!("No content-bearing elements found, taking all text from wrapper");
                text_content(container)
            } else {
                blocks.join("\n\n")
            }
        }
        None => {
            tracing::warn!("Could not find a main content wrapper, falling back to <body>");
            document
                .select(&selectors.document_body)
                .next()
                .map(text_content)
                .unwrap_or_default()
        }
    };

    let body = normalize_whitespace(&raw_body);

    if title.is_empty() && body.is_empty() {
        tracing::warn!("Could not extract title or body from page");
        return None;
    }

    Some(ContentRecord { title, body })
}

/// Concatenated text of an element and all its descendants
fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Collapses every whitespace run to a single space and trims the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
