//! CSS selectors describing the guidance site's markup

use crate::ExtractError;
use scraper::Selector;

/// Anchors inside the listing page's document-list component
pub const LISTING_LINKS: &str = ".gem-c-document-list .gem-c-document-list__item-title a";

/// Only links under this path are guidance documents
pub const GUIDANCE_PATH_PREFIX: &str = "/guidance/";

/// Title candidates, most specific first; the document `<title>` is last
pub const TITLE_CANDIDATES: &[&str] = &["h1.govuk-heading-xl", "h1", "title"];

/// Body container candidates, most specific first
pub const BODY_CANDIDATES: &[&str] = &[
    ".gem-c-govspeak",
    "main#content div.govspeak",
    "main#content",
    "main",
];

/// Block elements whose text makes up a document body
pub const CONTENT_BEARING: &str = "p, h2, h3, h4, h5, h6, ul, ol, table";

/// Compiled selector set used by one extraction
#[derive(Debug)]
pub struct Selectors {
    pub listing_links: Selector,
    pub titles: Vec<Selector>,
    pub bodies: Vec<Selector>,
    pub content_bearing: Selector,
    pub document_body: Selector,
}

impl Selectors {
    /// Compiles every selector, failing on the first invalid one
    pub fn compile() -> Result<Self, ExtractError> {
        Ok(Self {
            listing_links: compile_one(LISTING_LINKS)?,
            titles: TITLE_CANDIDATES
                .iter()
                .map(|s| compile_one(s))
                .collect::<Result<_, _>>()?,
            bodies: BODY_CANDIDATES
                .iter()
                .map(|s| compile_one(s))
                .collect::<Result<_, _>>()?,
            content_bearing: compile_one(CONTENT_BEARING)?,
            document_body: compile_one("body")?,
        })
    }
}

fn compile_one(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}
