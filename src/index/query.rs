//! Query engine over a persisted index
//!
//! Raw queries are expanded into a union of weighted clauses so that exact
//! phrases and title matches rank above loose token overlap.

use serde::Serialize;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::directory::{Directory, RamDirectory};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use super::builder::{SerializedIndex, SERIALIZATION_FORMAT};
use super::schema::{analyze, register_tokenizer, IndexFields};
use super::DocumentMetadataMap;
use crate::storage::{load_index, KeyValueStore};
use crate::IndexError;

/// Queries shorter than this clear results instead of searching
pub const MIN_QUERY_CHARS: usize = 3;

/// Number of ranked hits returned per query
pub const MAX_RESULTS: usize = 20;

const TITLE_FIELD_BOOST: f32 = 10.0;
const FULL_PHRASE_BOOST: f32 = 100.0;
const TITLE_PHRASE_BOOST: f32 = 50.0;

/// One ranked match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub score: f32,
}

/// Answer to a raw query
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Query too short; any displayed results should be cleared
    Cleared,
    /// The index was searched and nothing matched
    NoMatches,
    Matches(Vec<SearchHit>),
}

/// Searchable view of one persisted build
pub struct QueryEngine {
    index: Index,
    reader: IndexReader,
    fields: IndexFields,
    metadata: DocumentMetadataMap,
}

impl QueryEngine {
    /// Loads the last persisted build
    ///
    /// # Returns
    ///
    /// * `Ok(QueryEngine)` - Index and metadata loaded
    /// * `Err(IndexError::Unavailable)` - Nothing has been persisted yet, or
    ///   storage could not be read
    /// * `Err(IndexError)` - The stored index is corrupt
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, IndexError> {
        let record = load_index(store)
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .ok_or_else(|| IndexError::Unavailable("no index has been built yet".to_string()))?;

        let index: SerializedIndex = serde_json::from_str(&record.index)?;
        let metadata: DocumentMetadataMap = serde_json::from_str(&record.documents)?;
        Self::from_parts(&index, metadata)
    }

    /// Opens a serialized index entirely in memory
    pub fn from_parts(
        serialized: &SerializedIndex,
        metadata: DocumentMetadataMap,
    ) -> Result<Self, IndexError> {
        if serialized.format != SERIALIZATION_FORMAT {
            return Err(IndexError::Corrupt(format!(
                "unsupported index format {}",
                serialized.format
            )));
        }

        let directory = RamDirectory::create();
        for (name, encoded) in &serialized.files {
            let bytes = hex::decode(encoded)
                .map_err(|e| IndexError::Corrupt(format!("file {}: {}", name, e)))?;
            directory.atomic_write(Path::new(name), &bytes)?;
        }

        let index = Index::open(directory)?;
        register_tokenizer(&index);
        let fields = IndexFields::resolve(&index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            fields,
            metadata,
        })
    }

    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn metadata(&self) -> &DocumentMetadataMap {
        &self.metadata
    }

    /// Runs a raw, user-typed query
    pub fn search(&self, raw: &str) -> Result<SearchOutcome, IndexError> {
        let trimmed = raw.trim();
        if trimmed.chars().count() < MIN_QUERY_CHARS {
            return Ok(SearchOutcome::Cleared);
        }

        let Some(query) = self.build_query(trimmed)? else {
            debug!("Query '{}' produced no searchable terms", trimmed);
            return Ok(SearchOutcome::NoMatches);
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(MAX_RESULTS))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let title = self
                .metadata
                .get(&id)
                .map(|m| m.title.clone())
                .unwrap_or_else(|| id.clone());
            hits.push(SearchHit { id, title, score });
        }

        debug!("Query '{}' matched {} documents", trimmed, hits.len());
        if hits.is_empty() {
            Ok(SearchOutcome::NoMatches)
        } else {
            Ok(SearchOutcome::Matches(hits))
        }
    }

    fn build_query(&self, query: &str) -> Result<Option<Box<dyn Query>>, IndexError> {
        let word_count = query.split_whitespace().count();
        let terms = analyze(&self.index, query)?;
        if terms.is_empty() {
            return Ok(None);
        }

        if word_count == 1 {
            let clauses = terms
                .iter()
                .map(|(_, text)| (Occur::Should, self.token_clause(text)))
                .collect();
            return Ok(Some(Box::new(BooleanQuery::new(clauses))));
        }

        let full_phrase = BooleanQuery::new(vec![
            (
                Occur::Should,
                boost(self.phrase(self.fields.title, &terms), TITLE_FIELD_BOOST),
            ),
            (Occur::Should, self.phrase(self.fields.body, &terms)),
        ]);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (Occur::Should, boost(Box::new(full_phrase), FULL_PHRASE_BOOST)),
            (
                Occur::Should,
                boost(
                    self.phrase(self.fields.title, &terms),
                    TITLE_FIELD_BOOST * TITLE_PHRASE_BOOST,
                ),
            ),
            (Occur::Should, self.phrase(self.fields.body, &terms)),
        ];
        clauses.extend(
            terms
                .iter()
                .map(|(_, text)| (Occur::Should, self.token_clause(text))),
        );

        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    /// A term over both fields, title carrying its field boost
    fn token_clause(&self, text: &str) -> Box<dyn Query> {
        Box::new(BooleanQuery::new(vec![
            (
                Occur::Should,
                boost(term_query(self.fields.title, text), TITLE_FIELD_BOOST),
            ),
            (Occur::Should, term_query(self.fields.body, text)),
        ]))
    }

    /// Phrase over one field; falls back to a term when only one term remains
    ///
    /// `terms` is never empty here.
    fn phrase(&self, field: Field, terms: &[(usize, String)]) -> Box<dyn Query> {
        if let [(_, only)] = terms {
            return term_query(field, only);
        }
        let positioned = terms
            .iter()
            .map(|(position, text)| (*position, Term::from_field_text(field, text)))
            .collect();
        Box::new(PhraseQuery::new_with_offset(positioned))
    }
}

fn term_query(field: Field, text: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, text),
        IndexRecordOption::WithFreqs,
    ))
}

fn boost(query: Box<dyn Query>, factor: f32) -> Box<dyn Query> {
    Box::new(BoostQuery::new(query, factor))
}
