use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer, TokenStream,
};
use tantivy::Index;

use crate::IndexError;

/// Name under which the analyzer is registered on every opened index
pub const TOKENIZER_NAME: &str = "guidance_text";

pub const ID_FIELD: &str = "id";
pub const TITLE_FIELD: &str = "title";
pub const BODY_FIELD: &str = "body";

/// Field handles resolved against a schema
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub id: Field,
    pub title: Field,
    pub body: Field,
}

impl IndexFields {
    pub fn resolve(schema: &Schema) -> Result<Self, IndexError> {
        Ok(Self {
            id: schema.get_field(ID_FIELD)?,
            title: schema.get_field(TITLE_FIELD)?,
            body: schema.get_field(BODY_FIELD)?,
        })
    }
}

/// Builds the document schema
///
/// `id` is an exact, stored key. `title` and `body` are analyzed with
/// positions kept so phrase clauses and later highlighting work; neither is
/// stored, the metadata map carries titles.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);

    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(indexing);
    schema_builder.add_text_field(TITLE_FIELD, text_options.clone());
    schema_builder.add_text_field(BODY_FIELD, text_options);

    schema_builder.build()
}

fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build()
}

/// Registers the analyzer; tokenizers are not persisted with an index
pub fn register_tokenizer(index: &Index) {
    index.tokenizers().register(TOKENIZER_NAME, analyzer());
}

/// Runs `text` through the index analyzer
///
/// Returns `(position, term)` pairs in input order.
pub fn analyze(index: &Index, text: &str) -> Result<Vec<(usize, String)>, IndexError> {
    let mut analyzer = index
        .tokenizers()
        .get(TOKENIZER_NAME)
        .ok_or_else(|| IndexError::Unavailable(format!("tokenizer '{}' not registered", TOKENIZER_NAME)))?;

    let mut terms = Vec::new();
    let mut stream = analyzer.token_stream(text);
    while stream.advance() {
        let token = stream.token();
        terms.push((token.position, token.text.clone()));
    }
    Ok(terms)
}

/// Verifies the schema and analyzer can be constructed and used
pub fn preflight() -> Result<(), IndexError> {
    let index = Index::create_in_ram(build_schema());
    register_tokenizer(&index);
    IndexFields::resolve(&index.schema())?;

    let probe = analyze(&index, "Planning Permissions")?;
    if probe.len() != 2 {
        return Err(IndexError::Unavailable(format!(
            "analyzer produced {} terms for a two-word probe",
            probe.len()
        )));
    }
    Ok(())
}
