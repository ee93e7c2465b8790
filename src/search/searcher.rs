use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tantivy::{
    Index, IndexReader, TantivyDocument, collector::TopDocs, query::QueryParser, schema::Value,
};
use tracing::debug;

use crate::search::config::MISSING_VALUE_PLACEHOLDER;
use crate::search::query::NormalizedQuery;
use crate::search::schema::{FieldKind, MofField, MofSchema};

/// A stored field value of a matched document
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Number(f64),
    Text(String),
    /// The document does not carry this field
    Missing,
}

impl StoredValue {
    /// JSON form used in results; whole numbers become integers and missing
    /// values become the placeholder string
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StoredValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                serde_json::Value::from(*n as i64)
            }
            StoredValue::Number(n) => serde_json::Value::from(*n),
            StoredValue::Text(s) => serde_json::Value::String(s.clone()),
            StoredValue::Missing => serde_json::Value::String(MISSING_VALUE_PLACEHOLDER.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, StoredValue::Missing)
    }
}

/// One document matched by a query, with every stored field
#[derive(Debug, Clone)]
pub struct MatchedRecord {
    pub score: f32,
    pub refcode: String,
    pub values: BTreeMap<MofField, StoredValue>,
}

impl MatchedRecord {
    pub fn get(&self, field: MofField) -> &StoredValue {
        self.values.get(&field).unwrap_or(&StoredValue::Missing)
    }
}

/// Runs normalized queries against an open index
pub struct MofSearcher {
    index: Index,
    reader: IndexReader,
    schema: MofSchema,
}

impl MofSearcher {
    pub fn new(index: Index, reader: IndexReader, schema: MofSchema) -> Self {
        Self {
            index,
            reader,
            schema,
        }
    }

    /// Return every document matching the query, best score first
    ///
    /// Parse errors are returned as is, with the query text as context.
    pub fn search(&self, query: &NormalizedQuery) -> Result<Vec<MatchedRecord>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let query_parser =
            QueryParser::for_index(&self.index, self.schema.default_search_fields());
        let parsed = query_parser
            .parse_query(&query.parser_text())
            .with_context(|| format!("Failed to parse query: {}", query.as_str()))?;

        let searcher = self.reader.searcher();
        // Unbounded: every matching document is returned
        let limit = searcher.num_docs() as usize;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;
        debug!("Query '{}' matched {} documents", query, top_docs.len());

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(self.to_matched_record(&doc, score));
        }

        Ok(results)
    }

    /// Look up the document whose stored refcode is exactly `refcode`
    pub fn find_refcode(&self, refcode: &str) -> Result<Option<MatchedRecord>> {
        let phrase: String = refcode
            .chars()
            .filter(|c| !matches!(c, '"' | '\\'))
            .collect();
        if phrase.trim().is_empty() {
            return Ok(None);
        }

        let query = NormalizedQuery::from_parser_text(format!(
            "{}:\"{}\"",
            MofField::Refcode.name(),
            phrase
        ));
        let found = self
            .search(&query)?
            .into_iter()
            .find(|record| record.refcode == refcode);
        Ok(found)
    }

    /// Convert Tantivy document to MatchedRecord
    pub(crate) fn to_matched_record(&self, doc: &TantivyDocument, score: f32) -> MatchedRecord {
        let values: BTreeMap<MofField, StoredValue> = MofField::ALL
            .iter()
            .map(|field| {
                let value = doc.get_first(self.schema.field(*field));
                let stored = match field.kind() {
                    FieldKind::Text => value
                        .and_then(|v| v.as_str())
                        .map(|s| StoredValue::Text(s.to_string())),
                    FieldKind::Numeric => value.and_then(|v| v.as_f64()).map(StoredValue::Number),
                };
                (*field, stored.unwrap_or(StoredValue::Missing))
            })
            .collect();

        let refcode = match values.get(&MofField::Refcode) {
            Some(StoredValue::Text(refcode)) => refcode.clone(),
            _ => MISSING_VALUE_PLACEHOLDER.to_string(),
        };

        MatchedRecord {
            score,
            refcode,
            values,
        }
    }
}
