//! Result shaping
//!
//! Projects matched documents onto display columns and collects the matched
//! refcodes for follow-up bulk actions. Dropping columns only changes the
//! rows, never the refcode list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::search::query::NormalizedQuery;
use crate::search::schema::MofField;
use crate::search::searcher::MatchedRecord;

/// How matches are turned into display rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeOptions {
    /// Hide the ligand identifier columns unless the query names them
    pub drop_unreferenced: bool,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self {
            drop_unreferenced: true,
        }
    }
}

/// Display-ready search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapedResults {
    /// Column labels, in schema order
    pub columns: Vec<String>,
    /// One object per match, keyed by column label
    pub rows: Vec<Map<String, Value>>,
    /// Refcodes of every match, in result order
    pub refcodes: Vec<String>,
}

impl ShapedResults {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fields shown for a query under the given options
pub fn visible_fields(query: Option<&NormalizedQuery>, options: &ShapeOptions) -> Vec<MofField> {
    MofField::ALL
        .iter()
        .copied()
        .filter(|field| {
            !options.drop_unreferenced
                || !field.is_optional_column()
                || query.is_some_and(|q| q.references(*field))
        })
        .collect()
}

/// Shape raw matches into display rows and the refcode list
pub fn shape_results(
    matches: &[MatchedRecord],
    query: Option<&NormalizedQuery>,
    options: &ShapeOptions,
) -> ShapedResults {
    let fields = visible_fields(query, options);

    let rows = matches
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| (field.label().to_string(), record.get(*field).to_json()))
                .collect::<Map<String, Value>>()
        })
        .collect();

    ShapedResults {
        columns: fields.iter().map(|field| field.label().to_string()).collect(),
        rows,
        refcodes: matches.iter().map(|record| record.refcode.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::normalize_query;
    use crate::search::searcher::StoredValue;
    use std::collections::BTreeMap;

    fn matched(refcode: &str, inchi: Option<&str>) -> MatchedRecord {
        let mut values = BTreeMap::new();
        values.insert(MofField::Refcode, StoredValue::Text(refcode.to_string()));
        values.insert(MofField::Pld, StoredValue::Number(10.5));
        values.insert(MofField::NChannel, StoredValue::Number(2.0));
        if let Some(inchi) = inchi {
            values.insert(MofField::LigandInchi, StoredValue::Text(inchi.to_string()));
        }
        MatchedRecord {
            score: 1.0,
            refcode: refcode.to_string(),
            values,
        }
    }

    #[test]
    fn test_rows_use_labels_in_schema_order() {
        let matches = vec![matched("ABAFUH", None)];
        let shaped = shape_results(&matches, None, &ShapeOptions { drop_unreferenced: false });

        assert_eq!(shaped.columns.len(), MofField::ALL.len());
        assert_eq!(shaped.columns[0], "Refcode");
        assert_eq!(shaped.columns[1], "PLD (Å)");

        let row = &shaped.rows[0];
        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(keys[0], "Refcode");
        assert_eq!(row["Refcode"], "ABAFUH");
        assert_eq!(row["PLD (Å)"], serde_json::json!(10.5));
        assert_eq!(row["Number of channels"], serde_json::json!(2));
        assert_eq!(row["DOI"], "N/A");
        assert_eq!(row["Ligand InChIKey"], "N/A");
    }

    #[test]
    fn test_ligand_columns_dropped_unless_referenced() {
        let matches = vec![matched("A", Some("XXXX")), matched("B", None)];

        let plain = normalize_query("PLD:[10 TO 11]");
        let shaped = shape_results(&matches, Some(&plain), &ShapeOptions::default());
        assert!(!shaped.columns.iter().any(|c| c == "Ligand InChIKey"));
        assert!(!shaped.columns.iter().any(|c| c == "Ligand SMILES"));
        assert!(!shaped.rows[0].contains_key("Ligand InChIKey"));

        let ligand = normalize_query("ligand_inchi=XXXX");
        let shaped = shape_results(&matches, Some(&ligand), &ShapeOptions::default());
        assert!(shaped.columns.iter().any(|c| c == "Ligand InChIKey"));
        assert!(!shaped.columns.iter().any(|c| c == "Ligand SMILES"));
        assert_eq!(shaped.rows[0]["Ligand InChIKey"], "XXXX");
    }

    #[test]
    fn test_dropping_columns_keeps_refcodes() {
        let matches = vec![matched("A", Some("XXXX")), matched("B", None)];
        let query = normalize_query("Zn");

        let dropped = shape_results(&matches, Some(&query), &ShapeOptions::default());
        let full = shape_results(&matches, Some(&query), &ShapeOptions { drop_unreferenced: false });

        assert_eq!(dropped.refcodes, vec!["A", "B"]);
        assert_eq!(dropped.refcodes, full.refcodes);
        assert_eq!(dropped.len(), full.len());
        assert!(dropped.columns.len() < full.columns.len());
    }

    #[test]
    fn test_empty_matches() {
        let shaped = shape_results(&[], None, &ShapeOptions::default());
        assert!(shaped.is_empty());
        assert!(shaped.refcodes.is_empty());
        assert!(!shaped.columns.is_empty());
    }
}
