//! Tantivy schema for MOF property records
//!
//! Every record carries the same fixed set of stored fields. Text fields are
//! tokenized with the default tokenizer (lowercased, split on anything that is
//! not alphanumeric) so a comma-joined value like `Zn,Cu` is matched by `Zn`.
//! Numeric fields are `f64` so both integer and float source values fit, and
//! they are indexed and fast so term and range queries work on them.
//!
//! The field set is fixed: an index built with a different set has to be
//! rebuilt from scratch, there is no migration.

use anyhow::{Context, Result};
use std::fmt;
use tantivy::schema::{FAST, Field, INDEXED, STORED, Schema, TEXT};

/// Whether a field holds text or a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
}

/// One field of a MOF record, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MofField {
    Refcode,
    Pld,
    Lcd,
    Asa,
    Av,
    NChannel,
    VoidFraction,
    Id,
    Metal,
    MetalSymbols,
    LigandInchi,
    LigandSmile,
    ChemicalName,
    SbuType,
    Color,
    Topology,
    IupacName,
    Doi,
}

impl MofField {
    pub const ALL: [MofField; 18] = [
        MofField::Refcode,
        MofField::Pld,
        MofField::Lcd,
        MofField::Asa,
        MofField::Av,
        MofField::NChannel,
        MofField::VoidFraction,
        MofField::Id,
        MofField::Metal,
        MofField::MetalSymbols,
        MofField::LigandInchi,
        MofField::LigandSmile,
        MofField::ChemicalName,
        MofField::SbuType,
        MofField::Color,
        MofField::Topology,
        MofField::IupacName,
        MofField::Doi,
    ];

    /// Text fields searched by clauses that carry no field qualifier
    pub const DEFAULT_TEXT: [MofField; 9] = [
        MofField::Refcode,
        MofField::Metal,
        MofField::MetalSymbols,
        MofField::ChemicalName,
        MofField::SbuType,
        MofField::Topology,
        MofField::Color,
        MofField::LigandInchi,
        MofField::LigandSmile,
    ];

    /// Numeric fields a bare numeric clause is expanded over
    pub const DEFAULT_NUMERIC: [MofField; 7] = [
        MofField::Pld,
        MofField::Lcd,
        MofField::Asa,
        MofField::Av,
        MofField::NChannel,
        MofField::VoidFraction,
        MofField::Id,
    ];

    /// Field name inside the index and in query strings
    pub fn name(self) -> &'static str {
        match self {
            MofField::Refcode => "refcode",
            MofField::Pld => "PLD",
            MofField::Lcd => "LCD",
            MofField::Asa => "ASA",
            MofField::Av => "AV",
            MofField::NChannel => "n_channel",
            MofField::VoidFraction => "void_fraction",
            MofField::Id => "id",
            MofField::Metal => "metal",
            MofField::MetalSymbols => "metal_symbols",
            MofField::LigandInchi => "ligand_inchi",
            MofField::LigandSmile => "ligand_smile",
            MofField::ChemicalName => "chemical_name",
            MofField::SbuType => "sbu_type",
            MofField::Color => "color",
            MofField::Topology => "topology",
            MofField::IupacName => "iupac_name",
            MofField::Doi => "doi",
        }
    }

    /// Column label used in shaped results
    pub fn label(self) -> &'static str {
        match self {
            MofField::Refcode => "Refcode",
            MofField::Pld => "PLD (Å)",
            MofField::Lcd => "LCD (Å)",
            MofField::Asa => "ASA",
            MofField::Av => "AV",
            MofField::NChannel => "Number of channels",
            MofField::VoidFraction => "Void fraction",
            MofField::Id => "ID",
            MofField::Metal => "Metal",
            MofField::MetalSymbols => "Metal symbols",
            MofField::LigandInchi => "Ligand InChIKey",
            MofField::LigandSmile => "Ligand SMILES",
            MofField::ChemicalName => "Chemical name",
            MofField::SbuType => "SBU type",
            MofField::Color => "Color",
            MofField::Topology => "Topology",
            MofField::IupacName => "IUPAC name",
            MofField::Doi => "DOI",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            MofField::Pld
            | MofField::Lcd
            | MofField::Asa
            | MofField::Av
            | MofField::NChannel
            | MofField::VoidFraction
            | MofField::Id => FieldKind::Numeric,
            _ => FieldKind::Text,
        }
    }

    /// Columns hidden from shaped results unless the query mentions them
    pub fn is_optional_column(self) -> bool {
        matches!(self, MofField::LigandInchi | MofField::LigandSmile)
    }

    /// Look up a field by its query name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for MofField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The tantivy schema together with the handle of every MOF field
#[derive(Debug, Clone)]
pub struct MofSchema {
    schema: Schema,
    fields: Vec<Field>,
}

impl MofSchema {
    /// Build the schema used for new indexes
    pub fn new() -> Self {
        let mut schema_builder = Schema::builder();

        let fields = MofField::ALL
            .iter()
            .map(|field| match field.kind() {
                FieldKind::Text => schema_builder.add_text_field(field.name(), TEXT | STORED),
                FieldKind::Numeric => {
                    schema_builder.add_f64_field(field.name(), INDEXED | STORED | FAST)
                }
            })
            .collect();

        Self {
            schema: schema_builder.build(),
            fields,
        }
    }

    /// Resolve the MOF fields against the schema of an existing index
    ///
    /// Fails when a field is missing, which means the index was built with a
    /// different field set and has to be rebuilt.
    pub fn from_schema(schema: Schema) -> Result<Self> {
        let fields = MofField::ALL
            .iter()
            .map(|field| {
                schema.get_field(field.name()).with_context(|| {
                    format!(
                        "Index schema has no field '{}', rebuild the index",
                        field.name()
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { schema, fields })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the tantivy handle of a field
    pub fn field(&self, field: MofField) -> Field {
        self.fields[field as usize]
    }

    /// Fields the query parser searches when a clause has no qualifier
    pub fn default_search_fields(&self) -> Vec<Field> {
        MofField::DEFAULT_TEXT
            .iter()
            .map(|field| self.field(*field))
            .collect()
    }
}

impl Default for MofSchema {
    fn default() -> Self {
        Self::new()
    }
}
