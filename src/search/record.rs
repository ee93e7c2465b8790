//! Source records as produced by the MOF property pipeline
//!
//! Each JSON file maps a refcode to a property object. Property names in the
//! source differ from index field names (`"Number of channels"` vs
//! `n_channel`); the index field name is accepted as an alias when the source
//! name is absent. Multivalued properties are flattened to one comma-joined
//! string in source order.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

use crate::search::schema::MofField;
use crate::util::{deserialize_joined_text, deserialize_number_from_anything};

/// Source property names paired with the index field name accepted in their place
const SOURCE_ALIASES: [(&str, &str); 9] = [
    ("Number of channels", "n_channel"),
    ("Void fraction", "void_fraction"),
    ("metals", "metal"),
    ("metals symbols", "metal_symbols"),
    ("ligand inchikey", "ligand_inchi"),
    ("ligand smiles", "ligand_smile"),
    ("chemical name", "chemical_name"),
    ("sbu type", "sbu_type"),
    ("iupac name", "iupac_name"),
];

/// The properties of one MOF, after flattening
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceProperties {
    #[serde(rename = "PLD", default, deserialize_with = "deserialize_number_from_anything")]
    pub pld: Option<f64>,
    #[serde(rename = "LCD", default, deserialize_with = "deserialize_number_from_anything")]
    pub lcd: Option<f64>,
    #[serde(rename = "ASA", default, deserialize_with = "deserialize_number_from_anything")]
    pub asa: Option<f64>,
    #[serde(rename = "AV", default, deserialize_with = "deserialize_number_from_anything")]
    pub av: Option<f64>,
    #[serde(
        rename = "Number of channels",
        alias = "n_channel",
        default,
        deserialize_with = "deserialize_number_from_anything"
    )]
    pub n_channel: Option<f64>,
    #[serde(
        rename = "Void fraction",
        alias = "void_fraction",
        default,
        deserialize_with = "deserialize_number_from_anything"
    )]
    pub void_fraction: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number_from_anything")]
    pub id: Option<f64>,

    #[serde(
        rename = "metals",
        alias = "metal",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub metal: Option<String>,
    #[serde(
        rename = "metals symbols",
        alias = "metal_symbols",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub metal_symbols: Option<String>,
    #[serde(
        rename = "ligand inchikey",
        alias = "ligand_inchi",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub ligand_inchi: Option<String>,
    #[serde(
        rename = "ligand smiles",
        alias = "ligand_smile",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub ligand_smile: Option<String>,
    #[serde(
        rename = "chemical name",
        alias = "chemical_name",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub chemical_name: Option<String>,
    #[serde(
        rename = "sbu type",
        alias = "sbu_type",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub sbu_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_joined_text")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_joined_text")]
    pub topology: Option<String>,
    #[serde(
        rename = "iupac name",
        alias = "iupac_name",
        default,
        deserialize_with = "deserialize_joined_text"
    )]
    pub iupac_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_joined_text")]
    pub doi: Option<String>,
}

/// One MOF ready to be written to the index
#[derive(Debug, Clone, PartialEq)]
pub struct MofRecord {
    pub refcode: String,
    pub properties: SourceProperties,
}

impl MofRecord {
    /// Build a record from the value stored under `refcode` in a source file
    ///
    /// Fails when the value is not a mapping or a property cannot be read.
    pub fn from_source(refcode: &str, value: &Value) -> Result<Self> {
        if refcode.trim().is_empty() {
            bail!("Empty refcode");
        }
        let Some(object) = value.as_object() else {
            bail!("Properties of {refcode} are not a mapping");
        };

        // The source name wins; its alias is only read when the source name is absent
        let mut object = object.clone();
        for (source, alias) in SOURCE_ALIASES {
            if object.contains_key(source) {
                object.remove(alias);
            }
        }

        let properties = SourceProperties::deserialize(Value::Object(object))
            .with_context(|| format!("Failed to read properties of {refcode}"))?;

        Ok(Self {
            refcode: refcode.to_string(),
            properties,
        })
    }

    /// Numeric value of a field, `None` for text fields and absent values
    pub fn numeric(&self, field: MofField) -> Option<f64> {
        let p = &self.properties;
        match field {
            MofField::Pld => p.pld,
            MofField::Lcd => p.lcd,
            MofField::Asa => p.asa,
            MofField::Av => p.av,
            MofField::NChannel => p.n_channel,
            MofField::VoidFraction => p.void_fraction,
            MofField::Id => p.id,
            _ => None,
        }
    }

    /// Text value of a field, `None` for numeric fields and absent values
    pub fn text(&self, field: MofField) -> Option<&str> {
        let p = &self.properties;
        let value = match field {
            MofField::Refcode => return Some(self.refcode.as_str()),
            MofField::Metal => &p.metal,
            MofField::MetalSymbols => &p.metal_symbols,
            MofField::LigandInchi => &p.ligand_inchi,
            MofField::LigandSmile => &p.ligand_smile,
            MofField::ChemicalName => &p.chemical_name,
            MofField::SbuType => &p.sbu_type,
            MofField::Color => &p.color,
            MofField::Topology => &p.topology,
            MofField::IupacName => &p.iupac_name,
            MofField::Doi => &p.doi,
            _ => return None,
        };
        value.as_deref()
    }
}
