//! Reference data shapes.
//!
//! These structs mirror the pre-parsed official datasets the index is built
//! from: the tables (one entry per body system / root operation pair, rows
//! listing the allowed values for characters 4..7), the body part and device
//! keys, device aggregation, definitions and the alphabetic index. Parsing
//! the official XML into this shape is done upstream; this module only
//! deserializes the JSON form.

use crate::{Axis, TableBuildError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Complete input for [`TableIndex::build`](crate::TableIndex::build).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub tables: Vec<PcsTable>,
    pub body_part_key: SynonymKey,
    pub device_key: SynonymKey,
    /// Synonyms for any axis, e.g. approach `"Laparoscopic"`.
    pub synonyms: Vec<SynonymEntry>,
    pub device_aggregation: DeviceAggregation,
    pub definitions: Vec<Definition>,
    pub index: Vec<IndexTerm>,
}

impl ReferenceData {
    /// Read reference data from a JSON byte source (e.g. an opened file).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableBuildError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TableBuildError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A code character and its official text, e.g. `{code: '4', text: "Gallbladder"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub code: char,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// One official table: fixed characters 2 and 3, and the rows that list the
/// allowed values for characters 4 to 7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcsTable {
    pub body_system: Label,
    pub operation: Label,
    #[serde(default)]
    pub rows: Vec<PcsRow>,
}

impl PcsTable {
    /// Three-character table key such as `"0FT"`.
    pub fn key(&self) -> String {
        format!("{}{}{}", crate::SECTION, self.body_system.code, self.operation.code)
    }
}

/// One table row. Every combination of one label per list is a valid code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcsRow {
    pub body_parts: Vec<Label>,
    pub approaches: Vec<Label>,
    pub devices: Vec<Label>,
    pub qualifiers: Vec<Label>,
}

/// Body part key / device key: synonym or brand name to table values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynonymKey {
    pub data: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub axis: Axis,
    pub synonym: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAggregation {
    pub records: Vec<AggregationRecord>,
}

/// A specific device value and the general value some tables use instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub specific_device: String,
    pub general_device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub axis: Axis,
    pub name: String,
    pub definition: String,
}

/// Alphabetic index entry: a term and the code prefixes it leads to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTerm {
    pub term: String,
    #[serde(default)]
    pub codes: Vec<String>,
}
