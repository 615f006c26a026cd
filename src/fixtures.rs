//! Shared reference data for unit tests.

use crate::{ReferenceData, TableIndex};
use once_cell::sync::Lazy;

pub const REFERENCE_JSON: &str = include_str!("../tests/data/reference.json");

static INDEX: Lazy<TableIndex> =
    Lazy::new(|| TableIndex::build(&reference_data()).expect("fixture reference data must index"));

pub fn reference_data() -> ReferenceData {
    ReferenceData::from_json_str(REFERENCE_JSON).expect("fixture reference data must parse")
}

pub fn index() -> &'static TableIndex {
    &INDEX
}
