//! Error types.
//!
//! The error taxonomy follows the pipeline:
//!
//! ```text
//! input shape   ── InputError        rejected before any rule runs
//! startup data  ── TableBuildError   reference tables, fatal
//!               └─ RuleLoadError     guideline rule set, fatal
//! table queries ── LookupError       returned by TableIndex operations
//! ```
//!
//! Resolution gaps (missing axes, unknown terms, no matching row) are not
//! errors: the assembler reports them as an [`Outcome`](crate::Outcome).

use crate::{Axis, AxisSet, Combination, PcsCode};

/// Malformed input at the fact store boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("unknown axis '{0}'")]
    UnknownAxis(String),

    #[error("unknown candidate origin '{0}' (expected extracted, ai, heuristic, user or manual)")]
    UnknownOrigin(String),

    #[error("origin '{0}' is reserved for rule-derived candidates")]
    ReservedOrigin(String),

    #[error("empty value for axis {0}")]
    EmptyValue(Axis),

    #[error("unknown procedure flag '{0}'")]
    UnknownFlag(String),
}

/// A guideline rule set that cannot be used. Always fatal at load time.
#[derive(Debug, thiserror::Error)]
pub enum RuleLoadError {
    #[error("failed to read rule set: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule set: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rule #{position} has an empty id")]
    EmptyId { position: usize },

    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),

    #[error("rule '{rule}' has an empty {field}")]
    EmptyField { rule: String, field: &'static str },

    #[error("rule '{rule}' overrides {axis} with '{value}', which is not in the {axis} vocabulary")]
    UnknownOverrideValue { rule: String, axis: Axis, value: String },
}

/// Reference data that cannot be indexed. Always fatal at load time.
#[derive(Debug, thiserror::Error)]
pub enum TableBuildError {
    #[error("failed to read reference data: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse reference data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("table {table}: missing {what} text")]
    MissingHeader { table: String, what: &'static str },

    #[error("table {table}: a row has no {axis} values")]
    EmptyRowAxis { table: String, axis: Axis },

    #[error("table {table}: '{character}' at position {position} is not a PCS character")]
    InvalidCharacter { table: String, position: usize, character: char },
}

/// Failure of a [`TableIndex`](crate::TableIndex) query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("'{term}' is not a known {axis} value")]
    UnknownTerm { axis: Axis, term: String },

    #[error("'{term}' stands for several {axis} values: {}", values.join(", "))]
    SeveralValues { axis: Axis, term: String, values: Vec<String> },

    #[error("no table row matches {attempted}")]
    NoSuchRow { attempted: Combination },

    #[error("{attempted} matches several codes: {}", join_codes(codes))]
    AmbiguousRow { attempted: Combination, codes: Vec<PcsCode> },

    #[error("combination is missing {}", join_axes(*missing))]
    Incomplete { missing: AxisSet },
}

fn join_codes(codes: &[PcsCode]) -> String {
    codes.iter().map(PcsCode::as_str).collect::<Vec<_>>().join(", ")
}

fn join_axes(axes: AxisSet) -> String {
    axes.axes().map(Axis::title).collect::<Vec<_>>().join(", ")
}
