//! Code assembly and validation.
//!
//! Runs after the rules engine on the facts it leaves behind:
//!
//! ```text
//! facts ── complete? ── no ──▶ Incomplete { missing, queries, options }
//!            │ yes
//!            v
//!        expand each axis ── unknown ──▶ Invalid { axis, UnknownTerm }
//!            │ key terms give one combination per value
//!            v
//!        lookup full key ── 0 rows ──▶ generalize device ── 0 ──▶ Invalid { NoValidRow }
//!            │ 1 row                        │ 1 row   └── >1 ──▶ Invalid { AmbiguousRow }
//!            │ >1 codes ──▶ Invalid { AmbiguousRow }
//!            v                              v
//!        one hit over all combinations? ── >1 ──▶ Invalid { AmbiguousRow }
//!            │ yes
//!            v
//!        characters_for ──▶ Valid { code, provenance }
//! ```
//!
//! A code is only ever produced from a table row; nothing here builds
//! characters from names.

use crate::{
    Axis, AxisSet, Combination, Confidence, DocumentationQuery, LookupError, PcsCode, ProcedureFacts, TableIndex,
    TableRow,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Valid {
        code: PcsCode,
        /// One entry per axis, in code order.
        provenance: Vec<ProvenanceEntry>,
    },
    Incomplete {
        missing: AxisSet,
        queries: Vec<DocumentationQuery>,
        /// Values each missing axis can still take given the set axes.
        options: BTreeMap<Axis, Vec<String>>,
    },
    Invalid {
        #[serde(skip_serializing_if = "Option::is_none")]
        axis: Option<Axis>,
        reason: InvalidReason,
        attempted: Combination,
    },
}

impl Outcome {
    pub fn code(&self) -> Option<&PcsCode> {
        match self {
            Outcome::Valid { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    UnknownTerm,
    NoValidRow,
    AmbiguousRow,
}

/// Where the value behind one code character came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceEntry {
    pub axis: Axis,
    /// Canonical value the character was taken from.
    pub value: String,
    pub source: Source,
    pub origin: String,
    /// The last non-rule selection a rule replaced, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<Superseded>,
    /// Key term that listed several values, of which `value` was the one
    /// with a table row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_from: Option<String>,
    /// Specific device replaced by its general value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generalized_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Extracted,
    User,
    Rule { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Superseded {
    pub value: String,
    pub confidence: Confidence,
}

pub(crate) struct Assembler<'a> {
    index: &'a TableIndex,
    device_generalization: bool,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(index: &'a TableIndex, device_generalization: bool) -> Self {
        Assembler { index, device_generalization }
    }

    pub(crate) fn assemble(&self, facts: &ProcedureFacts, queries: &[DocumentationQuery]) -> Outcome {
        let missing = facts.missing();
        if !missing.is_empty() {
            tracing::debug!(missing = ?missing, "incomplete");
            return Outcome::Incomplete { missing, queries: queries.to_vec(), options: self.options(facts, missing) };
        }

        // One combination per choice of key term values; usually just one.
        let mut combos = vec![Combination::new()];
        let mut expanded = AxisSet::empty();
        for axis in Axis::ALL {
            let Some(candidate) = facts.get(axis) else {
                continue;
            };
            let values = match self.index.expand(axis, &candidate.value) {
                Ok(values) => values,
                Err(_) => {
                    tracing::debug!(%axis, value = %candidate.value, "unknown term");
                    return Outcome::Invalid {
                        axis: Some(axis),
                        reason: InvalidReason::UnknownTerm,
                        attempted: facts.combination(),
                    };
                }
            };
            if self.index.is_key_term(axis, &candidate.value) {
                tracing::debug!(%axis, term = %candidate.value, values = ?values, "expanding key term");
                expanded |= axis.bit();
            }
            combos = combos
                .into_iter()
                .flat_map(|combo| values.iter().map(move |value| combo.clone().with(axis, value.as_str())))
                .collect();
        }

        let (row, generalized_from) = match self.find_expanded(&combos, expanded) {
            Ok(found) => found,
            Err(reason) => {
                let attempted = match combos.as_slice() {
                    [combo] => combo.clone(),
                    _ => facts.combination(),
                };
                let axis = if expanded.bits().count_ones() == 1 { expanded.axes().next() } else { None };
                return Outcome::Invalid { axis, reason, attempted };
            }
        };

        let chars = match self.index.characters_for(&row.combination()) {
            Ok(chars) => chars,
            Err(LookupError::AmbiguousRow { attempted, .. }) => {
                return Outcome::Invalid { axis: None, reason: InvalidReason::AmbiguousRow, attempted };
            }
            Err(_) => {
                return Outcome::Invalid { axis: None, reason: InvalidReason::NoValidRow, attempted: row.combination() };
            }
        };
        let Some(code) = PcsCode::from_chars(chars) else {
            return Outcome::Invalid { axis: None, reason: InvalidReason::NoValidRow, attempted: row.combination() };
        };

        tracing::debug!(code = %code, "assembled");
        Outcome::Valid { code, provenance: provenance(facts, row, expanded, generalized_from) }
    }

    /// Try every expanded combination. Exactly one must yield a row.
    fn find_expanded(
        &self,
        combos: &[Combination],
        expanded: AxisSet,
    ) -> Result<(&'a TableRow, Option<String>), InvalidReason> {
        if let [combo] = combos {
            return self.find_row(combo);
        }

        let mut hits = Vec::new();
        for combo in combos {
            match self.find_row(combo) {
                Ok(hit) => hits.push(hit),
                Err(InvalidReason::NoValidRow) => {}
                Err(reason) => return Err(reason),
            }
        }

        match hits.len() {
            0 => Err(InvalidReason::NoValidRow),
            1 => Ok(hits.remove(0)),
            _ => {
                let rows: Vec<&TableRow> = hits.iter().map(|(row, _)| *row).collect();
                tracing::debug!(expanded = ?expanded, "key term matches several rows");
                Err(ambiguous(&combos[0], &rows))
            }
        }
    }

    /// The single row for a normalized full combination, falling back to
    /// general device values. Returns the row and the replaced specific device.
    fn find_row(&self, combo: &Combination) -> Result<(&'a TableRow, Option<String>), InvalidReason> {
        match self.index.lookup(combo).as_slice() {
            [row] => return Ok((*row, None)),
            [] => {}
            rows => return Err(ambiguous(combo, rows)),
        }

        let device = combo.get(Axis::Device).unwrap_or_default();
        if !self.device_generalization {
            return Err(InvalidReason::NoValidRow);
        }

        let mut hits: Vec<(String, Vec<&'a TableRow>)> = Vec::new();
        for general in self.index.generalize_device(device) {
            let rows = self.index.lookup(&combo.clone().with(Axis::Device, general.as_str()));
            if !rows.is_empty() {
                hits.push((general, rows));
            }
        }

        match hits.as_slice() {
            [] => Err(InvalidReason::NoValidRow),
            [(general, rows)] if rows.len() == 1 => {
                tracing::debug!(specific = %device, general = %general, "device generalized");
                Ok((rows[0], Some(device.to_string())))
            }
            [(_, rows)] => Err(ambiguous(combo, rows)),
            _ => {
                let rows: Vec<&TableRow> = hits.iter().flat_map(|(_, rows)| rows.iter().copied()).collect();
                Err(ambiguous(combo, &rows))
            }
        }
    }

    /// Remaining values for each missing axis, constrained by the set axes
    /// the tables know. Key terms constrain to any of their values.
    fn options(&self, facts: &ProcedureFacts, missing: AxisSet) -> BTreeMap<Axis, Vec<String>> {
        let mut partial = Combination::new();
        for axis in Axis::ALL {
            if let Some(candidate) = facts.get(axis) {
                if self.index.expand(axis, &candidate.value).is_ok() {
                    partial.set(axis, candidate.value.as_str());
                }
            }
        }
        missing.axes().map(|axis| (axis, self.index.options(axis, &partial))).collect()
    }
}

fn ambiguous(combo: &Combination, rows: &[&TableRow]) -> InvalidReason {
    let codes: Vec<&str> = rows.iter().map(|r| r.code().as_str()).collect();
    tracing::error!(attempted = %combo, codes = ?codes, "combination matches several codes");
    InvalidReason::AmbiguousRow
}

fn provenance(
    facts: &ProcedureFacts,
    row: &TableRow,
    expanded: AxisSet,
    generalized_from: Option<String>,
) -> Vec<ProvenanceEntry> {
    let mut entries = Vec::with_capacity(6);
    for axis in Axis::ALL {
        let Some(candidate) = facts.get(axis) else {
            continue;
        };
        let source = match candidate.confidence {
            Confidence::Extracted => Source::Extracted,
            Confidence::User => Source::User,
            Confidence::RuleDerived => Source::Rule { id: candidate.rule.clone().unwrap_or_default() },
        };
        // The selection a person or extraction made, past any earlier rule writes.
        let superseded = match candidate.confidence {
            Confidence::RuleDerived => facts
                .history(axis)
                .iter()
                .rev()
                .find(|prev| prev.confidence != Confidence::RuleDerived)
                .map(|prev| Superseded { value: prev.value.clone(), confidence: prev.confidence }),
            _ => None,
        };
        entries.push(ProvenanceEntry {
            axis,
            value: row.value(axis).to_string(),
            source,
            origin: candidate.origin.clone(),
            superseded,
            expanded_from: expanded.has(axis).then(|| candidate.value.clone()),
            generalized_from: if axis == Axis::Device { generalized_from.clone() } else { None },
        });
    }
    entries
}
