//! Axis fact store.
//!
//! Holds, per axis, the pool of offered candidates, the current selection and
//! the selections that were replaced. The store does no table validation; it
//! only records what upstream extraction, the user and the rules said.

use crate::{Axis, AxisCandidate, AxisSet, Combination, Confidence, InputError, ProcedureFlags, fold};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureFacts {
    selected: [Option<AxisCandidate>; 6],
    offered: [Vec<AxisCandidate>; 6],
    history: [Vec<AxisCandidate>; 6],
    flags: ProcedureFlags,
}

impl ProcedureFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a batch of raw candidates, failing on the first malformed one.
    pub fn from_raw<I: IntoIterator<Item = RawCandidate>>(raw: I) -> Result<Self, InputError> {
        let mut facts = Self::new();
        for candidate in raw {
            facts.offer(AxisCandidate::try_from(candidate)?);
        }
        Ok(facts)
    }

    /// Select `candidate` for `axis`. Last write wins; the replaced selection
    /// goes to the axis history.
    pub fn set(&mut self, axis: Axis, mut candidate: AxisCandidate) {
        candidate.axis = axis;
        if let Some(previous) = self.selected[axis.index()].replace(candidate) {
            self.history[axis.index()].push(previous);
        }
    }

    pub fn get(&self, axis: Axis) -> Option<&AxisCandidate> {
        self.selected[axis.index()].as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.selected.iter().all(Option::is_some)
    }

    pub fn missing(&self) -> AxisSet {
        Axis::ALL.into_iter().filter(|axis| self.get(*axis).is_none()).collect()
    }

    /// Add a candidate to the axis pool without selecting it.
    pub fn offer(&mut self, candidate: AxisCandidate) {
        self.offered[candidate.axis.index()].push(candidate);
    }

    /// Offered candidates for `axis`, in insertion order.
    pub fn candidates(&self, axis: Axis) -> &[AxisCandidate] {
        &self.offered[axis.index()]
    }

    /// Select `value` for `axis` as a user choice. A matching offered
    /// candidate keeps its spelling and notes where it was offered from.
    pub fn select(&mut self, axis: Axis, value: &str) {
        let key = fold(value);
        let candidate = match self.offered[axis.index()].iter().find(|c| fold(&c.value) == key) {
            Some(offered) => {
                AxisCandidate::user(axis, offered.value.clone()).with_origin(format!("manual ({})", offered.origin))
            }
            None => AxisCandidate::user(axis, value.trim()),
        };
        self.set(axis, candidate);
    }

    /// Select every unset axis whose offered candidates agree on one value.
    /// Returns the unset axes left contested.
    pub fn select_unambiguous(&mut self) -> AxisSet {
        let mut contested = AxisSet::empty();
        for axis in Axis::ALL {
            if self.get(axis).is_some() {
                continue;
            }
            match self.agreed(axis) {
                Agreement::One(candidate) => {
                    let candidate = candidate.clone();
                    tracing::debug!(%axis, value = %candidate.value, "selected sole candidate");
                    self.set(axis, candidate);
                }
                Agreement::Contested => contested |= axis.bit(),
                Agreement::Empty => {}
            }
        }
        contested
    }

    /// Unset and the offered candidates disagree.
    pub fn is_contested(&self, axis: Axis) -> bool {
        self.get(axis).is_none() && matches!(self.agreed(axis), Agreement::Contested)
    }

    fn agreed(&self, axis: Axis) -> Agreement<'_> {
        let pool = &self.offered[axis.index()];
        let Some(first) = pool.first() else {
            return Agreement::Empty;
        };
        let key = fold(&first.value);
        if pool.iter().all(|c| fold(&c.value) == key) { Agreement::One(first) } else { Agreement::Contested }
    }

    /// Selections replaced on `axis`, oldest first.
    pub fn history(&self, axis: Axis) -> &[AxisCandidate] {
        &self.history[axis.index()]
    }

    pub fn flags(&self) -> ProcedureFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: ProcedureFlags) {
        self.flags |= flag;
    }

    pub fn set_flags(&mut self, flags: ProcedureFlags) {
        self.flags = flags;
    }

    /// Current selections as a (possibly partial) combination of raw values.
    pub fn combination(&self) -> Combination {
        let mut combo = Combination::new();
        for axis in Axis::ALL {
            if let Some(candidate) = self.get(axis) {
                combo.set(axis, candidate.value.as_str());
            }
        }
        combo
    }
}

enum Agreement<'a> {
    Empty,
    One(&'a AxisCandidate),
    Contested,
}

// --- Boundary ------------------------------------------------------------------

/// A candidate as upstream extraction reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub axis: String,
    pub value: String,
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    "extracted".to_string()
}

impl RawCandidate {
    pub fn new(axis: impl Into<String>, value: impl Into<String>, origin: impl Into<String>) -> Self {
        RawCandidate { axis: axis.into(), value: value.into(), origin: origin.into() }
    }
}

impl TryFrom<RawCandidate> for AxisCandidate {
    type Error = InputError;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let axis = Axis::from_str(&raw.axis)?;
        let value = raw.value.trim();
        if value.is_empty() {
            return Err(InputError::EmptyValue(axis));
        }

        let origin = raw.origin.trim().to_ascii_lowercase();
        let confidence = match origin.as_str() {
            "extracted" | "ai" | "heuristic" => Confidence::Extracted,
            "user" | "manual" => Confidence::User,
            o if o == "rule" || o.starts_with("rule ") || o.starts_with("rule:") => {
                return Err(InputError::ReservedOrigin(raw.origin));
            }
            _ => return Err(InputError::UnknownOrigin(raw.origin)),
        };

        Ok(AxisCandidate { axis, value: value.to_string(), confidence, origin, rule: None })
    }
}

/// A selection made by a person, applied after candidates are offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub axis: String,
    pub value: String,
}

/// Input document for one procedure: offered candidates, flags and explicit
/// selections.
///
/// ```json
/// { "candidates": [{"axis": "body_part", "value": "Gallbladder", "origin": "ai"}],
///   "flags": ["converted_to_open"],
///   "selections": [{"axis": "approach", "value": "Percutaneous Endoscopic"}] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsDocument {
    pub candidates: Vec<RawCandidate>,
    pub flags: Vec<String>,
    pub selections: Vec<Selection>,
}

impl FactsDocument {
    pub fn into_facts(self) -> Result<ProcedureFacts, InputError> {
        let mut facts = ProcedureFacts::from_raw(self.candidates)?;
        facts.set_flags(ProcedureFlags::parse_names(&self.flags)?);
        for selection in &self.selections {
            let axis = Axis::from_str(&selection.axis)?;
            if selection.value.trim().is_empty() {
                return Err(InputError::EmptyValue(axis));
            }
            facts.select(axis, &selection.value);
        }
        Ok(facts)
    }
}
