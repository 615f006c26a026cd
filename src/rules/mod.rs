//! Guideline rule language.
//!
//! A rule is a declarative `(condition, action)` pair. Conditions are a closed
//! set of tagged variants evaluated against the fact store and the table
//! index; there is no expression evaluator. Rule sets come either from code
//! ([`guidelines::default_rules`]) or from JSON:
//!
//! ```json
//! { "rules": [
//!     { "id": "B5.2",
//!       "condition": { "kind": "flag", "flag": "converted_to_open" },
//!       "action": { "kind": "override_axis", "axis": "approach", "value": "Open" } }
//! ] }
//! ```
//!
//! Loading only checks shape (ids, empty lists, blank text). Whether values
//! exist in the tables is checked when a rule set is compiled against a
//! [`TableIndex`](crate::TableIndex).

pub mod guidelines;

#[cfg(test)]
mod tests;

use crate::{Axis, ProcedureFlags, RuleLoadError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Always,
    /// The axis has a selection whose normalized value equals `value`.
    AxisIs { axis: Axis, value: String },
    AxisIn { axis: Axis, values: Vec<String> },
    AxisSet { axis: Axis },
    AxisUnset { axis: Axis },
    /// Unset, with offered candidates that disagree.
    Contested { axis: Axis },
    /// Every flag in `flag` is present.
    Flag { flag: ProcedureFlags },
    /// Some table row is consistent with the current selections.
    CombinationPossible,
    /// Some table row is consistent with the current selections plus `axis = value`.
    ValuePossible { axis: Axis, value: String },
    All { of: Vec<Condition> },
    Any { of: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn axis_is(axis: Axis, value: impl Into<String>) -> Self {
        Condition::AxisIs { axis, value: value.into() }
    }

    pub fn axis_in<S: Into<String>>(axis: Axis, values: impl IntoIterator<Item = S>) -> Self {
        Condition::AxisIn { axis, values: values.into_iter().map(Into::into).collect() }
    }

    pub fn axis_set(axis: Axis) -> Self {
        Condition::AxisSet { axis }
    }

    pub fn axis_unset(axis: Axis) -> Self {
        Condition::AxisUnset { axis }
    }

    pub fn contested(axis: Axis) -> Self {
        Condition::Contested { axis }
    }

    pub fn flag(flag: ProcedureFlags) -> Self {
        Condition::Flag { flag }
    }

    pub fn value_possible(axis: Axis, value: impl Into<String>) -> Self {
        Condition::ValuePossible { axis, value: value.into() }
    }

    pub fn all(of: impl IntoIterator<Item = Condition>) -> Self {
        Condition::All { of: of.into_iter().collect() }
    }

    pub fn any(of: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Any { of: of.into_iter().collect() }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not { condition: Box::new(condition) }
    }

    fn check(&self, rule: &str) -> Result<(), RuleLoadError> {
        let empty = |field: &'static str| Err(RuleLoadError::EmptyField { rule: rule.to_string(), field });
        match self {
            Condition::AxisIs { value, .. } | Condition::ValuePossible { value, .. } if value.trim().is_empty() => {
                empty("condition value")
            }
            Condition::AxisIn { values, .. } if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) => {
                empty("axis_in values")
            }
            Condition::Flag { flag } if flag.is_empty() => empty("flag"),
            Condition::All { of } if of.is_empty() => empty("all"),
            Condition::Any { of } if of.is_empty() => empty("any"),
            Condition::All { of } | Condition::Any { of } => of.iter().try_for_each(|c| c.check(rule)),
            Condition::Not { condition } => condition.check(rule),
            _ => Ok(()),
        }
    }
}

/// What a rule does when its condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Replace the axis selection with a rule-derived candidate.
    OverrideAxis { axis: Axis, value: String },
    /// Ask for more documentation; facts are untouched.
    EmitQuery { query_id: String, axis: Axis, message: String },
}

impl Action {
    pub fn override_axis(axis: Axis, value: impl Into<String>) -> Self {
        Action::OverrideAxis { axis, value: value.into() }
    }

    pub fn axis(&self) -> Axis {
        match self {
            Action::OverrideAxis { axis, .. } | Action::EmitQuery { axis, .. } => *axis,
        }
    }

    fn check(&self, rule: &str) -> Result<(), RuleLoadError> {
        let field = match self {
            Action::OverrideAxis { value, .. } if value.trim().is_empty() => Some("override value"),
            Action::EmitQuery { query_id, .. } if query_id.trim().is_empty() => Some("query id"),
            Action::EmitQuery { message, .. } if message.trim().is_empty() => Some("query message"),
            _ => None,
        };
        match field {
            Some(field) => Err(RuleLoadError::EmptyField { rule: rule.to_string(), field }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidelineRule {
    pub id: String,
    pub condition: Condition,
    pub action: Action,
}

/// An ordered list of rules. Order is evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<GuidelineRule>,
}

impl RuleSet {
    /// Wrap rules declared in code. Shape is checked when the set is compiled.
    pub fn new(rules: Vec<GuidelineRule>) -> Self {
        RuleSet { rules }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RuleLoadError> {
        let set: RuleSet = serde_json::from_reader(reader)?;
        set.check()?;
        Ok(set)
    }

    pub fn from_json_str(json: &str) -> Result<Self, RuleLoadError> {
        let set: RuleSet = serde_json::from_str(json)?;
        set.check()?;
        Ok(set)
    }

    /// Reject empty or duplicate ids, empty composites and blank text.
    pub fn check(&self) -> Result<(), RuleLoadError> {
        let mut seen = HashSet::new();
        for (position, rule) in self.rules.iter().enumerate() {
            let id = rule.id.trim();
            if id.is_empty() {
                return Err(RuleLoadError::EmptyId { position });
            }
            if !seen.insert(id) {
                return Err(RuleLoadError::DuplicateId(id.to_string()));
            }
            rule.condition.check(id)?;
            rule.action.check(id)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GuidelineRule> {
        self.rules.iter()
    }
}
