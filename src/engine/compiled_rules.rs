//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: the structures derived
//! from a [`RuleSet`] once, against one [`TableIndex`], so that each run only
//! evaluates.
//!
//! Running a rule set is split into two phases:
//!
//! 1. **Compile** (this module): check the set's shape, normalize every value
//!    the rules mention against the table vocabulary, and record per-rule
//!    metadata (`RuleMeta`).
//! 2. **Run** (see `evaluate.rs`): walk the rules in declaration order, skip
//!    rules whose required flags are absent, evaluate the rest against the
//!    current facts.
//!
//! Normalization happens here so that an override can never write a value
//! the tables do not know. Condition values that do not normalize are kept
//! (folded) and can never match; they are logged rather than rejected so a
//! rule file written for a larger table set still loads against a smaller one.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `CompiledRules::rules` and
//!   `CompiledRules::metas`. Those vectors stay aligned and in declaration
//!   order.
//! - `RuleMeta::requires` is only derived from the top-level conjunction, so
//!   gating on it never skips a rule whose condition could hold.

use crate::{
    Action, Axis, AxisSet, Condition, DocumentationQuery, GuidelineRule, ProcedureFlags, RuleLoadError, RuleSet,
    TableIndex, fold,
};

/// Rule identifier (index into the rules vector).
pub(crate) type RuleId = usize;

/// A condition with its values resolved against the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    Always,
    /// Folded canonical names (or folded raw names that did not normalize).
    AxisIn { axis: Axis, values: Vec<String> },
    AxisSet(Axis),
    AxisUnset(Axis),
    Contested(Axis),
    Flag(ProcedureFlags),
    CombinationPossible,
    /// `value` is canonical, or `None` when it did not normalize.
    ValuePossible { axis: Axis, value: Option<String> },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    /// `value` is canonical.
    Override { axis: Axis, value: String },
    Query(DocumentationQuery),
}

/// Metadata derived from a rule at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RuleMeta {
    /// Axes the condition looks at.
    pub reads: AxisSet,
    /// Flags that must all be present for the condition to hold.
    pub requires: ProcedureFlags,
    pub writes: Option<Axis>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub id: String,
    pub predicate: Predicate,
    pub effect: Effect,
}

/// Pre-compiled rule set with metadata.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) metas: Vec<RuleMeta>,
}

impl CompiledRules {
    /// Compile `set` against `index`.
    ///
    /// Fails on shape errors (see [`RuleSet::check`]) and on override values
    /// that are not in the target axis vocabulary.
    pub fn compile(set: &RuleSet, index: &TableIndex) -> Result<Self, RuleLoadError> {
        set.check()?;

        let mut rules = Vec::with_capacity(set.len());
        let mut metas = Vec::with_capacity(set.len());
        for rule in set.iter() {
            let compiled = compile_rule(rule, index)?;
            let meta = RuleMeta {
                reads: reads(&compiled.predicate),
                requires: requires(&compiled.predicate),
                writes: match &compiled.effect {
                    Effect::Override { axis, .. } => Some(*axis),
                    Effect::Query(_) => None,
                },
            };
            tracing::debug!(
                rule = %compiled.id,
                reads = ?meta.reads,
                requires = ?meta.requires,
                writes = ?meta.writes,
                "rule compiled"
            );
            metas.push(meta);
            rules.push(compiled);
        }

        let gated = metas.iter().filter(|m| !m.requires.is_empty()).count();
        tracing::info!(rules = rules.len(), flag_gated = gated, "guideline rules compiled");

        Ok(CompiledRules { rules, metas })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule ids in evaluation order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id.as_str())
    }
}

fn compile_rule(rule: &GuidelineRule, index: &TableIndex) -> Result<CompiledRule, RuleLoadError> {
    let id = rule.id.trim().to_string();
    let predicate = compile_condition(&id, &rule.condition, index);
    let effect = match &rule.action {
        Action::OverrideAxis { axis, value } => match index.normalize(*axis, value) {
            Ok(canonical) => Effect::Override { axis: *axis, value: canonical },
            Err(_) => return Err(RuleLoadError::UnknownOverrideValue { rule: id, axis: *axis, value: value.clone() }),
        },
        Action::EmitQuery { query_id, axis, message } => Effect::Query(DocumentationQuery {
            id: query_id.trim().to_string(),
            axis: *axis,
            message: message.trim().to_string(),
        }),
    };
    Ok(CompiledRule { id, predicate, effect })
}

fn compile_condition(rule: &str, condition: &Condition, index: &TableIndex) -> Predicate {
    let key = |axis: Axis, value: &str| match index.normalize(axis, value) {
        Ok(canonical) => fold(&canonical),
        Err(_) => {
            tracing::warn!(rule, %axis, value, "condition value is not in the table vocabulary; it can never match");
            fold(value)
        }
    };

    match condition {
        Condition::Always => Predicate::Always,
        Condition::AxisIs { axis, value } => Predicate::AxisIn { axis: *axis, values: vec![key(*axis, value)] },
        Condition::AxisIn { axis, values } => {
            Predicate::AxisIn { axis: *axis, values: values.iter().map(|v| key(*axis, v)).collect() }
        }
        Condition::AxisSet { axis } => Predicate::AxisSet(*axis),
        Condition::AxisUnset { axis } => Predicate::AxisUnset(*axis),
        Condition::Contested { axis } => Predicate::Contested(*axis),
        Condition::Flag { flag } => Predicate::Flag(*flag),
        Condition::CombinationPossible => Predicate::CombinationPossible,
        Condition::ValuePossible { axis, value } => {
            let value = index.normalize(*axis, value).ok();
            if value.is_none() {
                tracing::warn!(rule, %axis, "value_possible names a value outside the table vocabulary");
            }
            Predicate::ValuePossible { axis: *axis, value }
        }
        Condition::All { of } => Predicate::All(of.iter().map(|c| compile_condition(rule, c, index)).collect()),
        Condition::Any { of } => Predicate::Any(of.iter().map(|c| compile_condition(rule, c, index)).collect()),
        Condition::Not { condition } => Predicate::Not(Box::new(compile_condition(rule, condition, index))),
    }
}

fn reads(predicate: &Predicate) -> AxisSet {
    match predicate {
        Predicate::AxisIn { axis, .. }
        | Predicate::AxisSet(axis)
        | Predicate::AxisUnset(axis)
        | Predicate::Contested(axis) => axis.bit(),
        Predicate::CombinationPossible | Predicate::ValuePossible { .. } => AxisSet::all(),
        Predicate::All(of) | Predicate::Any(of) => of.iter().fold(AxisSet::empty(), |acc, p| acc | reads(p)),
        Predicate::Not(inner) => reads(inner),
        Predicate::Always | Predicate::Flag(_) => AxisSet::empty(),
    }
}

/// Flags implied by the top-level conjunction.
fn requires(predicate: &Predicate) -> ProcedureFlags {
    match predicate {
        Predicate::Flag(flags) => *flags,
        Predicate::All(of) => of.iter().fold(ProcedureFlags::empty(), |acc, p| acc | requires(p)),
        _ => ProcedureFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{default_rules, fixtures};

    #[test]
    fn compiles_default_rules_against_fixture_tables() {
        let compiled = CompiledRules::compile(&default_rules(), fixtures::index()).unwrap();
        assert_eq!(compiled.len(), default_rules().len());
        assert_eq!(compiled.ids().next(), Some("B5.2"));

        let b62 = compiled.ids().position(|id| id == "B6.2").unwrap();
        assert_eq!(compiled.metas[b62].requires, ProcedureFlags::DRAIN_PLACED | ProcedureFlags::DISTINCT_DRAINAGE);
        assert_eq!(compiled.metas[b62].reads, AxisSet::DEVICE);
        assert_eq!(compiled.metas[b62].writes, Some(Axis::Device));
    }

    #[test]
    fn negated_flags_do_not_gate() {
        let set = RuleSet::new(vec![guideline! {
            id: "no-drain",
            when: Condition::not(Condition::flag(ProcedureFlags::DRAIN_PLACED)),
            then: query!("X", Axis::Device, "?"),
        }]);
        let compiled = CompiledRules::compile(&set, fixtures::index()).unwrap();
        assert!(compiled.metas[0].requires.is_empty());
    }

    #[test]
    fn override_values_are_normalized() {
        let set = RuleSet::new(vec![guideline! {
            id: "lap",
            when: Condition::Always,
            then: Action::override_axis(Axis::Approach, "laparoscopic"),
        }]);
        let compiled = CompiledRules::compile(&set, fixtures::index()).unwrap();
        assert_eq!(
            compiled.rules[0].effect,
            Effect::Override { axis: Axis::Approach, value: "Percutaneous Endoscopic".into() }
        );
    }

    #[test]
    fn unknown_override_value_is_fatal() {
        let set = RuleSet::new(vec![guideline! {
            id: "bad",
            when: Condition::Always,
            then: Action::override_axis(Axis::Device, "Flux Capacitor"),
        }]);
        match CompiledRules::compile(&set, fixtures::index()) {
            Err(RuleLoadError::UnknownOverrideValue { rule, axis, value }) => {
                assert_eq!(rule, "bad");
                assert_eq!(axis, Axis::Device);
                assert_eq!(value, "Flux Capacitor");
            }
            other => panic!("expected UnknownOverrideValue, got {other:?}"),
        }
    }

    #[test]
    fn unknown_condition_values_are_kept_folded() {
        let set = RuleSet::new(vec![guideline! {
            id: "spleen",
            when: Condition::axis_is(Axis::BodyPart, "  Spleen "),
            then: query!("X", Axis::BodyPart, "?"),
        }]);
        let compiled = CompiledRules::compile(&set, fixtures::index()).unwrap();
        assert_eq!(
            compiled.rules[0].predicate,
            Predicate::AxisIn { axis: Axis::BodyPart, values: vec!["spleen".into()] }
        );
    }
}
