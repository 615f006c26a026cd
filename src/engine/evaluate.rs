//! Single-pass rule evaluation.
//!
//! ```text
//! for rule in declaration order:
//!     required flags absent?  ── yes ──▶ Gated
//!     predicate(facts, index) ── no  ──▶ NotMatched
//!     apply effect            ─────────▶ Fired
//!         Override → facts.set(axis, rule-derived candidate)
//!         Query    → push unless (id, axis) already emitted
//! ```
//!
//! Each predicate sees the facts as left by the rules before it, so an
//! override can enable or disable later rules. There is no second pass.
//! Predicates over unset axes are false; evaluation cannot fail.

use super::compiled_rules::{CompiledRules, Effect, Predicate};
use super::dedup::QueryKey;
use super::metrics::{RuleStatus, RuleTrace, RunResult};
use crate::{Axis, AxisCandidate, ProcedureFacts, TableIndex, fold};
use std::collections::HashSet;

pub(crate) struct Evaluator<'a> {
    rules: &'a CompiledRules,
    index: &'a TableIndex,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(rules: &'a CompiledRules, index: &'a TableIndex) -> Self {
        Evaluator { rules, index }
    }

    /// Run every rule once against `facts`. With `trace`, record a
    /// [`RuleTrace`] per rule.
    pub(crate) fn run(&self, facts: &mut ProcedureFacts, trace: bool) -> RunResult {
        let mut out = RunResult::default();
        let mut emitted: HashSet<QueryKey> = HashSet::new();
        out.metrics.rules_considered = self.rules.len();

        for (rule, meta) in self.rules.rules.iter().zip(&self.rules.metas) {
            let status = if !facts.flags().contains(meta.requires) {
                out.metrics.rules_gated += 1;
                tracing::debug!(rule = %rule.id, "gated");
                RuleStatus::Gated
            } else if !self.holds(&rule.predicate, facts) {
                RuleStatus::NotMatched
            } else {
                out.metrics.rules_fired += 1;
                out.fired.push(rule.id.clone());
                match &rule.effect {
                    Effect::Override { axis, value } => {
                        tracing::debug!(rule = %rule.id, %axis, value = %value, "override");
                        facts.set(*axis, AxisCandidate::rule_derived(*axis, value.as_str(), &rule.id));
                        out.metrics.overrides += 1;
                    }
                    Effect::Query(query) => {
                        if emitted.insert(QueryKey::from_query(query)) {
                            tracing::debug!(rule = %rule.id, query = %query.id, axis = %query.axis, "query");
                            out.queries.push(query.clone());
                            out.metrics.queries_emitted += 1;
                        } else {
                            out.metrics.queries_deduplicated += 1;
                        }
                    }
                }
                RuleStatus::Fired
            };

            if trace {
                out.trace.push(RuleTrace { rule: rule.id.clone(), status });
            }
        }

        out
    }

    fn holds(&self, predicate: &Predicate, facts: &ProcedureFacts) -> bool {
        match predicate {
            Predicate::Always => true,
            Predicate::AxisIn { axis, values } => match self.normalized(facts, *axis) {
                Some(current) => {
                    let current = fold(&current);
                    values.iter().any(|v| *v == current)
                }
                None => false,
            },
            Predicate::AxisSet(axis) => facts.get(*axis).is_some(),
            Predicate::AxisUnset(axis) => facts.get(*axis).is_none(),
            Predicate::Contested(axis) => facts.is_contested(*axis),
            Predicate::Flag(flags) => facts.flags().contains(*flags),
            // Lookups normalize and expand the raw selections themselves.
            Predicate::CombinationPossible => !self.index.lookup(&facts.combination()).is_empty(),
            Predicate::ValuePossible { axis, value } => match value {
                Some(value) => !self.index.lookup(&facts.combination().with(*axis, value.as_str())).is_empty(),
                None => false,
            },
            Predicate::All(of) => of.iter().all(|p| self.holds(p, facts)),
            Predicate::Any(of) => of.iter().any(|p| self.holds(p, facts)),
            Predicate::Not(inner) => !self.holds(inner, facts),
        }
    }

    fn normalized(&self, facts: &ProcedureFacts, axis: Axis) -> Option<String> {
        let candidate = facts.get(axis)?;
        self.index.normalize(axis, &candidate.value).ok()
    }
}
