//! Engine run metrics.
//!
//! Counts and a per-rule trace for one run. Nothing here records wall-clock
//! time, so two runs over equal input produce equal metrics.

use crate::DocumentationQuery;
use serde::Serialize;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    /// Rules in the compiled set.
    pub rules_considered: usize,
    /// Rules skipped because a required flag was absent.
    pub rules_gated: usize,
    pub rules_fired: usize,
    pub overrides: usize,
    pub queries_emitted: usize,
    /// Queries dropped because one with the same id and axis was already emitted.
    pub queries_deduplicated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Gated,
    NotMatched,
    Fired,
}

/// What happened to one rule during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTrace {
    pub rule: String,
    pub status: RuleStatus,
}

/// Evaluator output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RunResult {
    pub queries: Vec<DocumentationQuery>,
    /// Rule ids in firing order.
    pub fired: Vec<String>,
    /// Empty unless the run was traced.
    pub trace: Vec<RuleTrace>,
    pub metrics: RunMetrics,
}
