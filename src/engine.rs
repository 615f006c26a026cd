//! Guideline rules engine.
//!
//! This module is the entry point for applying coding guidelines to a set of
//! procedure facts. It is split into focused submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! RuleSet ──┐
//!           │  CompiledRules::compile        (compiled_rules.rs)
//! TableIndex┘  - shape check, value normalization
//!              - RuleMeta: axes read, flags required
//!                         │
//! ProcedureFacts ─────────┼─ Evaluator::run  (evaluate.rs)
//!                         │    - declaration order, single pass
//!                         │    - flag gating
//!                         │    - overrides write facts
//!                         │    - queries dedup by QueryKey (dedup.rs)
//!                         v
//!                   RunResult { queries, fired, trace, metrics }  (metrics.rs)
//! ```
//!
//! The engine never assembles codes; that is `assemble.rs`, which runs on the
//! facts the engine leaves behind.
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: turns a `RuleSet` into `CompiledRules` against one
//!   table index; rejects overrides that name unknown values.
//! - `evaluate.rs`: the run loop and predicate evaluation.
//! - `dedup.rs`: the `(id, axis)` key that keeps queries unique per run.
//! - `metrics.rs`: run counts and the optional per-rule trace.
//!
//! ## Debugging
//!
//! Every fired and gated rule is logged at `debug` under the
//! `pcs_engine::engine` target.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/evaluate.rs"]
mod evaluate;
#[path = "engine/metrics.rs"]
mod metrics;

pub(crate) use compiled_rules::CompiledRules;
pub(crate) use evaluate::Evaluator;
pub(crate) use metrics::RunResult;
pub use metrics::{RuleStatus, RuleTrace, RunMetrics};
