use crate::assemble::{Assembler, Outcome};
use crate::engine::{self, CompiledRules, RuleTrace, RunMetrics};
use crate::{DocumentationQuery, ProcedureFacts, RuleLoadError, RuleSet, TableIndex};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The built-in guideline rules, declared once per process.
pub static DEFAULT_RULES: Lazy<RuleSet> = Lazy::new(crate::rules::guidelines::default_rules);

/// Options that affect resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Retry a failed lookup with the general value of a specific device.
    pub device_generalization: bool,
    /// Select axes whose offered candidates all agree before rules run.
    pub auto_select: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { device_generalization: true, auto_select: true }
    }
}

/// Result of [`Engine::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub outcome: Outcome,
    /// Documentation queries emitted by the rules, in emission order.
    pub queries: Vec<DocumentationQuery>,
    /// Ids of the rules that fired, in firing order.
    pub fired: Vec<String>,
}

/// Result of [`Engine::resolve_verbose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionVerbose {
    #[serde(flatten)]
    pub resolution: Resolution,
    /// One entry per rule, in evaluation order.
    pub trace: Vec<RuleTrace>,
    pub metrics: RunMetrics,
}

/// A compiled rule set bound to one table index.
///
/// Building an `Engine` compiles the rules once; `resolve` only evaluates.
/// The engine holds no per-run state, so one instance can serve any number
/// of threads.
///
/// # Example
/// ```
/// use pcs_engine::{Engine, FactsDocument, ReferenceData, TableIndex};
///
/// let json = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/reference.json"));
/// let data = ReferenceData::from_json_str(json).unwrap();
/// let index = TableIndex::build(&data).unwrap();
/// let engine = Engine::with_default_rules(&index).unwrap();
///
/// let facts: FactsDocument = serde_json::from_str(r#"{ "candidates": [
///     {"axis": "body_system", "value": "Hepatobiliary System and Pancreas"},
///     {"axis": "root_operation", "value": "Resection"},
///     {"axis": "body_part", "value": "Gallbladder"},
///     {"axis": "approach", "value": "Laparoscopic"},
///     {"axis": "device", "value": "No Device"},
///     {"axis": "qualifier", "value": "No Qualifier"}
/// ] }"#).unwrap();
///
/// let out = engine.resolve(facts.into_facts().unwrap());
/// assert_eq!(out.outcome.code().unwrap().as_str(), "0FT44ZZ");
/// ```
#[derive(Debug, Clone)]
pub struct Engine<'a> {
    index: &'a TableIndex,
    rules: CompiledRules,
    options: Options,
}

impl<'a> Engine<'a> {
    /// Compile `rules` against `index`.
    pub fn new(index: &'a TableIndex, rules: &RuleSet) -> Result<Self, RuleLoadError> {
        Ok(Engine { index, rules: CompiledRules::compile(rules, index)?, options: Options::default() })
    }

    /// Compile the built-in guideline rules against `index`.
    ///
    /// Fails when the tables lack a value the built-in overrides write.
    pub fn with_default_rules(index: &'a TableIndex) -> Result<Self, RuleLoadError> {
        Self::new(index, &DEFAULT_RULES)
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn index(&self) -> &'a TableIndex {
        self.index
    }

    /// Rule ids in evaluation order.
    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.ids()
    }

    /// Select unambiguous candidates, apply the rules, assemble the code.
    pub fn resolve(&self, facts: ProcedureFacts) -> Resolution {
        self.run(facts, false).0
    }

    /// Like [`resolve`](Self::resolve), with a per-rule trace and run counts.
    pub fn resolve_verbose(&self, facts: ProcedureFacts) -> ResolutionVerbose {
        let (resolution, trace, metrics) = self.run(facts, true);
        ResolutionVerbose { resolution, trace, metrics }
    }

    fn run(&self, mut facts: ProcedureFacts, trace: bool) -> (Resolution, Vec<RuleTrace>, RunMetrics) {
        if self.options.auto_select {
            let contested = facts.select_unambiguous();
            if !contested.is_empty() {
                tracing::debug!(contested = ?contested, "candidates disagree");
            }
        }

        let run = engine::Evaluator::new(&self.rules, self.index).run(&mut facts, trace);
        let outcome = Assembler::new(self.index, self.options.device_generalization).assemble(&facts, &run.queries);

        let engine::RunResult { queries, fired, trace, metrics } = run;
        (Resolution { outcome, queries, fired }, trace, metrics)
    }
}

/// One-shot resolution: compile `rules`, resolve `facts`.
///
/// Prefer building an [`Engine`] once when resolving more than one fact set.
pub fn resolve_with(
    index: &TableIndex,
    rules: &RuleSet,
    facts: ProcedureFacts,
    options: Options,
) -> Result<Resolution, RuleLoadError> {
    Ok(Engine::new(index, rules)?.with_options(options).resolve(facts))
}
