//! Reference table index.
//!
//! The index is the single source of truth for validity: a combination of
//! six axis values is a valid Section 0 code iff some `TableRow` carries
//! exactly those (normalized) values.
//!
//! ```text
//! ReferenceData ──build──▶ rows (arena, one per expanded combination)
//!                          ├─ vocab[axis]     name ⇄ Sym, synonyms
//!                          ├─ postings[axis]  Sym → sorted row ids
//!                          └─ by_key          [Sym; 6] → row ids
//! ```
//!
//! Partial lookups intersect the posting lists of the set axes, shortest
//! first. Fully specified lookups go straight to `by_key`. The index is never
//! mutated after `build`, so it can be shared freely between threads.

#[path = "table/reference.rs"]
pub mod reference;
#[path = "table/vocab.rs"]
mod vocab;

pub use vocab::fold;

use crate::error::{LookupError, TableBuildError};
use crate::{Axis, AxisSet, PcsCode, SECTION, is_pcs_char};
use reference::{Label, PcsTable, ReferenceData};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use vocab::{Sym, Term, Vocabulary};

type RowId = usize;

// --- Combination ---------------------------------------------------------------

/// A possibly partial assignment of values to the six axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Combination {
    values: [Option<String>; 6],
}

impl Combination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, axis: Axis, value: impl Into<String>) -> Self {
        self.set(axis, value);
        self
    }

    pub fn set(&mut self, axis: Axis, value: impl Into<String>) {
        self.values[axis.index()] = Some(value.into());
    }

    pub fn clear(&mut self, axis: Axis) {
        self.values[axis.index()] = None;
    }

    pub fn get(&self, axis: Axis) -> Option<&str> {
        self.values[axis.index()].as_deref()
    }

    pub fn is_full(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    pub fn missing(&self) -> AxisSet {
        Axis::ALL.into_iter().filter(|axis| self.get(*axis).is_none()).collect()
    }

    /// Set axes and their values, in code order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &str)> {
        Axis::ALL.into_iter().filter_map(move |axis| self.get(axis).map(|value| (axis, value)))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (axis, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{axis}: \"{value}\"")?;
        }
        f.write_str("}")
    }
}

/// Serializes as a map from axis name to value, set axes only.
impl Serialize for Combination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (axis, value) in self.iter() {
            map.serialize_entry(axis.name(), value)?;
        }
        map.end()
    }
}

// --- Rows ----------------------------------------------------------------------

/// One valid axis combination and its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    values: [String; 6],
    code: PcsCode,
}

impl TableRow {
    pub fn value(&self, axis: Axis) -> &str {
        &self.values[axis.index()]
    }

    pub fn code(&self) -> &PcsCode {
        &self.code
    }

    pub fn combination(&self) -> Combination {
        Axis::ALL.into_iter().fold(Combination::new(), |combo, axis| combo.with(axis, self.value(axis)))
    }
}

// --- Index ---------------------------------------------------------------------

/// Read-only lookup structures over the Section 0 tables.
#[derive(Debug, Default)]
pub struct TableIndex {
    rows: Vec<TableRow>,
    keys: Vec<[Sym; 6]>,
    vocab: [Vocabulary; 6],
    postings: [Vec<Vec<RowId>>; 6],
    by_key: HashMap<[Sym; 6], Vec<RowId>>,
    /// Folded specific device → general device values (canonical, sorted).
    aggregation: HashMap<String, BTreeSet<String>>,
    definitions: HashMap<(Axis, Sym), String>,
    /// Folded index term → code prefixes.
    leads: BTreeMap<String, Vec<String>>,
}

impl TableIndex {
    /// Build the index from parsed reference data.
    ///
    /// Fails on structurally broken tables (blank header text, empty row
    /// axes, characters outside the PCS alphabet). Synonym targets,
    /// aggregation records and definitions that point at unknown values are
    /// dropped with a warning. A key entry listing several values keeps them
    /// all.
    pub fn build(data: &ReferenceData) -> Result<Self, TableBuildError> {
        let mut index = TableIndex::default();

        for table in &data.tables {
            index.add_table(table)?;
        }

        // Entries for the same folded term are merged across sources.
        let mut terms: BTreeMap<(Axis, String), (&str, Vec<&str>)> = BTreeMap::new();
        let keyed = [(Axis::BodyPart, &data.body_part_key), (Axis::Device, &data.device_key)];
        let from_keys = keyed.into_iter().flat_map(|(axis, key)| {
            key.data.iter().flat_map(move |(synonym, targets)| targets.iter().map(move |t| (axis, synonym, t)))
        });
        let from_list = data.synonyms.iter().map(|entry| (entry.axis, &entry.synonym, &entry.canonical));
        for (axis, synonym, target) in from_keys.chain(from_list) {
            let entry = terms.entry((axis, fold(synonym))).or_insert_with(|| (synonym.as_str(), Vec::new()));
            entry.1.push(target.as_str());
        }
        for ((axis, _), (synonym, targets)) in &terms {
            index.add_synonym(*axis, synonym, targets);
        }

        for record in &data.device_aggregation.records {
            match index.vocab[Axis::Device.index()].canonical(&record.general_device) {
                Some(sym) => {
                    let general = index.vocab[Axis::Device.index()].name(sym).to_string();
                    index.aggregation.entry(fold(&record.specific_device)).or_default().insert(general);
                }
                None => tracing::warn!(
                    specific = %record.specific_device,
                    general = %record.general_device,
                    "device aggregation target is not a table value; record dropped"
                ),
            }
        }

        for def in &data.definitions {
            match index.vocab[def.axis.index()].canonical(&def.name) {
                Some(sym) => {
                    index.definitions.insert((def.axis, sym), def.definition.trim().to_string());
                }
                None => tracing::warn!(axis = %def.axis, name = %def.name, "definition for unknown value dropped"),
            }
        }

        for term in &data.index {
            let codes = index.leads.entry(fold(&term.term)).or_default();
            for code in &term.codes {
                let code = code.trim().to_string();
                if !code.is_empty() && !codes.contains(&code) {
                    codes.push(code);
                }
            }
        }

        tracing::info!(
            tables = data.tables.len(),
            rows = index.rows.len(),
            body_parts = index.vocab[Axis::BodyPart.index()].len(),
            devices = index.vocab[Axis::Device.index()].len(),
            synonyms = index.vocab.iter().map(Vocabulary::synonym_count).sum::<usize>(),
            "reference table index built"
        );

        Ok(index)
    }

    fn add_table(&mut self, table: &PcsTable) -> Result<(), TableBuildError> {
        let key = table.key();
        for (label, what) in [(&table.body_system, "body system"), (&table.operation, "root operation")] {
            if label.text.trim().is_empty() {
                return Err(TableBuildError::MissingHeader { table: key, what });
            }
        }
        check_char(&key, Axis::BodySystem, table.body_system.code)?;
        check_char(&key, Axis::RootOperation, table.operation.code)?;

        if let Some(definition) = table.operation.definition.as_deref().filter(|d| !d.trim().is_empty()) {
            let sym = self.vocab[Axis::RootOperation.index()].intern(&table.operation.text);
            self.definitions.entry((Axis::RootOperation, sym)).or_insert_with(|| definition.trim().to_string());
        }

        for row in &table.rows {
            let lists: [(&[Label], Axis); 4] = [
                (row.body_parts.as_slice(), Axis::BodyPart),
                (row.approaches.as_slice(), Axis::Approach),
                (row.devices.as_slice(), Axis::Device),
                (row.qualifiers.as_slice(), Axis::Qualifier),
            ];
            for (labels, axis) in lists {
                if labels.is_empty() {
                    return Err(TableBuildError::EmptyRowAxis { table: key, axis });
                }
                for label in labels {
                    check_char(&key, axis, label.code)?;
                }
            }

            for body_part in &row.body_parts {
                for approach in &row.approaches {
                    for device in &row.devices {
                        for qualifier in &row.qualifiers {
                            self.push_row([
                                &table.body_system,
                                &table.operation,
                                body_part,
                                approach,
                                device,
                                qualifier,
                            ]);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn push_row(&mut self, labels: [&Label; 6]) {
        let mut key = [0 as Sym; 6];
        for axis in Axis::ALL {
            key[axis.index()] = self.vocab[axis.index()].intern(&labels[axis.index()].text);
        }

        let mut chars = [SECTION; 7];
        for axis in Axis::ALL {
            chars[axis.position() - 1] = labels[axis.index()].code;
        }
        // Characters were checked by the caller.
        let Some(code) = PcsCode::from_chars(chars) else {
            return;
        };

        let existing = self.by_key.entry(key).or_default();
        if existing.iter().any(|&id| self.rows[id].code == code) {
            return;
        }

        let id = self.rows.len();
        existing.push(id);
        let values = std::array::from_fn(|i| self.vocab[i].name(key[i]).to_string());
        self.rows.push(TableRow { values, code });
        self.keys.push(key);

        for axis in Axis::ALL {
            let postings = &mut self.postings[axis.index()];
            let sym = key[axis.index()] as usize;
            if postings.len() <= sym {
                postings.resize_with(sym + 1, Vec::new);
            }
            postings[sym].push(id);
        }
    }

    fn add_synonym(&mut self, axis: Axis, synonym: &str, targets: &[&str]) {
        let vocab = &mut self.vocab[axis.index()];
        let mut listed: Vec<String> = Vec::new();
        let mut resolved: Vec<Sym> = Vec::new();
        for target in targets {
            let key = fold(target);
            if listed.contains(&key) {
                continue;
            }
            listed.push(key);
            match vocab.canonical(target) {
                Some(sym) => resolved.push(sym),
                None => tracing::warn!(%axis, %synonym, %target, "synonym target is not a table value; dropped"),
            }
        }

        if resolved.is_empty() {
            return;
        }
        if !vocab.add_synonym(synonym, resolved, listed.len() > 1) {
            tracing::debug!(%axis, %synonym, "synonym is already a canonical value; ignored");
        }
    }

    // --- Queries ---------------------------------------------------------------

    /// Resolve a free-form or synonym name to the canonical table value.
    ///
    /// A key term listing several values is [`LookupError::SeveralValues`];
    /// use [`expand`](Self::expand) for those.
    pub fn normalize(&self, axis: Axis, raw: &str) -> Result<String, LookupError> {
        let vocab = &self.vocab[axis.index()];
        match vocab.term(raw) {
            Some(Term::Canonical(sym) | Term::Synonym(sym)) => Ok(vocab.name(sym).to_string()),
            Some(Term::Several(syms)) => Err(LookupError::SeveralValues {
                axis,
                term: raw.to_string(),
                values: syms.iter().map(|&sym| vocab.name(sym).to_string()).collect(),
            }),
            None => Err(LookupError::UnknownTerm { axis, term: raw.to_string() }),
        }
    }

    /// Every canonical value `raw` can stand for, in key order: one for a
    /// canonical name or plain synonym, all listed values for a key term.
    pub fn expand(&self, axis: Axis, raw: &str) -> Result<Vec<String>, LookupError> {
        let vocab = &self.vocab[axis.index()];
        let term = vocab.term(raw).ok_or_else(|| LookupError::UnknownTerm { axis, term: raw.to_string() })?;
        Ok(term.syms().iter().map(|&sym| vocab.name(sym).to_string()).collect())
    }

    /// True when `raw` is a key term listing several values.
    pub fn is_key_term(&self, axis: Axis, raw: &str) -> bool {
        matches!(self.vocab[axis.index()].term(raw), Some(Term::Several(_)))
    }

    /// Every row consistent with the set axes of `combo`, in table order.
    ///
    /// Values are normalized first; an unknown value matches nothing and a key
    /// term matches a row holding any of its values.
    pub fn lookup(&self, combo: &Combination) -> Vec<&TableRow> {
        self.lookup_ids(combo).into_iter().map(|id| &self.rows[id]).collect()
    }

    fn lookup_ids(&self, combo: &Combination) -> Vec<RowId> {
        let mut terms: [Option<Vec<Sym>>; 6] = Default::default();
        for (axis, value) in combo.iter() {
            match self.vocab[axis.index()].term(value) {
                Some(term) => terms[axis.index()] = Some(term.syms().to_vec()),
                None => return Vec::new(),
            }
        }

        if terms.iter().all(|t| matches!(t.as_deref(), Some([_]))) {
            let key: [Sym; 6] = std::array::from_fn(|i| terms[i].as_deref().map_or(0, |syms| syms[0]));
            return self.by_key.get(&key).cloned().unwrap_or_default();
        }

        let mut lists: Vec<Cow<'_, [RowId]>> = Vec::new();
        for axis in Axis::ALL {
            let list = match terms[axis.index()].as_deref() {
                None => continue,
                Some([sym]) => Cow::Borrowed(self.postings_for(axis, *sym)),
                Some(syms) => Cow::Owned(
                    syms.iter()
                        .flat_map(|&sym| self.postings_for(axis, sym).iter().copied())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect(),
                ),
            };
            if list.is_empty() {
                return Vec::new();
            }
            lists.push(list);
        }

        if lists.is_empty() {
            return (0..self.rows.len()).collect();
        }

        lists.sort_by_key(|list| list.len());
        let mut result: Vec<RowId> = lists[0].to_vec();
        for list in &lists[1..] {
            result = intersect_sorted(&result, list);
            if result.is_empty() {
                break;
            }
        }
        result
    }

    fn postings_for(&self, axis: Axis, sym: Sym) -> &[RowId] {
        self.postings[axis.index()].get(sym as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The seven code characters for an exact, fully specified combination.
    ///
    /// Values must be canonical table values (case and spacing aside); synonyms
    /// are not resolved here.
    pub fn characters_for(&self, combo: &Combination) -> Result<[char; 7], LookupError> {
        let missing = combo.missing();
        if !missing.is_empty() {
            return Err(LookupError::Incomplete { missing });
        }

        let mut key = [0 as Sym; 6];
        for (axis, value) in combo.iter() {
            key[axis.index()] = self.vocab[axis.index()]
                .canonical(value)
                .ok_or_else(|| LookupError::NoSuchRow { attempted: combo.clone() })?;
        }

        match self.by_key.get(&key).map(Vec::as_slice) {
            None | Some([]) => Err(LookupError::NoSuchRow { attempted: combo.clone() }),
            Some([id]) => Ok(self.rows[*id].code.chars()),
            Some(ids) => Err(LookupError::AmbiguousRow {
                attempted: combo.clone(),
                codes: ids.iter().map(|&id| self.rows[id].code.clone()).collect(),
            }),
        }
    }

    /// Distinct values `axis` can still take given the other set axes of
    /// `combo`, sorted by name. Whatever `combo` holds for `axis` itself is
    /// ignored.
    pub fn options(&self, axis: Axis, combo: &Combination) -> Vec<String> {
        let mut partial = combo.clone();
        partial.clear(axis);
        let syms: BTreeSet<Sym> =
            self.lookup_ids(&partial).into_iter().map(|id| self.keys[id][axis.index()]).collect();
        let vocab = &self.vocab[axis.index()];
        let mut names: Vec<String> = syms.into_iter().map(|sym| vocab.name(sym).to_string()).collect();
        names.sort();
        names
    }

    /// General device values that a specific device rolls up to, sorted.
    pub fn generalize_device(&self, device: &str) -> Vec<String> {
        self.aggregation.get(&fold(device)).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Official definition of a value, if the reference data carries one.
    pub fn definition(&self, axis: Axis, name: &str) -> Option<&str> {
        let sym = self.vocab[axis.index()].resolve(name)?;
        self.definitions.get(&(axis, sym)).map(String::as_str)
    }

    /// Code prefixes the alphabetic index lists for `term`.
    pub fn leads(&self, term: &str) -> &[String] {
        self.leads.get(&fold(term)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Canonical values of `axis`, in first-seen order.
    pub fn vocabulary(&self, axis: Axis) -> &[String] {
        self.vocab[axis.index()].names()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn check_char(table: &str, axis: Axis, c: char) -> Result<(), TableBuildError> {
    if is_pcs_char(c) {
        Ok(())
    } else {
        Err(TableBuildError::InvalidCharacter { table: table.to_string(), position: axis.position(), character: c })
    }
}

fn intersect_sorted(a: &[RowId], b: &[RowId]) -> Vec<RowId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
