//! Per-axis vocabulary.
//!
//! Every distinct canonical value seen in the tables is interned to a `Sym`
//! (an index into `names`). Lookups go through folded keys so that case and
//! whitespace differences in upstream input do not matter. Synonyms resolve to
//! an existing symbol; they never introduce new canonical values.
//!
//! ## Invariants
//!
//! - `names[sym]` is the first spelling seen for that folded key.
//! - A folded key is in at most one of `by_key` and `synonyms`; canonical keys
//!   take precedence, which keeps normalization a fixed point on canonical
//!   names.
//! - A key term listing several values keeps all of them. It never resolves
//!   to a single symbol; callers expand it and try each value.

use std::collections::HashMap;

pub(crate) type Sym = u32;

/// Fold a name for comparison: trim, collapse internal whitespace, lowercase.
pub fn fold(name: &str) -> String {
    regex!(r"\s+").replace_all(name.trim(), " ").to_lowercase()
}

/// How a raw name maps onto the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Term<'a> {
    Canonical(Sym),
    Synonym(Sym),
    /// A key term for several values, in key order.
    Several(&'a [Sym]),
}

impl Term<'_> {
    pub fn syms(&self) -> &[Sym] {
        match self {
            Term::Canonical(sym) | Term::Synonym(sym) => std::slice::from_ref(sym),
            Term::Several(syms) => syms,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Vocabulary {
    names: Vec<String>,
    by_key: HashMap<String, Sym>,
    synonyms: HashMap<String, KeyTerm>,
}

#[derive(Debug)]
struct KeyTerm {
    targets: Vec<Sym>,
    /// The key listed more than one value, even if fewer are in the tables.
    several: bool,
}

impl Vocabulary {
    /// Intern `name`, returning the existing symbol when the folded key is
    /// already known.
    pub fn intern(&mut self, name: &str) -> Sym {
        let key = fold(name);
        if let Some(&sym) = self.by_key.get(&key) {
            return sym;
        }
        let sym = self.names.len() as Sym;
        self.names.push(name.trim().to_string());
        // A later canonical spelling shadows a synonym with the same key.
        self.synonyms.remove(&key);
        self.by_key.insert(key, sym);
        sym
    }

    /// Register `synonym` for existing canonical symbols. With `several`
    /// (the key listed more than one value) the synonym becomes a
    /// [`Term::Several`] even when only one target is known.
    ///
    /// Returns `false` when the synonym folds to a canonical name (the
    /// canonical value wins and the synonym is ignored) or has no targets.
    pub fn add_synonym(&mut self, synonym: &str, targets: Vec<Sym>, several: bool) -> bool {
        let key = fold(synonym);
        if key.is_empty() || targets.is_empty() || self.by_key.contains_key(&key) {
            return false;
        }
        let several = several || targets.len() > 1;
        self.synonyms.insert(key, KeyTerm { targets, several });
        true
    }

    /// Canonical match only.
    pub fn canonical(&self, raw: &str) -> Option<Sym> {
        self.by_key.get(&fold(raw)).copied()
    }

    /// Canonical match, then synonym match.
    pub fn term(&self, raw: &str) -> Option<Term<'_>> {
        let key = fold(raw);
        if let Some(&sym) = self.by_key.get(&key) {
            return Some(Term::Canonical(sym));
        }
        let entry = self.synonyms.get(&key)?;
        match entry.targets.as_slice() {
            [sym] if !entry.several => Some(Term::Synonym(*sym)),
            targets => Some(Term::Several(targets)),
        }
    }

    /// The single symbol `raw` stands for. `None` for unknown names and for
    /// key terms with several values.
    pub fn resolve(&self, raw: &str) -> Option<Sym> {
        match self.term(raw)? {
            Term::Canonical(sym) | Term::Synonym(sym) => Some(sym),
            Term::Several(_) => None,
        }
    }

    pub fn name(&self, sym: Sym) -> &str {
        &self.names[sym as usize]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn synonym_count(&self) -> usize {
        self.synonyms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_ignores_case_and_spacing() {
        assert_eq!(fold("  Coronary   Artery,\tOne Artery "), "coronary artery, one artery");
        assert_eq!(fold("No Device"), fold("no device"));
    }

    #[test]
    fn intern_is_stable_and_keeps_first_spelling() {
        let mut vocab = Vocabulary::default();
        let a = vocab.intern("Gallbladder");
        let b = vocab.intern("GALLBLADDER");
        assert_eq!(a, b);
        assert_eq!(vocab.name(a), "Gallbladder");
        assert_eq!(vocab.len(), 1);
    }

    #[test]
    fn canonical_names_win_over_synonyms() {
        let mut vocab = Vocabulary::default();
        let open = vocab.intern("Open");
        let endo = vocab.intern("Percutaneous Endoscopic");

        assert!(vocab.add_synonym("Laparoscopic", vec![endo], false));
        assert!(!vocab.add_synonym("open", vec![endo], false));

        assert_eq!(vocab.resolve("laparoscopic"), Some(endo));
        assert_eq!(vocab.canonical("laparoscopic"), None);
        assert_eq!(vocab.resolve("OPEN"), Some(open));
        assert_eq!(vocab.resolve("external"), None);
    }

    #[test]
    fn later_canonical_shadows_synonym() {
        let mut vocab = Vocabulary::default();
        let endo = vocab.intern("Percutaneous Endoscopic");
        vocab.add_synonym("Endoscopic", vec![endo], false);
        let endoscopic = vocab.intern("Endoscopic");

        assert_eq!(vocab.resolve("endoscopic"), Some(endoscopic));
        assert_eq!(vocab.synonym_count(), 0);
    }

    #[test]
    fn several_targets_expand_but_do_not_resolve() {
        let mut vocab = Vocabulary::default();
        let right = vocab.intern("Knee Joint, Right");
        let left = vocab.intern("Knee Joint, Left");
        assert!(vocab.add_synonym("Knee", vec![right, left], false));
        assert!(vocab.add_synonym("Knee joint", vec![right], true));
        assert!(!vocab.add_synonym("Elbow", Vec::new(), true));

        assert_eq!(vocab.resolve("knee"), None);
        assert_eq!(vocab.term("knee").map(|t| t.syms().to_vec()), Some(vec![right, left]));
        assert_eq!(vocab.term("knee joint, left"), Some(Term::Canonical(left)));
        // Only one of the listed values is known; it is still not a plain synonym.
        assert_eq!(vocab.resolve("knee joint"), None);
        assert_eq!(vocab.term("knee joint"), Some(Term::Several(&[right])));
    }
}
