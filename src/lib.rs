extern crate self as pcs_engine;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[macro_use]
mod macros;
mod api;
mod assemble;
mod engine;
mod error;
mod facts;
mod rules;
mod table;

#[cfg(test)]
mod fixtures;

pub use api::{DEFAULT_RULES, Engine, Options, Resolution, ResolutionVerbose, resolve_with};
pub use assemble::{InvalidReason, Outcome, ProvenanceEntry, Source, Superseded};
pub use engine::{RuleStatus, RuleTrace, RunMetrics};
pub use error::{InputError, LookupError, RuleLoadError, TableBuildError};
pub use facts::{FactsDocument, ProcedureFacts, RawCandidate, Selection};
pub use rules::guidelines::default_rules;
pub use rules::{Action, Condition, GuidelineRule, RuleSet};
pub use table::reference::{
    AggregationRecord, Definition, DeviceAggregation, IndexTerm, Label, PcsRow, PcsTable, ReferenceData, SynonymEntry,
    SynonymKey,
};
pub use table::{Combination, TableIndex, TableRow, fold};

/// The only section this engine codes: Medical and Surgical.
pub const SECTION: char = '0';

// --- Axes --------------------------------------------------------------------

/// One coding axis. Axis order is code order: `BodySystem` is character 2,
/// `Qualifier` is character 7. The section (character 1) is the constant
/// [`SECTION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    #[serde(alias = "BodySystem")]
    BodySystem,
    #[serde(alias = "RootOperation")]
    RootOperation,
    #[serde(alias = "BodyPart")]
    BodyPart,
    #[serde(alias = "Approach")]
    Approach,
    #[serde(alias = "Device")]
    Device,
    #[serde(alias = "Qualifier")]
    Qualifier,
}

impl Axis {
    pub const ALL: [Axis; 6] =
        [Axis::BodySystem, Axis::RootOperation, Axis::BodyPart, Axis::Approach, Axis::Device, Axis::Qualifier];

    /// Zero-based slot in per-axis arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// One-based character position in the final code.
    pub fn position(self) -> usize {
        self as usize + 2
    }

    /// Snake-case name used in config and input files.
    pub fn name(self) -> &'static str {
        match self {
            Axis::BodySystem => "body_system",
            Axis::RootOperation => "root_operation",
            Axis::BodyPart => "body_part",
            Axis::Approach => "approach",
            Axis::Device => "device",
            Axis::Qualifier => "qualifier",
        }
    }

    /// Title used by the official tables, e.g. `"Body Part"`.
    pub fn title(self) -> &'static str {
        match self {
            Axis::BodySystem => "Body System",
            Axis::RootOperation => "Root Operation",
            Axis::BodyPart => "Body Part",
            Axis::Approach => "Approach",
            Axis::Device => "Device",
            Axis::Qualifier => "Qualifier",
        }
    }

    pub fn bit(self) -> AxisSet {
        match self {
            Axis::BodySystem => AxisSet::BODY_SYSTEM,
            Axis::RootOperation => AxisSet::ROOT_OPERATION,
            Axis::BodyPart => AxisSet::BODY_PART,
            Axis::Approach => AxisSet::APPROACH,
            Axis::Device => AxisSet::DEVICE,
            Axis::Qualifier => AxisSet::QUALIFIER,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Accepts `BodySystem`, `body_system`, `body system` and `body-system`,
/// case-insensitively. `Section` is not an axis a caller can set.
impl FromStr for Axis {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String =
            s.trim().chars().filter(|c| !matches!(c, ' ' | '_' | '-')).map(|c| c.to_ascii_lowercase()).collect();
        match key.as_str() {
            "bodysystem" => Ok(Axis::BodySystem),
            "rootoperation" | "operation" => Ok(Axis::RootOperation),
            "bodypart" => Ok(Axis::BodyPart),
            "approach" => Ok(Axis::Approach),
            "device" => Ok(Axis::Device),
            "qualifier" => Ok(Axis::Qualifier),
            _ => Err(InputError::UnknownAxis(s.to_string())),
        }
    }
}

bitflags::bitflags! {
    /// A set of axes, e.g. the axes still missing a selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisSet: u8 {
        const BODY_SYSTEM    = 1 << 0;
        const ROOT_OPERATION = 1 << 1;
        const BODY_PART      = 1 << 2;
        const APPROACH       = 1 << 3;
        const DEVICE         = 1 << 4;
        const QUALIFIER      = 1 << 5;
    }
}

impl AxisSet {
    /// Axes in the set, in code order.
    pub fn axes(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |axis| self.contains(axis.bit()))
    }

    pub fn has(self, axis: Axis) -> bool {
        self.contains(axis.bit())
    }
}

impl FromIterator<Axis> for AxisSet {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        iter.into_iter().fold(AxisSet::empty(), |set, axis| set | axis.bit())
    }
}

impl Serialize for AxisSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.bits().count_ones() as usize))?;
        for axis in self.axes() {
            seq.serialize_element(&axis)?;
        }
        seq.end()
    }
}

// --- Candidates --------------------------------------------------------------

/// Where a candidate value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Produced by the extraction collaborator (AI or heuristics).
    Extracted,
    /// Chosen by a person.
    User,
    /// Written by a guideline rule.
    RuleDerived,
}

/// A value proposed for one axis, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisCandidate {
    pub axis: Axis,
    pub value: String,
    pub confidence: Confidence,
    /// Free-form note about the origin (`"ai"`, `"manual"`, a rule id, ...).
    pub origin: String,
    /// Id of the rule that wrote this candidate, for `RuleDerived` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl AxisCandidate {
    pub fn extracted(axis: Axis, value: impl Into<String>) -> Self {
        Self { axis, value: value.into(), confidence: Confidence::Extracted, origin: "extracted".into(), rule: None }
    }

    pub fn user(axis: Axis, value: impl Into<String>) -> Self {
        Self { axis, value: value.into(), confidence: Confidence::User, origin: "user".into(), rule: None }
    }

    pub(crate) fn rule_derived(axis: Axis, value: impl Into<String>, rule_id: &str) -> Self {
        Self {
            axis,
            value: value.into(),
            confidence: Confidence::RuleDerived,
            origin: format!("rule {rule_id}"),
            rule: Some(rule_id.to_string()),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

bitflags::bitflags! {
    /// Boolean documentation facts reported by the extraction collaborator
    /// next to the axis candidates. Guideline rules test them with
    /// [`Condition::Flag`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProcedureFlags: u16 {
        const BIOPSY            = 1 << 0;
        const ABORTED           = 1 << 1;
        const DISCONTINUED      = 1 << 2;
        const CONVERTED_TO_OPEN = 1 << 3;
        const DRAIN_PLACED      = 1 << 4;
        const DISTINCT_DRAINAGE = 1 << 5;
        const NO_DEVICE_LEFT    = 1 << 6;
        const HEMOSTASIS        = 1 << 7;
        const BILATERAL         = 1 << 8;
        const EMBOLIZATION      = 1 << 9;
        const UNICONDYLAR       = 1 << 10;
        const CEMENTED          = 1 << 11;
        const DOWN_TO_FASCIA    = 1 << 12;
    }
}

impl ProcedureFlags {
    /// Look up one flag by its snake-case name (`"converted_to_open"`).
    /// Dashes and spaces are accepted in place of underscores.
    pub fn parse_name(name: &str) -> Option<Self> {
        let upper: String =
            name.trim().chars().map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_uppercase() }).collect();
        if upper.is_empty() {
            return None;
        }
        Self::from_name(&upper)
    }

    /// Parse a list of flag names; fails on the first unknown name.
    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Self, InputError> {
        names.iter().try_fold(Self::empty(), |acc, name| {
            Self::parse_name(name.as_ref())
                .map(|flag| acc | flag)
                .ok_or_else(|| InputError::UnknownFlag(name.as_ref().to_string()))
        })
    }

    /// Snake-case names of the flags in this set, in declaration order.
    pub fn names(self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_ascii_lowercase()).collect()
    }
}

impl Serialize for ProcedureFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// Accepts a single name (`"biopsy"`) or a list of names.
impl<'de> Deserialize<'de> for ProcedureFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }

        let names = match Repr::deserialize(deserializer)? {
            Repr::One(name) => vec![name],
            Repr::Many(names) => names,
        };
        ProcedureFlags::parse_names(&names).map_err(de::Error::custom)
    }
}

// --- Outputs -----------------------------------------------------------------

/// A request for more documentation before an axis can be coded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentationQuery {
    pub id: String,
    pub axis: Axis,
    pub message: String,
}

/// A validated Section 0 code: `0` followed by six characters from the PCS
/// alphabet (digits and capital letters except `I` and `O`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PcsCode(String);

impl PcsCode {
    /// Build a code from the section character followed by the six axis
    /// characters. Returns `None` if any character is outside the alphabet.
    pub fn from_chars(chars: [char; 7]) -> Option<Self> {
        let code: String = chars.iter().collect();
        code.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Character for `axis` (positions 2..=7).
    pub fn char_at(&self, axis: Axis) -> char {
        self.0.as_bytes()[axis.position() - 1] as char
    }

    pub fn chars(&self) -> [char; 7] {
        let mut out = [SECTION; 7];
        for (slot, c) in out.iter_mut().zip(self.0.chars()) {
            *slot = c;
        }
        out
    }
}

/// PCS characters are `0-9` and `A-Z` without `I` and `O`.
pub(crate) fn is_pcs_char(c: char) -> bool {
    c.is_ascii_digit() || (c.is_ascii_uppercase() && c != 'I' && c != 'O')
}

impl FromStr for PcsCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if regex!(r"^0[0-9A-HJ-NP-Z]{6}$").is_match(s) {
            Ok(PcsCode(s.to_string()))
        } else {
            Err(format!("'{s}' is not a Section 0 ICD-10-PCS code"))
        }
    }
}

impl fmt::Display for PcsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PcsCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_parses_common_spellings() {
        for raw in ["BodySystem", "body_system", "Body System", "body-system", "BODY_SYSTEM"] {
            assert_eq!(raw.parse::<Axis>().unwrap(), Axis::BodySystem, "{raw}");
        }
        assert_eq!("root operation".parse::<Axis>().unwrap(), Axis::RootOperation);
        assert_eq!("Section".parse::<Axis>(), Err(InputError::UnknownAxis("Section".into())));
        assert!("laterality".parse::<Axis>().is_err());
    }

    #[test]
    fn axis_positions_follow_code_order() {
        let positions: Vec<usize> = Axis::ALL.iter().map(|a| a.position()).collect();
        assert_eq!(positions, vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn axis_set_iterates_in_code_order() {
        let set: AxisSet = [Axis::Qualifier, Axis::BodySystem, Axis::Device].into_iter().collect();
        assert_eq!(set.axes().collect::<Vec<_>>(), vec![Axis::BodySystem, Axis::Device, Axis::Qualifier]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["body_system","device","qualifier"]"#);
    }

    #[test]
    fn flags_parse_and_print_snake_case() {
        let flags = ProcedureFlags::parse_names(&["biopsy", "converted-to-open"]).unwrap();
        assert_eq!(flags, ProcedureFlags::BIOPSY | ProcedureFlags::CONVERTED_TO_OPEN);
        assert_eq!(flags.names(), vec!["biopsy".to_string(), "converted_to_open".to_string()]);
        assert_eq!(ProcedureFlags::parse_names(&["laser"]), Err(InputError::UnknownFlag("laser".into())));

        let one: ProcedureFlags = serde_json::from_str(r#""drain_placed""#).unwrap();
        assert_eq!(one, ProcedureFlags::DRAIN_PLACED);
        assert!(serde_json::from_str::<ProcedureFlags>(r#"["drain_placed", "nope"]"#).is_err());
    }

    #[test]
    fn pcs_code_rejects_letters_outside_alphabet() {
        assert!("0FT44ZZ".parse::<PcsCode>().is_ok());
        assert!("0FT44ZO".parse::<PcsCode>().is_err());
        assert!("1FT44ZZ".parse::<PcsCode>().is_err());
        assert!("0FT44Z".parse::<PcsCode>().is_err());

        let code = PcsCode::from_chars(['0', 'F', 'T', '4', '4', 'Z', 'Z']).unwrap();
        assert_eq!(code.char_at(Axis::BodyPart), '4');
        assert_eq!(code.chars(), ['0', 'F', 'T', '4', '4', 'Z', 'Z']);
        assert!(PcsCode::from_chars(['0', 'F', 'T', '4', '4', 'Z', 'I']).is_none());
    }
}
