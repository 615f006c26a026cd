//! Built-in Section 0 coding guidelines.
//!
//! Declared in evaluation order. Overrides come first so that the
//! completeness queries at the end see the corrected selections; a rule that
//! fills an axis (B6.2, B3.4a) therefore suppresses the A8 query for it.
//! Overrides that pick a table value check the tables first, so a value the
//! current combination cannot take is left for the caller to settle.

use crate::{Action, Axis, Condition, ProcedureFlags, RuleSet};

const DRAIN_INTEGRAL: &str = "A drain placed at the end of the procedure is integral to the primary procedure \
     and is not coded as a separate Insertion; confirm the primary root operation";
const DISCONTINUED: &str = "Procedure was discontinued; document the root operation actually performed";
const UNICONDYLAR: &str = "Unicondylar replacement: document whether the medial or lateral compartment was replaced";

/// The built-in guideline rules.
pub fn default_rules() -> RuleSet {
    use Axis::*;

    let mut rules = vec![
        // Converted to open: code the open approach.
        guideline! {
            id: "B5.2",
            when: Condition::flag(ProcedureFlags::CONVERTED_TO_OPEN),
            then: Action::override_axis(Approach, "Open"),
        },
        // No device remains at the end of the procedure.
        guideline! {
            id: "B6.1a",
            when: Condition::flag(ProcedureFlags::NO_DEVICE_LEFT),
            then: Action::override_axis(Device, "No Device"),
        },
        guideline! {
            id: "B6.1b",
            when: Condition::all([
                Condition::flag(ProcedureFlags::DRAIN_PLACED),
                Condition::not(Condition::flag(ProcedureFlags::DISTINCT_DRAINAGE)),
                Condition::axis_is(RootOperation, "Insertion"),
                Condition::axis_is(Device, "Drainage Device"),
            ]),
            then: query!("B6.1b", RootOperation, DRAIN_INTEGRAL),
        },
        guideline! {
            id: "B6.2",
            when: Condition::all([
                Condition::flag(ProcedureFlags::DRAIN_PLACED | ProcedureFlags::DISTINCT_DRAINAGE),
                Condition::not(Condition::flag(ProcedureFlags::NO_DEVICE_LEFT)),
                Condition::axis_unset(Device),
            ]),
            then: Action::override_axis(Device, "Drainage Device"),
        },
        guideline! {
            id: "B3.4a",
            when: Condition::all([
                Condition::flag(ProcedureFlags::BIOPSY),
                Condition::axis_unset(Qualifier),
                Condition::value_possible(Qualifier, "Diagnostic"),
            ]),
            then: Action::override_axis(Qualifier, "Diagnostic"),
        },
        // Excision down to the fascia is open and coded in Subcutaneous Tissue and Fascia.
        // The approach goes first: the body system check needs it.
        guideline! {
            id: "B3.5-approach",
            when: Condition::flag(ProcedureFlags::DOWN_TO_FASCIA),
            then: Action::override_axis(Approach, "Open"),
        },
        guideline! {
            id: "B3.5",
            when: Condition::all([
                Condition::flag(ProcedureFlags::DOWN_TO_FASCIA),
                Condition::value_possible(BodySystem, "Subcutaneous Tissue and Fascia"),
            ]),
            then: Action::override_axis(BodySystem, "Subcutaneous Tissue and Fascia"),
        },
        guideline! {
            id: "CEMENTED",
            when: Condition::all([
                Condition::flag(ProcedureFlags::CEMENTED),
                Condition::axis_is(RootOperation, "Replacement"),
                Condition::value_possible(Qualifier, "Cemented"),
            ]),
            then: Action::override_axis(Qualifier, "Cemented"),
        },
        guideline! {
            id: "UNICONDYLAR",
            when: Condition::all([
                Condition::flag(ProcedureFlags::UNICONDYLAR),
                Condition::axis_is(RootOperation, "Replacement"),
            ]),
            then: query!("UNICONDYLAR", Device, UNICONDYLAR),
        },
        guideline! {
            id: "B3.3",
            when: Condition::all([
                Condition::flag(ProcedureFlags::DISCONTINUED),
                Condition::axis_unset(RootOperation),
            ]),
            then: query!("B3.3", RootOperation, DISCONTINUED),
        },
        guideline! {
            id: "A8-root-operation",
            when: Condition::axis_unset(RootOperation),
            then: query!("A8", RootOperation, "Root operation not documented; specify the procedure objective"),
        },
        guideline! {
            id: "A8-body-part",
            when: Condition::axis_unset(BodyPart),
            then: query!("A8", BodyPart, "Body part not documented; specify the site of the procedure"),
        },
        guideline! {
            id: "A8-approach",
            when: Condition::axis_unset(Approach),
            then: query!("A8", Approach, "Approach not documented; specify how the site was reached"),
        },
        guideline! {
            id: "A8-device",
            when: Condition::all([Condition::axis_is(RootOperation, "Bypass"), Condition::axis_unset(Device)]),
            then: query!("A8", Device, "Bypass without a documented device; specify device or no device"),
        },
    ];

    rules.extend(Axis::ALL.into_iter().map(|axis| {
        guideline! {
            id: format!("A8-contested-{}", axis.name().replace('_', "-")),
            when: Condition::contested(axis),
            then: query!(
                "A8-contested",
                axis,
                format!(
                    "Conflicting {} values were documented; confirm which one applies",
                    axis.title().to_lowercase()
                ),
            ),
        }
    }));

    RuleSet::new(rules)
}
