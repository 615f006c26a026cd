use crate::rules::guidelines::default_rules;
use crate::{Action, Axis, Condition, ProcedureFlags, RuleLoadError, RuleSet};
use serde_json::json;

#[test]
fn default_rules_are_well_formed() {
    let rules = default_rules();
    rules.check().unwrap();

    let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(&ids[..3], &["B5.2", "B6.1a", "B6.1b"]);
    assert!(ids.contains(&"A8-device"));
    assert!(ids.contains(&"A8-contested-body-part"));
    assert_eq!(ids.iter().filter(|id| id.starts_with("A8-contested-")).count(), 6);
}

#[test]
fn overrides_are_declared_before_completeness_queries() {
    let rules = default_rules();
    let last_override = rules.rules.iter().rposition(|r| matches!(r.action, Action::OverrideAxis { .. })).unwrap();
    let first_a8 = rules.rules.iter().position(|r| r.id.starts_with("A8")).unwrap();
    assert!(last_override < first_a8);
}

#[test]
fn loads_rules_from_json() {
    let doc = json!({
        "rules": [
            {
                "id": "B5.2",
                "condition": { "kind": "flag", "flag": "converted_to_open" },
                "action": { "kind": "override_axis", "axis": "approach", "value": "Open" }
            },
            {
                "id": "drain-query",
                "condition": {
                    "kind": "all",
                    "of": [
                        { "kind": "flag", "flag": ["drain_placed"] },
                        { "kind": "not", "condition": { "kind": "axis_set", "axis": "Device" } }
                    ]
                },
                "action": { "kind": "emit_query", "query_id": "B6", "axis": "device", "message": "Drain?" }
            }
        ]
    });

    let set = RuleSet::from_json_str(&doc.to_string()).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.rules[0].condition, Condition::flag(ProcedureFlags::CONVERTED_TO_OPEN));
    assert_eq!(
        set.rules[1].condition,
        Condition::all([
            Condition::flag(ProcedureFlags::DRAIN_PLACED),
            Condition::not(Condition::axis_set(Axis::Device)),
        ])
    );
    assert_eq!(set.rules[1].action, query!("B6", Axis::Device, "Drain?"));
}

#[test]
fn serialized_rules_load_back() {
    let rules = default_rules();
    let json = serde_json::to_string(&rules).unwrap();
    assert_eq!(RuleSet::from_json_str(&json).unwrap(), rules);
}

#[test]
fn rejects_unknown_kinds_axes_and_flags() {
    let cases = [
        json!({"rules": [{"id": "x", "condition": {"kind": "regex", "pattern": ".*"},
            "action": {"kind": "override_axis", "axis": "device", "value": "No Device"}}]}),
        json!({"rules": [{"id": "x", "condition": {"kind": "axis_set", "axis": "laterality"},
            "action": {"kind": "override_axis", "axis": "device", "value": "No Device"}}]}),
        json!({"rules": [{"id": "x", "condition": {"kind": "flag", "flag": "robotic"},
            "action": {"kind": "override_axis", "axis": "device", "value": "No Device"}}]}),
    ];
    for case in cases {
        assert!(matches!(RuleSet::from_json_str(&case.to_string()), Err(RuleLoadError::Parse(_))), "{case}");
    }
}

#[test]
fn rejects_duplicate_and_empty_ids() {
    let rule = json!({"id": "A", "condition": {"kind": "always"},
        "action": {"kind": "emit_query", "query_id": "A8", "axis": "device", "message": "?"}});

    let dup = json!({ "rules": [rule.clone(), rule.clone()] });
    assert!(matches!(RuleSet::from_json_str(&dup.to_string()), Err(RuleLoadError::DuplicateId(id)) if id == "A"));

    let mut blank = rule.clone();
    blank["id"] = json!("  ");
    let doc = json!({ "rules": [rule, blank] });
    assert!(matches!(RuleSet::from_json_str(&doc.to_string()), Err(RuleLoadError::EmptyId { position: 1 })));
}

#[test]
fn rejects_empty_composites_and_blank_text() {
    let empty_any = RuleSet::new(vec![guideline! {
        id: "x",
        when: Condition::not(Condition::any(Vec::new())),
        then: Action::override_axis(Axis::Device, "No Device"),
    }]);
    assert!(matches!(empty_any.check(), Err(RuleLoadError::EmptyField { field: "any", .. })));

    let empty_in = RuleSet::new(vec![guideline! {
        id: "x",
        when: Condition::axis_in(Axis::Approach, Vec::<String>::new()),
        then: Action::override_axis(Axis::Device, "No Device"),
    }]);
    assert!(matches!(empty_in.check(), Err(RuleLoadError::EmptyField { field: "axis_in values", .. })));

    let blank_override = RuleSet::new(vec![guideline! {
        id: "x",
        when: Condition::Always,
        then: Action::override_axis(Axis::Device, " "),
    }]);
    assert!(matches!(blank_override.check(), Err(RuleLoadError::EmptyField { field: "override value", .. })));
}
