use once_cell::sync::Lazy;
use pcs_engine::{
    Axis, AxisSet, Confidence, Engine, FactsDocument, InvalidReason, Outcome, ProcedureFacts, RawCandidate,
    ReferenceData, Resolution, Source, TableIndex,
};
use serde_json::json;

static INDEX: Lazy<TableIndex> = Lazy::new(|| {
    let data = ReferenceData::from_json_str(include_str!("data/reference.json")).unwrap();
    TableIndex::build(&data).unwrap()
});

fn engine() -> Engine<'static> {
    Engine::with_default_rules(&INDEX).unwrap()
}

fn facts(candidates: &[(&str, &str)], flags: &[&str]) -> ProcedureFacts {
    FactsDocument {
        candidates: candidates.iter().map(|(axis, value)| RawCandidate::new(*axis, *value, "ai")).collect(),
        flags: flags.iter().map(|f| f.to_string()).collect(),
        selections: Vec::new(),
    }
    .into_facts()
    .unwrap()
}

fn resolve(candidates: &[(&str, &str)], flags: &[&str]) -> Resolution {
    engine().resolve(facts(candidates, flags))
}

const BYPASS: [(&str, &str); 6] = [
    ("body_system", "Cardiovascular"),
    ("root_operation", "Bypass"),
    ("body_part", "Coronary Artery, One Site"),
    ("approach", "Open"),
    ("device", "Autologous Tissue Substitute"),
    ("qualifier", "Coronary Artery"),
];

fn without<'a>(axis: &str, candidates: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    candidates.iter().copied().filter(|(a, _)| *a != axis).collect()
}

fn with<'a>(axis: &'a str, value: &'a str, candidates: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut out = without(axis, candidates);
    out.push((axis, value));
    out
}

#[test]
fn coronary_bypass_resolves_to_table_code() {
    let out = resolve(&BYPASS, &[]);
    assert_eq!(out.outcome.code().unwrap().as_str(), "0210073");
    assert!(out.queries.is_empty());
    assert!(!out.fired.iter().any(|id| id == "A8-device"));
}

#[test]
fn bypass_without_device_asks_once() {
    let out = resolve(&without("device", &BYPASS), &[]);

    match &out.outcome {
        Outcome::Incomplete { missing, queries, options } => {
            assert_eq!(*missing, AxisSet::DEVICE);
            assert_eq!(queries.len(), 1);
            assert_eq!(queries[0].id, "A8");
            assert_eq!(queries[0].axis, Axis::Device);
            assert_eq!(
                options[&Axis::Device],
                vec![
                    "Autologous Arterial Tissue",
                    "Autologous Tissue Substitute",
                    "Autologous Venous Tissue",
                    "No Device",
                ]
            );
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
    assert_eq!(out.fired.iter().filter(|id| *id == "A8-device").count(), 1);
    assert_eq!(out.queries.len(), 1);
}

#[test]
fn unknown_device_term_is_invalid() {
    let out = resolve(&with("device", "Flux Capacitor", &BYPASS), &[]);
    match out.outcome {
        Outcome::Invalid { axis, reason, attempted } => {
            assert_eq!(axis, Some(Axis::Device));
            assert_eq!(reason, InvalidReason::UnknownTerm);
            assert_eq!(attempted.get(Axis::Device), Some("Flux Capacitor"));
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn device_key_synonym_resolves() {
    let out = resolve(&with("device", "Saphenous vein graft", &BYPASS), &[]);
    assert_eq!(out.outcome.code().unwrap().as_str(), "0210093");
}

struct Case {
    flags: &'static [&'static str],
    candidates: &'static [(&'static str, &'static str)],
    code: &'static str,
    fired: &'static [&'static str],
}

#[test]
fn guideline_scenarios() {
    let cases = [
        Case {
            flags: &["converted_to_open"],
            candidates: &[
                ("body_system", "Hepatobiliary System and Pancreas"),
                ("root_operation", "Resection"),
                ("body_part", "Gall bladder"),
                ("approach", "Laparoscopic"),
                ("device", "No Device"),
                ("qualifier", "No Qualifier"),
            ],
            code: "0FT40ZZ",
            fired: &["B5.2"],
        },
        Case {
            flags: &["biopsy"],
            candidates: &[
                ("body_system", "Hepatobiliary System and Pancreas"),
                ("root_operation", "Drainage"),
                ("body_part", "Gallbladder"),
                ("approach", "Percutaneous"),
                ("device", "No Device"),
            ],
            code: "0F943ZX",
            fired: &["B3.4a"],
        },
        Case {
            flags: &["drain_placed", "distinct_drainage"],
            candidates: &[
                ("body_system", "Hepatobiliary System and Pancreas"),
                ("root_operation", "Drainage"),
                ("body_part", "Gallbladder"),
                ("approach", "Percutaneous"),
                ("qualifier", "None"),
            ],
            code: "0F9430Z",
            fired: &["B6.2"],
        },
        Case {
            flags: &["down_to_fascia"],
            candidates: &[
                ("body_system", "Skin and Breast"),
                ("root_operation", "Excision"),
                ("body_part", "Subcutaneous Tissue and Fascia, Right Lower Arm"),
                ("approach", "External"),
                ("device", "No Device"),
                ("qualifier", "No Qualifier"),
            ],
            code: "0JBD0ZZ",
            fired: &["B3.5-approach", "B3.5"],
        },
        Case {
            flags: &["cemented"],
            candidates: &[
                ("body_system", "Lower Joints"),
                ("root_operation", "Replacement"),
                ("body_part", "Right knee"),
                ("approach", "Open"),
                ("device", "Synthetic Substitute"),
                ("qualifier", "Uncemented"),
            ],
            code: "0SRC0J9",
            fired: &["CEMENTED"],
        },
        Case {
            flags: &["no_device_left"],
            candidates: &[
                ("body_system", "Heart and Great Vessels"),
                ("root_operation", "Bypass"),
                ("body_part", "Coronary Artery, One Artery"),
                ("approach", "Percutaneous Endoscopic"),
                ("qualifier", "Coronary Artery"),
            ],
            code: "02104Z3",
            fired: &["B6.1a"],
        },
    ];

    for case in cases {
        let out = resolve(case.candidates, case.flags);
        assert_eq!(out.outcome.code().map(|c| c.as_str()), Some(case.code), "{:?}: {:?}", case.flags, out.outcome);
        assert_eq!(out.fired, case.fired.to_vec(), "{:?}", case.flags);
    }
}

#[test]
fn overridden_axis_names_the_rule() {
    let mut facts = facts(
        &[
            ("body_system", "Hepatobiliary System and Pancreas"),
            ("root_operation", "Resection"),
            ("body_part", "Gallbladder"),
            ("device", "No Device"),
            ("qualifier", "No Qualifier"),
        ],
        &["converted_to_open"],
    );
    facts.select(Axis::Approach, "Percutaneous Endoscopic");

    let Outcome::Valid { provenance, .. } = engine().resolve(facts).outcome else {
        panic!("expected Valid");
    };
    let approach = provenance.iter().find(|p| p.axis == Axis::Approach).unwrap();
    assert_eq!(approach.source, Source::Rule { id: "B5.2".into() });
    assert_eq!(approach.value, "Open");
    let replaced = approach.superseded.as_ref().unwrap();
    assert_eq!(replaced.value, "Percutaneous Endoscopic");
    assert_eq!(replaced.confidence, Confidence::User);
}

#[test]
fn integral_drain_is_queried_not_coded() {
    let out = resolve(
        &[
            ("body_system", "Anatomical Regions, General"),
            ("root_operation", "Insertion"),
            ("body_part", "Abdominal cavity"),
            ("approach", "Open"),
            ("device", "JP drain"),
            ("qualifier", "No Qualifier"),
        ],
        &["drain_placed"],
    );

    assert_eq!(out.fired, vec!["B6.1b"]);
    assert_eq!(out.queries[0].id, "B6.1b");
    assert_eq!(out.queries[0].axis, Axis::RootOperation);
    assert!(matches!(out.outcome, Outcome::Invalid { axis: None, reason: InvalidReason::NoValidRow, .. }));
}

#[test]
fn unicondylar_replacement_asks_for_compartment() {
    let out = resolve(
        &[
            ("body_system", "Lower Joints"),
            ("root_operation", "Replacement"),
            ("body_part", "Knee Joint, Right"),
            ("approach", "Open"),
            ("device", "Synthetic Substitute, Unicondylar, Medial"),
            ("qualifier", "Uncemented"),
        ],
        &["unicondylar"],
    );
    assert_eq!(out.fired, vec!["UNICONDYLAR"]);
    assert_eq!(out.queries[0].axis, Axis::Device);
    assert_eq!(out.outcome.code().unwrap().as_str(), "0SRC0LA");
}

#[test]
fn contested_candidates_stay_unset() {
    let mut candidates = BYPASS.to_vec();
    candidates.retain(|(axis, _)| *axis != "body_part");
    candidates.push(("body_part", "Coronary Artery, One Artery"));
    candidates.push(("body_part", "Coronary Artery, Two Arteries"));

    let out = resolve(&candidates, &[]);
    let Outcome::Incomplete { missing, .. } = &out.outcome else {
        panic!("expected Incomplete, got {:?}", out.outcome);
    };
    assert_eq!(*missing, AxisSet::BODY_PART);
    let ids: Vec<(&str, Axis)> = out.queries.iter().map(|q| (q.id.as_str(), q.axis)).collect();
    assert_eq!(ids, vec![("A8", Axis::BodyPart), ("A8-contested", Axis::BodyPart)]);
}

#[test]
fn user_selection_settles_contested_axis() {
    let doc: FactsDocument = serde_json::from_value(json!({
        "candidates": [
            {"axis": "body_system", "value": "Hepatobiliary System and Pancreas"},
            {"axis": "root_operation", "value": "Resection"},
            {"axis": "body_part", "value": "Gallbladder"},
            {"axis": "body_part", "value": "Liver"},
            {"axis": "approach", "value": "Open"},
            {"axis": "device", "value": "No Device"},
            {"axis": "qualifier", "value": "No Qualifier"}
        ],
        "selections": [{"axis": "body_part", "value": "Liver"}]
    }))
    .unwrap();

    let out = engine().resolve(doc.into_facts().unwrap());
    assert_eq!(out.outcome.code().unwrap().as_str(), "0FT00ZZ");
    assert!(out.queries.is_empty());

    let Outcome::Valid { provenance, .. } = out.outcome else {
        panic!("expected Valid");
    };
    let body_part = &provenance[Axis::BodyPart.index()];
    assert_eq!(body_part.source, Source::User);
    assert_eq!(body_part.origin, "manual (extracted)");
    assert_eq!(provenance[Axis::Approach.index()].source, Source::Extracted);
}

#[test]
fn biopsy_without_diagnostic_row_stays_incomplete() {
    let out = resolve(
        &[
            ("body_system", "Hepatobiliary System and Pancreas"),
            ("root_operation", "Resection"),
            ("body_part", "Gallbladder"),
            ("approach", "Open"),
            ("device", "No Device"),
        ],
        &["biopsy"],
    );

    assert!(!out.fired.iter().any(|id| id == "B3.4a"));
    match out.outcome {
        Outcome::Incomplete { missing, options, .. } => {
            assert_eq!(missing, AxisSet::QUALIFIER);
            assert_eq!(options[&Axis::Qualifier], vec!["No Qualifier"]);
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
}

#[test]
fn fascia_flag_keeps_body_system_without_matching_table() {
    let out = resolve(
        &[
            ("body_system", "Hepatobiliary System and Pancreas"),
            ("root_operation", "Resection"),
            ("body_part", "Gallbladder"),
            ("approach", "Percutaneous Endoscopic"),
            ("device", "No Device"),
            ("qualifier", "No Qualifier"),
        ],
        &["converted_to_open", "down_to_fascia"],
    );

    assert_eq!(out.fired, vec!["B5.2", "B3.5-approach"]);
    let Outcome::Valid { code, provenance } = out.outcome else {
        panic!("expected Valid");
    };
    assert_eq!(code.as_str(), "0FT40ZZ");
    assert_eq!(provenance[Axis::BodySystem.index()].source, Source::Extracted);

    // Two rules wrote the approach; the trail still shows the documented one.
    let approach = &provenance[Axis::Approach.index()];
    assert_eq!(approach.source, Source::Rule { id: "B3.5-approach".into() });
    let replaced = approach.superseded.as_ref().unwrap();
    assert_eq!(replaced.value, "Percutaneous Endoscopic");
    assert_eq!(replaced.confidence, Confidence::Extracted);
}

#[test]
fn key_term_resolves_when_one_value_fits() {
    let out = resolve(
        &[
            ("body_system", "Hepatobiliary System and Pancreas"),
            ("root_operation", "Drainage"),
            ("body_part", "Hepatobiliary organ"),
            ("approach", "Percutaneous"),
            ("device", "Drainage Device"),
            ("qualifier", "No Qualifier"),
        ],
        &[],
    );
    let Outcome::Valid { code, provenance } = out.outcome else {
        panic!("expected Valid");
    };
    assert_eq!(code.as_str(), "0F9430Z");
    assert_eq!(provenance[Axis::BodyPart.index()].expanded_from.as_deref(), Some("Hepatobiliary organ"));

    let resection = [
        ("body_system", "Hepatobiliary System and Pancreas"),
        ("root_operation", "Resection"),
        ("approach", "Open"),
        ("device", "No Device"),
        ("qualifier", "No Qualifier"),
    ];
    let ambiguous = resolve(&with("body_part", "Hepatobiliary organ", &resection), &[]);
    assert!(matches!(
        ambiguous.outcome,
        Outcome::Invalid { axis: Some(Axis::BodyPart), reason: InvalidReason::AmbiguousRow, .. }
    ));
}

#[test]
fn repeated_runs_are_identical() {
    let engine = engine();
    let inputs = [facts(&BYPASS, &[]), facts(&without("device", &BYPASS), &["biopsy"])];
    for input in inputs {
        let a = engine.resolve_verbose(input.clone());
        let b = engine.resolve_verbose(input);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}

#[test]
fn valid_codes_come_from_exactly_one_row() {
    let inputs = [
        BYPASS.to_vec(),
        with("device", "Autologous Venous Tissue", &BYPASS),
        with("qualifier", "Internal Mammary, Left", &BYPASS),
        with("body_part", "Coronary Artery, Two Arteries", &with("device", "Autologous Arterial Tissue", &BYPASS)),
    ];

    for candidates in inputs {
        let out = resolve(&candidates, &[]);
        let Outcome::Valid { code, provenance } = out.outcome else {
            panic!("expected Valid for {candidates:?}");
        };
        let rows: Vec<_> = INDEX.rows().iter().filter(|row| row.code() == &code).collect();
        assert_eq!(rows.len(), 1, "{code}");
        for entry in &provenance {
            assert_eq!(rows[0].value(entry.axis), entry.value, "{code} {}", entry.axis);
        }
    }
}

#[test]
fn never_assembles_with_an_axis_unset() {
    for axis in Axis::ALL {
        let name = axis.name();
        let out = resolve(&without(name, &BYPASS), &[]);
        match out.outcome {
            Outcome::Incomplete { missing, .. } => assert_eq!(missing, axis.bit(), "{name}"),
            other => panic!("{name}: expected Incomplete, got {other:?}"),
        }
    }
}

#[test]
fn shared_engine_across_threads() {
    let engine = engine();
    let expected: Vec<Resolution> =
        [BYPASS.to_vec(), without("device", &BYPASS)].iter().map(|c| engine.resolve(facts(c, &[]))).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    [BYPASS.to_vec(), without("device", &BYPASS)]
                        .iter()
                        .map(|c| engine.resolve(facts(c, &[])))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
