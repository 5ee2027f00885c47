use super::tokenize;
use crate::frame::SlotValue;
use crate::Manager;
use std::rc::Rc;

// "McDonald's hired Tom Smith and Fred Jones." with a collapsed
// dependency parse: hired is the root, McDonald is its subject, Smith its
// object, and Jones a conjunct of Smith.
fn hiring_seq() -> Rc<crate::TokenSequence> {
    let text = "McDonald's hired Tom Smith and Fred Jones.";
    // Tokens: McDonald ' s hired Tom Smith and Fred Jones .
    Rc::new(
        tokenize(text)
            .with_annotations(
                "pos",
                &[
                    "NNP", "POS", "POS", "VBD", "NNP", "NNP", "CC", "NNP", "NNP", ".",
                ],
            )
            .with_annotations(
                "lemma",
                &[
                    "mcdonald", "'", "s", "hire", "tom", "smith", "and", "fred", "jones",
                    ".",
                ],
            )
            .with_dependencies(&[
                (0, 3, "nsubj"),
                (1, 0, "case"),
                (2, 0, "case"),
                (3, -1, "root"),
                (4, 5, "compound"),
                (5, 3, "dobj"),
                (6, 5, "cc"),
                (7, 8, "compound"),
                (8, 5, "conj"),
                (9, 3, "punct"),
            ]),
    )
}

const HIRING_RULES: &str = "\
hire : lemma[hire]
name : pos[NNP]
nsubj ^ nsubj
dobj ^ dobj conj*
hsubj ~ select(hire, connects(nsubj, name, hire))
hobj ~ select(hire, connects(dobj, hire, name))
hiring ~ union(hsubj, hobj)
hf $ frame(hiring, employer = hsubj name, employee = hobj name)
";

#[test]
fn hiring_frame() {
    let vrm = Manager::new();
    vrm.parse_block(HIRING_RULES);
    assert!(vrm.broken_statements().is_empty());

    let toks = hiring_seq();
    // Scenario S6: one merged frame for the hiring event.
    let frames = vrm.frames("hf", &toks).unwrap();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];

    match frame.fields().get("employer") {
        Some(SlotValue::One(m)) => assert_eq!(m.matching_text(), "McDonald"),
        other => panic!("unexpected employer slot: {:?}", other),
    }
    match frame.fields().get("employee") {
        Some(SlotValue::Many(ms)) => {
            let mut texts: Vec<&str> = ms.iter().map(|m| m.matching_text()).collect();
            texts.sort();
            assert_eq!(texts, vec!["Jones", "Smith"]);
        }
        other => panic!("unexpected employee slot: {:?}", other),
    }
}

#[test]
fn frame_serializes_to_json() {
    let vrm = Manager::new();
    vrm.parse_block(HIRING_RULES);
    let toks = hiring_seq();
    let frames = vrm.frames("hf", &toks).unwrap();
    let json = frames[0].as_json_value();
    assert_eq!(json["employer"], serde_json::json!("McDonald"));
    let employees = json["employee"].as_array().unwrap();
    assert_eq!(employees.len(), 2);
}

#[test]
fn frame_merge_and_subsume() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
noun : pos[NN]
np -> &noun
nf $ frame(np, head = noun)
",
    );
    let toks = Rc::new(
        tokenize("dog house").with_annotations("pos", &["NN", "NN"]),
    );
    let frames = vrm.frames("nf", &toks).unwrap();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].subsumes(&frames[0]));
    assert!(!frames[0].subsumes(&frames[1]));

    let mut merged = frames[0].clone();
    merged.merge(frames[1].clone());
    match merged.fields().get("head") {
        Some(SlotValue::Many(ms)) => assert_eq!(ms.len(), 2),
        other => panic!("unexpected merged slot: {:?}", other),
    }
}

#[test]
fn anchor_must_be_defined() {
    let vrm = Manager::new();
    vrm.parse_block("nf $ frame(missing, head = noun)\n");
    assert!(vrm
        .broken_statements()
        .iter()
        .any(|b| b.message.contains("missing")));
}

#[test]
fn scanning_a_frame_yields_anchor_matches() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
noun : pos[NN]
np -> &noun
nf $ frame(np, head = noun)
",
    );
    let toks = Rc::new(tokenize("dog").with_annotations("pos", &["NN"]));
    let matches = vrm.scan("nf", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name.as_deref(), Some("nf"));
}
