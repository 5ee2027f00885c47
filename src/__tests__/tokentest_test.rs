use super::{seq, seq_with_pos};
use crate::{Manager, Requirement};

#[test]
fn regex_test() {
    let vrm = Manager::new();
    vrm.parse_block("num : /^[0-9]+$/\n");
    let toks = seq("1 23 x 456");
    let matches = vrm.scan("num", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].matching_text(), "1");
}

#[test]
fn case_insensitive_regex() {
    let vrm = Manager::new();
    vrm.parse_block("greet : /hello/i\n");
    let toks = seq("Hello HELLO goodbye");
    assert_eq!(vrm.scan("greet", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn substring_test() {
    let vrm = Manager::new();
    vrm.parse_block("ing : <ing>\n");
    let toks = seq("running jumped singing");
    assert_eq!(vrm.scan("ing", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn membership_test() {
    let vrm = Manager::new();
    vrm.parse_block("period : { . }\n");
    let toks = seq("a. b. c.");
    // Scenario S1: three sentence-final periods.
    assert_eq!(vrm.scan("period", &toks, 0, None, &None).unwrap().len(), 3);
}

#[test]
fn membership_case_flag() {
    let vrm = Manager::new();
    vrm.parse_block("det : { the a an }i\n");
    let toks = seq("The cat saw a dog");
    assert_eq!(vrm.scan("det", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn lookup_test() {
    let vrm = Manager::new();
    vrm.parse_block("noun : pos[NN NNS]\n");
    let toks = seq_with_pos("Dogs chase cats", &["NNS", "VBP", "NNS"]);
    assert_eq!(vrm.scan("noun", &toks, 0, None, &None).unwrap().len(), 2);
    // No pos layer means no matches, not an error.
    let bare = seq("Dogs chase cats");
    assert_eq!(vrm.scan("noun", &bare, 0, None, &None).unwrap().len(), 0);
}

#[test]
fn boolean_combinations() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
vowelish : { a e i o u }
short : /^.$/
both : &vowelish and &short
either : &vowelish or { x }
neither : not ( &vowelish or { x } )
",
    );
    let toks = seq("a x b ee");
    assert_eq!(vrm.scan("both", &toks, 0, None, &None).unwrap().len(), 1);
    assert_eq!(vrm.scan("either", &toks, 0, None, &None).unwrap().len(), 2);
    assert_eq!(vrm.scan("neither", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn any_builtin() {
    let vrm = Manager::new();
    let toks = seq("one two three");
    assert_eq!(vrm.scan("ANY", &toks, 0, None, &None).unwrap().len(), 3);
}

#[test]
fn reference_resolves_through_manager() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
base : { cat dog }
alias : &base
",
    );
    let toks = seq("cat bird dog");
    assert_eq!(vrm.scan("alias", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn requirements_accumulate() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
noun : pos[NN]
entity : ner[ORG]
lem : lemma[run]
all : &noun or &entity or &lem
",
    );
    let req = vrm.requirements("all", &None).unwrap();
    assert!(req.contains(&Requirement::Pos));
    assert!(req.contains(&Requirement::Ner));
    assert!(req.contains(&Requirement::Lemma));
}

struct StubExpander;

impl crate::TermExpander for StubExpander {
    fn divergence(&self, anchor: &str, term: &str) -> Option<f64> {
        match (anchor, term) {
            ("cat", "kitten") => Some(0.5),
            _ => None,
        }
    }
}

#[test]
fn radius_test_uses_expander() {
    let vrm = Manager::new();
    vrm.parse_block("catlike : {cat}1.0\n");
    let toks = seq("kitten dog cat");

    // Without an expander installed the rule cannot run.
    assert!(vrm.scan("catlike", &toks, 0, None, &None).is_err());

    vrm.set_expander(std::rc::Rc::new(StubExpander));
    let matches = vrm.scan("catlike", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 2);
    let req = vrm.requirements("catlike", &None).unwrap();
    assert!(req.contains(&Requirement::Embeddings));
}

#[test]
fn broken_token_test_is_reported() {
    let vrm = Manager::new();
    vrm.parse_block("bad : { unclosed\n");
    assert!(vrm
        .broken_statements()
        .iter()
        .any(|b| b.message.contains("token test")));
}
