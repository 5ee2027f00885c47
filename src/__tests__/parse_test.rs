use super::tokenize;
use crate::{Manager, MatchError, Requirement};
use std::rc::Rc;

// "John gave Mary a book": gave is the root; John is its nsubj, Mary its
// iobj, book its dobj, and "a" the det of book.
fn gave_seq() -> Rc<crate::TokenSequence> {
    Rc::new(tokenize("John gave Mary a book").with_dependencies(&[
        (0, 1, "nsubj"),
        (1, -1, "root"),
        (2, 1, "iobj"),
        (3, 4, "det"),
        (4, 1, "dobj"),
    ]))
}

#[test]
fn single_edge_walks_both_directions() {
    let vrm = Manager::new();
    vrm.parse_block("subj ^ nsubj\n");
    let toks = gave_seq();
    let matches = vrm.scan("subj", &toks, 0, None, &None).unwrap();
    // The edge is walked from the child up and from the parent down.
    assert_eq!(matches.len(), 2);
    assert!(matches.iter().any(|m| (m.begin, m.end) == (0, 1)));
    assert!(matches.iter().any(|m| (m.begin, m.end) == (1, 0)));
}

#[test]
fn direction_restrictions() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
up_subj ^ /nsubj
down_subj ^ \\nsubj
",
    );
    let toks = gave_seq();
    let up = vrm.scan("up_subj", &toks, 0, None, &None).unwrap();
    assert_eq!(up.len(), 1);
    assert_eq!((up[0].begin, up[0].end), (0, 1));
    let down = vrm.scan("down_subj", &toks, 0, None, &None).unwrap();
    assert_eq!(down.len(), 1);
    assert_eq!((down[0].begin, down[0].end), (1, 0));
}

#[test]
fn multi_edge_path() {
    let vrm = Manager::new();
    vrm.parse_block("subj_to_obj ^ /nsubj \\dobj\n");
    let toks = gave_seq();
    let matches = vrm.scan("subj_to_obj", &toks, 0, None, &None).unwrap();
    // From John up to gave, down to book. Arc ends are inclusive.
    assert_eq!(matches.len(), 1);
    assert_eq!((matches[0].begin, matches[0].end), (0, 4));
    assert_eq!(matches[0].span(), (0, 5));
}

#[test]
fn walk_symmetry() {
    let vrm = Manager::new();
    // Palindromic under direction reversal: every walk is mirrored.
    vrm.parse_block("obj ^ dobj\n");
    let toks = gave_seq();
    let matches = vrm.scan("obj", &toks, 0, None, &None).unwrap();
    for m in &matches {
        assert!(
            matches
                .iter()
                .any(|o| o.begin == m.end && o.end == m.begin),
            "no mirror for ({},{})",
            m.begin,
            m.end
        );
    }
}

#[test]
fn edge_label_token_test() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
arg : { nsubj dobj iobj }
args ^ &arg
",
    );
    let toks = gave_seq();
    let matches = vrm.scan("args", &toks, 0, None, &None).unwrap();
    // Three argument edges, each walked in both directions.
    assert_eq!(matches.len(), 6);
}

#[test]
fn parse_callout() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
to_verb ^ /nsubj
with_obj ^ @to_verb \\dobj
",
    );
    let toks = gave_seq();
    let matches = vrm.scan("with_obj", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!((matches[0].begin, matches[0].end), (0, 4));
    // The callout walk is recorded as a submatch.
    assert_eq!(matches[0].query(&["to_verb".to_string()]).len(), 1);
}

#[test]
fn phrase_callout_is_rejected() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
words -> gave
bad ^ @words
",
    );
    let toks = gave_seq();
    let err = vrm.scan("bad", &toks, 0, None, &None).unwrap_err();
    assert!(matches!(err, MatchError::KindMismatch { .. }));
}

#[test]
fn cycles_terminate() {
    let vrm = Manager::new();
    vrm.parse_block("around ^ dep+\n");
    let toks = Rc::new(tokenize("a b").with_dependencies(&[
        (0, 1, "dep"),
        (1, 0, "dep"),
    ]));
    // The visited set keeps the cyclic graph from looping forever.
    let matches = vrm.scan("around", &toks, 0, None, &None).unwrap();
    assert!(!matches.is_empty());
}

#[test]
fn parse_rules_require_depparse() {
    let vrm = Manager::new();
    vrm.parse_block("subj ^ nsubj\n");
    let req = vrm.requirements("subj", &None).unwrap();
    assert!(req.contains(&Requirement::DepParse));
}
