use super::{seq, seq_with_pos, tokenize};
use crate::{Manager, MatchError};
use std::rc::Rc;

#[test]
fn select_from_phrase_submatches() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
adj : pos[JJ]
noun : pos[NN NNS]
np -> &adj+ &noun
in_np ~ select(noun, np)
",
    );
    // Scenario S4.
    let toks = seq_with_pos(
        "Long pants and short sleeve shirt.",
        &["JJ", "NNS", "CC", "JJ", "NN", "NN", "."],
    );
    assert_eq!(vrm.scan("np", &toks, 0, None, &None).unwrap().len(), 2);
    let selected = vrm.scan("in_np", &toks, 0, None, &None).unwrap();
    assert_eq!(selected.len(), 2);
    // Select soundness: every emitted match came from an extractor named
    // 'noun' reachable through the submatch tree of a feed match.
    for m in &selected {
        let subs = m.all_submatches(Some("noun"));
        assert!(subs.iter().any(|s| s.begin == m.begin && s.end == m.end));
    }
}

#[test]
fn match_within_match() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
noun : pos[NN NNS]
np -> &noun+
nouns_in_np ~ match(noun, np)
",
    );
    let toks = seq_with_pos("city park rules", &["NN", "NN", "NNS"]);
    let matches = vrm.scan("nouns_in_np", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 3);
}

#[test]
fn filter_and_inverted_filter() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word -> &ANY
with_num ~ filter(num, word)
without_num ~ filter(num, word, invert)
",
    );
    let toks = seq("a 1 b");
    assert_eq!(vrm.scan("with_num", &toks, 0, None, &None).unwrap().len(), 1);
    let inverted = vrm.scan("without_num", &toks, 0, None, &None).unwrap();
    assert_eq!(inverted.len(), 2);
}

#[test]
fn prefix_and_suffix() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
dollar : { $ }
num : /^[0-9]+$/
amount ~ prefix(dollar, num)
cents ~ suffix(dollar, num, invert)
",
    );
    let toks = seq("$ 5 and 10");
    let amounts = vrm.scan("amount", &toks, 0, None, &None).unwrap();
    assert_eq!(amounts.len(), 1);
    assert_eq!(amounts[0].matching_text(), "5");
    // Neither number is followed by a dollar sign.
    assert_eq!(vrm.scan("cents", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn precedes_and_follows_with_proximity() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
marker : { x }
num : /^[0-9]+$/
after ~ follows(marker, 2, num)
before ~ precedes(marker, 0, num)
",
    );
    let toks = seq("1 a x 2 x 3");
    // 1 has x two tokens after; 2 has x immediately after.
    assert_eq!(vrm.scan("after", &toks, 0, None, &None).unwrap().len(), 2);
    // 2 and 3 are immediately preceded by x.
    assert_eq!(vrm.scan("before", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn near_and_count() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word : /^[a-z]+$/
span -> &ANY+
near_num ~ near(num, 0, match(word, _))
many_nums ~ count(num, 2, span)
",
    );
    let toks = seq("a 1 b c");
    // 'a' and 'b' are adjacent to the number; 'c' is one token away.
    assert_eq!(vrm.scan("near_num", &toks, 0, None, &None).unwrap().len(), 2);
    let toks = seq("1 2 3");
    assert_eq!(vrm.scan("many_nums", &toks, 0, None, &None).unwrap().len(), 1);
    let toks = seq("1 a b");
    assert_eq!(vrm.scan("many_nums", &toks, 0, None, &None).unwrap().len(), 0);
}

#[test]
fn set_operations_dedupe_by_extent() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
both ~ union(num, num)
same ~ inter(num, num)
none ~ diff(num, num)
",
    );
    let toks = seq("1 2 3");
    // union(F, F) has the size of F; inter(F, F) = F; diff(F, F) is empty.
    assert_eq!(vrm.scan("both", &toks, 0, None, &None).unwrap().len(), 3);
    assert_eq!(vrm.scan("same", &toks, 0, None, &None).unwrap().len(), 3);
    assert_eq!(vrm.scan("none", &toks, 0, None, &None).unwrap().len(), 0);
}

#[test]
fn union_of_different_streams() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word : /^[a-z]+$/
either ~ union(num, word)
",
    );
    let toks = seq("a 1 b");
    assert_eq!(vrm.scan("either", &toks, 0, None, &None).unwrap().len(), 3);
}

#[test]
fn containment_joins() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
span -> &num+
inside ~ contained_by(num, span)
holds ~ contains(span, num)
crossing ~ overlaps(span, num)
",
    );
    let toks = seq("1 2 x 3");
    assert_eq!(vrm.scan("inside", &toks, 0, None, &None).unwrap().len(), 3);
    assert_eq!(vrm.scan("holds", &toks, 0, None, &None).unwrap().len(), 3);
    assert!(!vrm.scan("crossing", &toks, 0, None, &None).unwrap().is_empty());
}

#[test]
fn connects_through_parse_tree() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
person : pos[NNP]
verb : pos[VBD]
subj ^ nsubj
who_did ~ connects(subj, person, verb)
",
    );
    let toks = Rc::new(
        tokenize("John slept")
            .with_annotations("pos", &["NNP", "VBD"])
            .with_dependencies(&[(0, 1, "nsubj"), (1, -1, "root")]),
    );
    let matches = vrm.scan("who_did", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    // The walk lands inside the right feed's match.
    let m = &matches[0];
    assert_eq!(m.all_submatches(Some("subj")).len(), 1);
}

#[test]
fn connects_requires_parse_rule() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
word -> &ANY
linked ~ connects(word, word, word)
",
    );
    let toks = seq("a b");
    let err = vrm.scan("linked", &toks, 0, None, &None).unwrap_err();
    assert!(matches!(err, MatchError::KindMismatch { .. }));
}

#[test]
fn when_requires_match_in_other_sequence() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
hello : { hello }
world : { world }
r ~ when(hello, match(world, _))
",
    );
    // Scenario S5: two sequences in one document.
    let first = seq("hello there");
    let second = seq("world peace");

    vrm.begin_document();
    assert_eq!(vrm.scan("r", &first, 0, None, &None).unwrap().len(), 0);
    assert_eq!(vrm.scan("r", &second, 0, None, &None).unwrap().len(), 1);

    // A new document resets the recorded set.
    vrm.end_document();
    let third = seq("world peace");
    assert_eq!(vrm.scan("r", &third, 0, None, &None).unwrap().len(), 0);
}

#[test]
fn widen_covers_both_feeds() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word -> &ANY
pairings ~ widen(contains(match(word, _), num))
",
    );
    let toks = seq("1 a");
    let matches = vrm.scan("pairings", &toks, 0, None, &None).unwrap();
    assert!(!matches.is_empty());
}

#[test]
fn merge_overlapping_matches() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word : /^[a-z]+$/
pieces ~ union(num, word)
merged ~ merge(pieces)
",
    );
    let toks = seq("1 a ; 2 b");
    let merged = vrm.scan("merged", &toks, 0, None, &None).unwrap();
    // Adjacent matches do not overlap, so nothing merges across the gap.
    assert_eq!(merged.len(), 4);
}

#[test]
fn haspath_is_unsupported() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
hp ~ haspath(num, num, 'nsubj')
",
    );
    let toks = seq("1 2");
    let err = vrm.scan("hp", &toks, 0, None, &None).unwrap_err();
    assert!(matches!(err, MatchError::Unsupported("haspath")));
}

#[test]
fn cache_transparency() {
    let rules = "\
adj : pos[JJ]
noun : pos[NN NNS]
np -> &adj* &noun
in_np ~ select(noun, np)
";
    let cached = Manager::new();
    cached.parse_block(rules);
    let uncached = Manager::with_options(false, true);
    uncached.parse_block(rules);

    let toks = seq_with_pos(
        "Long pants and short sleeve shirt.",
        &["JJ", "NNS", "CC", "JJ", "NN", "NN", "."],
    );
    for rule in ["np", "in_np", "noun"] {
        let with_cache: Vec<(usize, usize)> = cached
            .scan(rule, &toks, 0, None, &None)
            .unwrap()
            .iter()
            .map(|m| (m.begin, m.end))
            .collect();
        // Run twice so the second pass reads the memo.
        let again: Vec<(usize, usize)> = cached
            .scan(rule, &toks, 0, None, &None)
            .unwrap()
            .iter()
            .map(|m| (m.begin, m.end))
            .collect();
        let without: Vec<(usize, usize)> = uncached
            .scan(rule, &toks, 0, None, &None)
            .unwrap()
            .iter()
            .map(|m| (m.begin, m.end))
            .collect();
        assert_eq!(with_cache, without, "rule {}", rule);
        assert_eq!(with_cache, again, "rule {}", rule);
    }
}
