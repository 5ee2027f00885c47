use super::seq;
use crate::matches::{CoordSlots, Match};

#[test]
fn equality_and_ordering_by_extent() {
    let toks = seq("a b c");
    let m1 = Match::phrase(toks.clone(), 0, 2);
    let m2 = Match::phrase(toks.clone(), 0, 2).with_name("other");
    let m3 = Match::phrase(toks.clone(), 1, 2);
    assert_eq!(m1, m2);
    assert_ne!(m1, m3);
    assert!(m1 < m3);
}

#[test]
fn arc_span_normalization() {
    let toks = seq("a b c d");
    let forward = Match::arc(toks.clone(), 1, 3);
    assert_eq!(forward.span(), (1, 4));
    let backward = Match::arc(toks.clone(), 3, 1);
    assert_eq!(backward.span(), (1, 4));
    assert_eq!(backward.matching_text(), "b c d");
}

#[test]
fn arc_covers_is_inclusive() {
    let toks = seq("a b c d");
    let arc = Match::arc(toks.clone(), 1, 3);
    assert!(arc.covers(3));
    let phrase = Match::phrase(toks, 1, 3);
    assert!(!phrase.covers(3));
}

#[test]
fn overlap_semantics() {
    let toks = seq("a b c d");
    let left = Match::phrase(toks.clone(), 0, 2);
    let right = Match::phrase(toks.clone(), 1, 3);
    let after = Match::phrase(toks.clone(), 2, 4);
    assert!(left.overlaps(&right));
    assert!(!left.overlaps(&after));
}

#[test]
fn query_allows_intermediates() {
    let toks = seq("a b c");
    let mut inner = Match::token(toks.clone(), 0, Some("leaf".to_string()));
    inner.add_submatch(Match::token(toks.clone(), 0, Some("deep".to_string())));
    let mut middle = Match::phrase(toks.clone(), 0, 2);
    middle.name = Some("middle".to_string());
    middle.add_submatch(inner);
    let mut outer = Match::phrase(toks.clone(), 0, 3);
    outer.name = Some("outer".to_string());
    outer.add_submatch(middle);

    // Path elements may skip over intermediate rule names.
    let hits = outer.query(&["deep".to_string()]);
    assert_eq!(hits.len(), 1);
    let hits = outer.query(&["leaf".to_string(), "deep".to_string()]);
    assert_eq!(hits.len(), 1);
    let hits = outer.query(&["deep".to_string(), "leaf".to_string()]);
    assert!(hits.is_empty());
}

#[test]
fn widen_covers_both_feeds() {
    let toks = seq("a b c d");
    let left = Match::phrase(toks.clone(), 0, 1);
    let right = Match::phrase(toks.clone(), 3, 4);
    let mut slots = CoordSlots::default();
    slots.left = Some(Box::new(left.clone()));
    slots.right = Some(Box::new(right));
    let coord = Match::coord(&left, slots);
    let widened = coord.widen(false);
    assert_eq!((widened.begin, widened.end), (0, 4));
}

#[test]
fn aliased_slots_enumerate_once() {
    let toks = seq("a b");
    let fm = Match::phrase(toks.clone(), 0, 2).with_name("feed");
    let pm = Match::token(toks.clone(), 1, Some("inner".to_string()));
    let mut slots = CoordSlots::default();
    slots.left = Some(Box::new(fm.clone()));
    slots.supermatch = Some(Box::new(fm));
    slots.submatch = Some(Box::new(pm));
    let coord = Match::coord(&toks_match(&toks), slots);
    // left and supermatch hold the same feed match.
    assert_eq!(coord.direct_submatches().len(), 2);
    assert_eq!(coord.all_submatches(Some("feed")).len(), 1);
}

fn toks_match(toks: &std::rc::Rc<crate::TokenSequence>) -> Match {
    Match::phrase(toks.clone(), 0, 2)
}

#[test]
fn matching_text_uses_offsets() {
    let toks = seq("The quick fox");
    let m = Match::phrase(toks, 1, 3);
    assert_eq!(m.matching_text(), "quick fox");
    assert_eq!(m.start_offset(false), 4);
    assert_eq!(m.end_offset(false), 13);
}
