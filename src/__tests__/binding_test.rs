use super::seq;
use crate::{Manager, Substitutions};
use std::collections::HashMap;
use std::rc::Rc;

#[test]
fn binding_renames_references() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
vowel : { a e i o u }
vpair [letter=vowel] -> &letter &letter
",
    );
    let toks = seq("a e b");
    let matches = vrm.scan("vpair", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!((matches[0].begin, matches[0].end), (0, 2));
}

#[test]
fn caller_binding_wins_on_collision() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
vowel : { a e i o u }
cons : { b c d }
pair [letter=vowel] -> &letter &letter
cpair [letter=cons] -> @pair
",
    );
    let toks = seq("b c a");
    // pair alone sees vowels; through cpair the binding is overridden.
    assert_eq!(vrm.scan("pair", &toks, 0, None, &None).unwrap().len(), 0);
    let matches = vrm.scan("cpair", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!((matches[0].begin, matches[0].end), (0, 2));
}

#[test]
fn binding_applies_in_coordinators() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
word : /^[a-z]+$/
hits [target=num] ~ match(target, _)
",
    );
    let toks = seq("1 a 2");
    assert_eq!(vrm.scan("hits", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn substitution_fixed_point() {
    let mut map = HashMap::new();
    map.insert("a".to_string(), "b".to_string());
    map.insert("b".to_string(), "c".to_string());
    let subst: Substitutions = Some(Rc::new(map));
    let once = Manager::apply_substitutions("a", &subst);
    let twice = Manager::apply_substitutions(&once, &subst);
    assert_eq!(once, "c");
    assert_eq!(once, twice);
}

#[test]
fn cyclic_substitutions_terminate() {
    let mut map = HashMap::new();
    map.insert("a".to_string(), "b".to_string());
    map.insert("b".to_string(), "a".to_string());
    let subst: Substitutions = Some(Rc::new(map));
    // The cycle guard stops the walk rather than looping forever.
    let applied = Manager::apply_substitutions("a", &subst);
    assert!(applied == "a" || applied == "b");
}

#[test]
fn cache_distinguishes_substitutions() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
vowel : { a e }
cons : { b c }
vrun [x=vowel] -> &x+
crun [x=cons] -> &x+
",
    );
    let toks = seq("a b");
    // Same underlying reference name, different frozen substitutions.
    assert_eq!(vrm.scan("vrun", &toks, 0, None, &None).unwrap().len(), 1);
    assert_eq!(vrm.scan("crun", &toks, 0, None, &None).unwrap().len(), 1);
    assert_eq!(
        vrm.scan("vrun", &toks, 0, None, &None).unwrap()[0].begin,
        0
    );
    assert_eq!(
        vrm.scan("crun", &toks, 0, None, &None).unwrap()[0].begin,
        1
    );
}
