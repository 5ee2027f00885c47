use super::{seq, seq_with_pos};
use crate::Manager;

#[test]
fn simple_phrase() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
lparen : { ( }
rparen : { ) }
doubleparen -> &lparen &rparen
maybeparen -> ( &lparen | &rparen ) ?
",
    );
    // Scenario S2.
    let toks = seq("(x) () )(");
    assert_eq!(
        vrm.scan("doubleparen", &toks, 0, None, &None).unwrap().len(),
        2
    );
    // Zero-width alternatives are dropped; each paren matches once.
    assert_eq!(
        vrm.scan("maybeparen", &toks, 0, None, &None).unwrap().len(),
        6
    );
}

#[test]
fn longest_match_per_start() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
run -> &num+
",
    );
    let toks = seq("1 23 456 x 7 8");
    let matches = vrm.scan("run", &toks, 0, None, &None).unwrap();
    // One match per start, each the longest there.
    assert_eq!(matches.len(), 2);
    assert_eq!((matches[0].begin, matches[0].end), (0, 3));
    assert_eq!((matches[1].begin, matches[1].end), (4, 6));
    let mut starts: Vec<usize> = matches.iter().map(|m| m.begin).collect();
    starts.dedup();
    assert_eq!(starts.len(), matches.len());
}

#[test]
fn start_end_callouts() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
numbers_run -> &num+
all_numbers -> @START @numbers_run @END
",
    );
    // Scenario S3.
    let toks = seq("1 23 456");
    let matches = vrm.scan("all_numbers", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!((matches[0].begin, matches[0].end), (0, 3));

    let toks = seq("1 x 2");
    assert_eq!(
        vrm.scan("all_numbers", &toks, 0, None, &None).unwrap().len(),
        0
    );
    assert_eq!(
        vrm.scan("numbers_run", &toks, 0, None, &None).unwrap().len(),
        2
    );
}

#[test]
fn literal_and_case_insensitive() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
greeting -> hello there
anygreet i-> hello there
",
    );
    let toks = seq("Hello there hello there");
    assert_eq!(vrm.scan("greeting", &toks, 0, None, &None).unwrap().len(), 1);
    assert_eq!(vrm.scan("anygreet", &toks, 0, None, &None).unwrap().len(), 2);
}

#[test]
fn alternation_and_repetition() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
adj : pos[JJ]
noun : pos[NN NNS]
np -> &adj* &noun
",
    );
    let toks = seq_with_pos(
        "The big red dog barked",
        &["DT", "JJ", "JJ", "NN", "VBD"],
    );
    let matches = vrm.scan("np", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matching_text(), "big red dog");
}

#[test]
fn callout_to_other_phrase() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
num : /^[0-9]+$/
unit : { mm cm m }
measure -> @number @unit
number -> &num
",
    );
    let toks = seq("10 cm wide");
    let matches = vrm.scan("measure", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    // The callout match is reachable through the submatch tree.
    assert_eq!(matches[0].query(&["number".to_string()]).len(), 1);
}

#[test]
fn test_matches_become_submatches() {
    let vrm = Manager::new();
    vrm.parse_block(
        "\
noun : pos[NN NNS]
np -> &noun
",
    );
    let toks = seq_with_pos("dogs bark", &["NNS", "VBP"]);
    let matches = vrm.scan("np", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    let subs = matches[0].all_submatches(Some("noun"));
    assert_eq!(subs.len(), 1);
    assert_eq!((subs[0].begin, subs[0].end), (0, 1));
}

#[test]
fn root_builtin() {
    let vrm = Manager::new();
    vrm.parse_block("to_root -> @ROOT\n");
    let toks = std::rc::Rc::new(
        super::tokenize("John sleeps soundly").with_dependencies(&[
            (0, 1, "nsubj"),
            (1, -1, "root"),
            (2, 1, "advmod"),
        ]),
    );
    let matches = vrm.scan("to_root", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    // Covers the contiguous root run, here the single root verb.
    assert_eq!((matches[0].begin, matches[0].end), (1, 2));
}

#[test]
fn lexicon_matcher() {
    let dir = std::env::temp_dir();
    let path = dir.join("tokex_test_places.txt");
    std::fs::write(&path, "new york\nboston\n").unwrap();

    let vrm = Manager::new();
    vrm.parse_block(&format!("place L-> {}\n", path.display()));
    let toks = seq("I love new york and boston");
    let matches = vrm.scan("place", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].matching_text(), "new york");
    assert_eq!(matches[0].payload, Some(serde_json::Value::Bool(true)));

    std::fs::remove_file(&path).ok();
}

#[test]
fn csv_lexicon_payload() {
    let dir = std::env::temp_dir();
    let path = dir.join("tokex_test_places.csv");
    std::fs::write(&path, "name,kind\nnew york,city\nvermont,state\n").unwrap();

    let vrm = Manager::new();
    vrm.parse_block(&format!("place Lc0-> {}\n", path.display()));
    let toks = seq("vermont is lovely");
    let matches = vrm.scan("place", &toks, 0, None, &None).unwrap();
    assert_eq!(matches.len(), 1);
    let payload = matches[0].payload.as_ref().unwrap();
    assert_eq!(payload["kind"], serde_json::Value::String("state".into()));

    std::fs::remove_file(&path).ok();
}
