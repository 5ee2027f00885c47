use crate::statement::{Delimiter, Region, StatementParser};

#[test]
fn region_taxonomy() {
    let text = "\
# a comment
period : { . }
np -> &adj+ &noun

deps ^ /nsubj
coord ~ match(np, _)
fr $ frame(np, head = noun)
imp <- other.vrules
";
    let regions = StatementParser::new(text).regions();
    let mut comments = 0;
    let mut statements = Vec::new();
    for region in regions {
        match region {
            Region::Comment { .. } => comments += 1,
            Region::Statement(stmt) => statements.push(stmt),
            Region::Broken { .. } => panic!("unexpected broken region"),
        }
    }
    assert_eq!(comments, 1);
    assert_eq!(statements.len(), 6);
    assert_eq!(statements[0].name, "period");
    assert_eq!(statements[0].op, Delimiter::Test);
    assert_eq!(statements[0].expression, "{ . }");
    assert_eq!(
        statements[1].op,
        Delimiter::Phrase {
            case_insensitive: false
        }
    );
    assert_eq!(
        statements[2].op,
        Delimiter::Parse {
            case_insensitive: false
        }
    );
    assert_eq!(statements[3].op, Delimiter::Coord);
    assert_eq!(statements[4].op, Delimiter::Frame);
    assert_eq!(statements[5].op, Delimiter::Import);
}

#[test]
fn continuation_lines() {
    let text = "\
words : { alpha beta
          gamma delta }
next -> &words
";
    let statements = StatementParser::new(text).statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].expression.contains("alpha"));
    assert!(statements[0].expression.contains("gamma"));
    assert_eq!(statements[1].name, "next");
}

#[test]
fn case_insensitive_and_lexicon_delimiters() {
    let text = "\
greet i-> hello
lex L-> words.txt
lexi Li-> words.txt
csv Lc2-> table.csv
";
    let statements = StatementParser::new(text).statements();
    assert_eq!(
        statements[0].op,
        Delimiter::Phrase {
            case_insensitive: true
        }
    );
    assert_eq!(
        statements[1].op,
        Delimiter::Lexicon {
            case_insensitive: false,
            csv_column: None
        }
    );
    assert_eq!(
        statements[2].op,
        Delimiter::Lexicon {
            case_insensitive: true,
            csv_column: None
        }
    );
    assert_eq!(
        statements[3].op,
        Delimiter::Lexicon {
            case_insensitive: false,
            csv_column: Some(2)
        }
    );
}

#[test]
fn bindings_attach_to_statement() {
    let text = "vpair [letter=vowel kind=x.y] -> &letter &letter\n";
    let statements = StatementParser::new(text).statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].bindings,
        vec![
            ("letter".to_string(), "vowel".to_string()),
            ("kind".to_string(), "x.y".to_string())
        ]
    );
    assert_eq!(statements[0].expression, "&letter &letter");
}

#[test]
fn nested_namespace_body() {
    let text = "\
ns <-
  inner : { y }
  both -> &inner

after : { z }
";
    let statements = StatementParser::new(text).statements();
    assert_eq!(statements.len(), 2);
    let ns = &statements[0];
    assert_eq!(ns.op, Delimiter::Import);
    assert!(ns.first_line_empty);
    assert!(ns.expression.contains("inner"));
    assert!(ns.expression.contains("both"));
    assert_eq!(statements[1].name, "after");
}

#[test]
fn broken_lines_are_reported() {
    let text = "\
  dangling indent
no delimiter here!
good : { x }
";
    let regions = StatementParser::new(text).regions();
    let broken: Vec<_> = regions
        .iter()
        .filter(|r| matches!(r, Region::Broken { .. }))
        .collect();
    assert_eq!(broken.len(), 2);
    let statements = StatementParser::new(text).statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].name, "good");
}

#[test]
fn offsets_address_the_source() {
    let text = "first : { a }\nsecond -> &first\n";
    let statements = StatementParser::new(text).statements();
    let (start, end) = (statements[1].start, statements[1].end);
    assert_eq!(&text[start..end], "second -> &first");

    let source = crate::Source::new(text);
    let position = source.obtain_position(start);
    assert_eq!((position.line, position.column), (2, 1));
}
