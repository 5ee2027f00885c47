//! Parser for the token test expression language.
//!
//! Grammar, lowest precedence first: `or`, `and`, `not`, atom. Atoms are
//! `/RE/i?`, `<SUB>i?`, `{tok ...}i?s?`, `f{path}i?s?`, `{terms}R a?`,
//! `label[tok ...]`, `&name`, and parenthesized groups.

use super::TokenTest;
use crate::manager::Manager;
use crate::{MatchError, MatchResult, ParseError};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::rc::Rc;

static TOKEN_EXPRESSION: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(
        r"(?s)\{.*?\}\d+(?:\.\d+)?a?|[fcj]?\{.*?\}i?s?i?|\w+\[.*?\]|/\S+?/i?|<\S+>i?|[&@][\w.]+|\(|\)|\S+",
    )
    .unwrap()
});

static RADIUS_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)^\{(.*)\}(\d+(?:\.\d+)?)(a?)$").unwrap());
static MEMBERSHIP_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)^([fcj]?)\{(.*)\}(i?s?i?)$").unwrap());
static SUBSTRING_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^<(.*)>(i?)$").unwrap());
static REGEX_ATOM: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"^/(.*)/(i?)$").unwrap());
static REFERENCE_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^[&@]([\w.]+)$").unwrap());
static LOOKUP_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)^(\w+)\[(.*)\]$").unwrap());
static WORD: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"\S+").unwrap());

fn words(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parser state for one token test expression.
pub struct TokenTestExpression<'m> {
    manager: &'m Rc<Manager>,
    expr: String,
    toks: Vec<String>,
}

impl<'m> TokenTestExpression<'m> {
    pub fn new(manager: &'m Rc<Manager>) -> Self {
        Self {
            manager,
            expr: String::new(),
            toks: Vec::new(),
        }
    }

    pub fn parse(mut self, expr: &str) -> MatchResult<TokenTest> {
        self.expr = expr.to_string();
        self.toks = TOKEN_EXPRESSION
            .find_iter(expr)
            .map(|m| m.as_str().to_string())
            .collect();
        let test = self.orexpr()?;
        if !self.toks.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Extra tokens starting with '{}' in token test expression '{}'",
                    self.toks[0], self.expr
                ),
            )
            .into());
        }
        Ok(test)
    }

    fn peek(&self) -> Option<&str> {
        self.toks.first().map(|t| t.as_str())
    }

    fn pop(&mut self) -> Option<String> {
        if self.toks.is_empty() {
            None
        } else {
            Some(self.toks.remove(0))
        }
    }

    // orexpr -> andexpr ( 'or' andexpr )*
    fn orexpr(&mut self) -> MatchResult<TokenTest> {
        let mut subs = Vec::new();
        if let Some(test) = self.andexpr()? {
            subs.push(test);
        }
        while self.peek() == Some("or") {
            self.pop();
            if let Some(test) = self.andexpr()? {
                subs.push(test);
            }
        }
        if subs.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Empty 'or' expression in token test expression '{}'",
                    self.expr
                ),
            )
            .into());
        }
        if subs.len() > 1 {
            Ok(TokenTest::Or(subs))
        } else {
            Ok(subs.pop().unwrap())
        }
    }

    // andexpr -> notexpr ( 'and' notexpr )*
    fn andexpr(&mut self) -> MatchResult<Option<TokenTest>> {
        let mut subs = Vec::new();
        if let Some(test) = self.notexpr()? {
            subs.push(test);
        }
        while self.peek() == Some("and") {
            self.pop();
            if let Some(test) = self.notexpr()? {
                subs.push(test);
            }
        }
        if subs.is_empty() {
            return Ok(None);
        }
        if subs.len() > 1 {
            Ok(Some(TokenTest::And(subs)))
        } else {
            Ok(subs.pop())
        }
    }

    // notexpr -> atom | 'not' atom
    fn notexpr(&mut self) -> MatchResult<Option<TokenTest>> {
        if self.toks.is_empty() {
            return Ok(None);
        }
        let notted = self.peek() == Some("not");
        if notted {
            self.pop();
        }
        let test = match self.atom()? {
            Some(test) => test,
            None => {
                if notted {
                    return Err(ParseError::new(
                        0,
                        format!(
                            "Missing argument after 'not' in token test expression '{}'",
                            self.expr
                        ),
                    )
                    .into());
                }
                return Ok(None);
            }
        };
        if notted {
            Ok(Some(TokenTest::Not(Box::new(test))))
        } else {
            Ok(Some(test))
        }
    }

    // atom -> /REGEX/ | <SUBSTRING> | {MEMBERSHIP} | {TERMS}R | &REF
    //       | LABEL[...] | '(' orexpr ')'
    fn atom(&mut self) -> MatchResult<Option<TokenTest>> {
        if self.toks.is_empty() {
            return Ok(None);
        }
        if self.peek() == Some(")") {
            return Ok(None);
        }
        let tok = self.pop().unwrap();

        if tok == "(" {
            let test = self.orexpr()?;
            if self.peek() != Some(")") {
                return Err(ParseError::new(
                    0,
                    format!(
                        "Unbalanced '(' in token test expression '{}'",
                        self.expr
                    ),
                )
                .into());
            }
            self.pop();
            return Ok(Some(test));
        }

        if let Some(caps) = RADIUS_ATOM.captures(&tok) {
            let terms: HashSet<String> = words(&caps[1])
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect();
            let radius: f64 = caps[2].parse().unwrap();
            let match_all = &caps[3] == "a";
            return Ok(Some(TokenTest::Radius {
                terms,
                radius,
                match_all,
            }));
        }

        if let Some(caps) = MEMBERSHIP_ATOM.captures(&tok) {
            let source = caps[1].to_string();
            let body = caps[2].to_string();
            let flags = caps[3].to_string();
            let case_sensitive = !flags.contains('i');
            let stemming = flags.contains('s');
            let members = match source.as_str() {
                "" => words(&body),
                "f" => {
                    let path = self.manager.resolve_import_path(body.trim())?;
                    let contents =
                        std::fs::read_to_string(&path).map_err(|err| MatchError::Io {
                            path: path.display().to_string(),
                            message: err.to_string(),
                        })?;
                    contents.lines().map(|l| l.trim().to_string()).collect()
                }
                // Cluster and JSON files define one test per cluster, which
                // a single atom cannot express. They are available through
                // the import statement form instead.
                _ => {
                    return Err(ParseError::new(
                        0,
                        format!(
                            "'{}{{...}}' defines multiple tests; use an import statement ('name <- {}{{...}}') instead",
                            source, source
                        ),
                    )
                    .into());
                }
            };
            let members = members
                .into_iter()
                .filter(|m| !m.is_empty())
                .map(|m| if case_sensitive { m } else { m.to_lowercase() })
                .collect();
            return Ok(Some(TokenTest::Membership {
                members,
                case_sensitive,
                stemming,
            }));
        }

        if let Some(caps) = SUBSTRING_ATOM.captures(&tok) {
            let case_sensitive = caps[2].is_empty();
            let substring = if case_sensitive {
                caps[1].to_string()
            } else {
                caps[1].to_lowercase()
            };
            return Ok(Some(TokenTest::Substring {
                substring,
                case_sensitive,
            }));
        }

        if let Some(caps) = REGEX_ATOM.captures(&tok) {
            let case_sensitive = caps[2].is_empty();
            let pattern = if case_sensitive {
                caps[1].to_string()
            } else {
                format!("(?i){}", &caps[1])
            };
            let re = regex::Regex::new(&pattern).map_err(|err| {
                MatchError::Syntax(ParseError::new(
                    0,
                    format!(
                        "Bad regular expression '{}' in token test expression '{}': {}",
                        &caps[1], self.expr, err
                    ),
                ))
            })?;
            return Ok(Some(TokenTest::Regex { re, case_sensitive }));
        }

        if let Some(caps) = REFERENCE_ATOM.captures(&tok) {
            return Ok(Some(TokenTest::Reference {
                name: caps[1].to_string(),
            }));
        }

        if let Some(caps) = LOOKUP_ATOM.captures(&tok) {
            let label = caps[1].to_string();
            let members = words(&caps[2]).into_iter().collect();
            return Ok(Some(TokenTest::Lookup { label, members }));
        }

        Err(ParseError::new(
            0,
            format!(
                "Unparsable atom '{}' in token test expression '{}'",
                tok, self.expr
            ),
        )
        .into())
    }
}
