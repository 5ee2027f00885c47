//! Intermediate representation of the token-level regular expressions used
//! in phrase and parse rules, with the shared recursive-descent parser.
//!
//! The IR is compiled on demand into an [Nfa](crate::fa::Nfa) the first
//! time the rule is looked up, so that references written with `&` or `@`
//! can be resolved with knowledge of whether the target is a token test or
//! another expression.

use crate::fa::{Nfa, NfaKind};
use crate::manager::Manager;
use crate::{MatchResult, ParseError};
use once_cell::sync::Lazy;
use std::rc::Rc;

static TOKEN_EXPRESSION: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[&@]?[/\\]?\w+(?:\.\w+)?|\S").unwrap());

static REFERENCE_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^[&@][/\\]?[\w.]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
/// Regular expression tree over tokens or dependency edge labels.
pub enum Regexp {
    Atom(String),
    Concat(Vec<Regexp>),
    Altern(Vec<Regexp>),
    Star(Box<Regexp>),
    Plus(Box<Regexp>),
    Opt(Box<Regexp>),
}

impl Regexp {
    /// Names of other extractors referenced with `&` or `@` in this
    /// expression.
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut Vec<String>) {
        match self {
            Regexp::Atom(symbol) => {
                if REFERENCE_ATOM.is_match(symbol) {
                    let name = symbol
                        .trim_start_matches(|c| c == '&' || c == '@')
                        .trim_start_matches(|c| c == '/' || c == '\\');
                    if !refs.iter().any(|r| r == name) {
                        refs.push(name.to_string());
                    }
                }
            }
            Regexp::Concat(subs) | Regexp::Altern(subs) => {
                for sub in subs {
                    sub.collect_references(refs);
                }
            }
            Regexp::Star(sub) | Regexp::Plus(sub) | Regexp::Opt(sub) => {
                sub.collect_references(refs)
            }
        }
    }

    /// Compile into an NFA via Thompson-style composition. The manager is
    /// consulted to decide whether a reference denotes a token test or a
    /// callout to another expression.
    pub fn fa(
        &self,
        mgr: &Rc<Manager>,
        kind: NfaKind,
        case_insensitive: bool,
    ) -> MatchResult<Nfa> {
        let mut nfa = match self {
            Regexp::Atom(symbol) => {
                let mut nfa = Nfa::new(kind);
                nfa.atom(symbol, mgr)?;
                nfa
            }
            Regexp::Concat(subs) => {
                let mut nfa = Nfa::new(kind);
                let parts = subs
                    .iter()
                    .map(|sub| sub.fa(mgr, kind, case_insensitive))
                    .collect::<MatchResult<Vec<_>>>()?;
                nfa.concat(parts);
                nfa
            }
            Regexp::Altern(subs) => {
                let mut nfa = Nfa::new(kind);
                let parts = subs
                    .iter()
                    .map(|sub| sub.fa(mgr, kind, case_insensitive))
                    .collect::<MatchResult<Vec<_>>>()?;
                nfa.altern(parts);
                nfa
            }
            Regexp::Star(sub) => {
                let mut nfa = sub.fa(mgr, kind, case_insensitive)?;
                nfa.star();
                nfa
            }
            Regexp::Plus(sub) => {
                let mut nfa = sub.fa(mgr, kind, case_insensitive)?;
                nfa.plus();
                nfa
            }
            Regexp::Opt(sub) => {
                let mut nfa = sub.fa(mgr, kind, case_insensitive)?;
                nfa.opt();
                nfa
            }
        };
        nfa.case_insensitive = case_insensitive;
        Ok(nfa)
    }
}

/// Recursive-descent parser for the phrase and parse regular expression
/// surface: atoms (literals, `&test`, `@expression`, with optional `/` or
/// `\` direction prefixes), juxtaposition, `|`, and postfix `?` `*` `+`.
pub struct RegexpExpression {
    expr: String,
    toks: Vec<String>,
}

impl RegexpExpression {
    pub fn parse(expr: &str) -> Result<Regexp, ParseError> {
        let toks = TOKEN_EXPRESSION
            .find_iter(expr)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut parser = Self {
            expr: expr.to_string(),
            toks,
        };
        let regex = parser.altern()?;
        if !parser.toks.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Extra tokens starting with '{}' in phrase or parse expression '{}'",
                    parser.toks[0], parser.expr
                ),
            ));
        }
        Ok(regex)
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

    // altern -> concat ( '|' concat )*
    fn altern(&mut self) -> Result<Regexp, ParseError> {
        let mut alternatives = vec![self.concat()?];
        while self.peek() == Some("|") {
            self.pop();
            alternatives.push(self.concat()?);
        }
        if alternatives.len() > 1 {
            Ok(Regexp::Altern(alternatives))
        } else {
            Ok(alternatives.pop().unwrap())
        }
    }

    // concat -> operated operated*
    fn concat(&mut self) -> Result<Regexp, ParseError> {
        let mut parts = Vec::new();
        while let Some(regex) = self.operated()? {
            parts.push(regex);
        }
        if parts.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Empty concat in phrase or parse expression '{}'",
                    self.expr
                ),
            ));
        }
        Ok(Regexp::Concat(parts))
    }

    // operated -> atom | atom '?' | atom '*' | atom '+'
    fn operated(&mut self) -> Result<Option<Regexp>, ParseError> {
        let regex = match self.atom()? {
            Some(regex) => regex,
            None => return Ok(None),
        };
        match self.peek() {
            Some("?") => {
                self.pop();
                Ok(Some(Regexp::Opt(Box::new(regex))))
            }
            Some("*") => {
                self.pop();
                Ok(Some(Regexp::Star(Box::new(regex))))
            }
            Some("+") => {
                self.pop();
                Ok(Some(Regexp::Plus(Box::new(regex))))
            }
            _ => Ok(Some(regex)),
        }
    }

    // atom -> SYMBOL | '(' altern ')'
    fn atom(&mut self) -> Result<Option<Regexp>, ParseError> {
        match self.peek() {
            None | Some("|") | Some(")") => Ok(None),
            Some("(") => {
                self.pop();
                let regex = self.altern()?;
                if self.peek() != Some(")") {
                    return Err(ParseError::new(
                        0,
                        format!(
                            "Unbalanced ')' in phrase or parse expression '{}'",
                            self.expr
                        ),
                    ));
                }
                self.pop();
                Ok(Some(regex))
            }
            Some(op @ ("*" | "?" | "+")) => Err(ParseError::new(
                0,
                format!(
                    "Misplaced operator '{}' in phrase or parse expression '{}'",
                    op, self.expr
                ),
            )),
            Some(_) => Ok(Some(Regexp::Atom(self.pop().unwrap()))),
        }
    }
}
