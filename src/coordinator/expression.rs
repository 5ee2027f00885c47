//! Parser for coordinator expressions.
//!
//! A bare extractor name `X` is shorthand for `match(X, _)`. Operators take
//! named extractors, feeds, proximity counts and the `invert` flag in the
//! arity documented for each operator.

use super::{Coordinator, WhenExpr};
use crate::ParseError;
use once_cell::sync::Lazy;

static TOKEN_EXPRESSION: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\w+(?:\.\w+)*|\S").unwrap());

static EXTRACTOR_NAME: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^\w+(?:\.\w+)*$").unwrap());

/// Parser state for one coordinator expression.
pub struct CoordinatorExpression {
    expr: String,
    toks: Vec<String>,
}

impl CoordinatorExpression {
    pub fn parse(expr: &str) -> Result<Coordinator, ParseError> {
        let toks = TOKEN_EXPRESSION
            .find_iter(expr)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut parser = Self {
            expr: expr.to_string(),
            toks,
        };
        let coordinator = parser.parse_expr()?;
        if !parser.toks.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Extra tokens starting with '{}' in coordinator expression '{}'",
                    parser.toks[0], parser.expr
                ),
            ));
        }
        Ok(coordinator)
    }

    fn peek(&self) -> Option<&str> {
        self.toks.first().map(|t| t.as_str())
    }

    fn pop(&mut self) -> Result<String, ParseError> {
        if self.toks.is_empty() {
            Err(ParseError::new(
                0,
                format!(
                    "Unexpected end of coordinator expression '{}'",
                    self.expr
                ),
            ))
        } else {
            Ok(self.toks.remove(0))
        }
    }

    fn expect(&mut self, expected: &str) -> Result<(), ParseError> {
        let tok = self.pop()?;
        if tok != expected {
            return Err(ParseError::new(
                0,
                format!(
                    "Expected '{}' but got '{}' in coordinator expression '{}'",
                    expected, tok, self.expr
                ),
            ));
        }
        Ok(())
    }

    fn extractor_name(&mut self) -> Result<String, ParseError> {
        let tok = self.pop()?;
        if !EXTRACTOR_NAME.is_match(&tok) {
            return Err(ParseError::new(
                0,
                format!(
                    "Illegal extractor name '{}' in coordinator expression '{}'",
                    tok, self.expr
                ),
            ));
        }
        Ok(tok)
    }

    /// Consume an optional trailing `, invert` before the closing paren.
    fn invert_flag(&mut self) -> Result<bool, ParseError> {
        if self.peek() == Some(",") {
            self.pop()?;
            let kw = self.pop()?;
            if kw != "invert" {
                return Err(ParseError::new(
                    0,
                    format!(
                        "Invalid inversion flag '{}' in coordinator expression '{}'",
                        kw, self.expr
                    ),
                ));
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn proximity(&mut self) -> Result<usize, ParseError> {
        let tok = self.pop()?;
        tok.parse().map_err(|_| {
            ParseError::new(
                0,
                format!(
                    "Expected non-negative integer but got '{}' in coordinator expression '{}'",
                    tok, self.expr
                ),
            )
        })
    }

    fn parse_expr(&mut self) -> Result<Coordinator, ParseError> {
        let op = self.pop()?;

        if op == "_" {
            return Ok(Coordinator::Base);
        }

        // A lone extractor name is match(name, _).
        if self.peek() != Some("(") && EXTRACTOR_NAME.is_match(&op) {
            return Ok(Coordinator::Match {
                name: op,
                feed: Box::new(Coordinator::Base),
            });
        }

        self.expect("(")?;
        let coordinator = match op.as_str() {
            "match" | "select" => {
                let name = self.extractor_name()?;
                self.expect(",")?;
                let feed = Box::new(self.parse_expr()?);
                if op == "match" {
                    Coordinator::Match { name, feed }
                } else {
                    Coordinator::Select { name, feed }
                }
            }
            "filter" | "prefix" | "suffix" => {
                let name = self.extractor_name()?;
                self.expect(",")?;
                let feed = Box::new(self.parse_expr()?);
                let inverted = self.invert_flag()?;
                match op.as_str() {
                    "filter" => Coordinator::Filter {
                        name,
                        feed,
                        inverted,
                    },
                    "prefix" => Coordinator::Prefix {
                        name,
                        feed,
                        inverted,
                    },
                    _ => Coordinator::Suffix {
                        name,
                        feed,
                        inverted,
                    },
                }
            }
            "near" | "precedes" | "follows" | "count" => {
                let name = self.extractor_name()?;
                self.expect(",")?;
                let param = self.proximity()?;
                self.expect(",")?;
                let feed = Box::new(self.parse_expr()?);
                let inverted = self.invert_flag()?;
                match op.as_str() {
                    "near" => Coordinator::Near {
                        name,
                        feed,
                        proximity: param,
                        inverted,
                    },
                    "precedes" => Coordinator::Precedes {
                        name,
                        feed,
                        proximity: param,
                        inverted,
                    },
                    "follows" => Coordinator::Follows {
                        name,
                        feed,
                        proximity: param,
                        inverted,
                    },
                    _ => Coordinator::Count {
                        name,
                        feed,
                        count: param,
                        inverted,
                    },
                }
            }
            "inter" | "union" | "diff" => {
                let mut feeds = vec![self.parse_expr()?];
                while self.peek() == Some(",") {
                    self.pop()?;
                    feeds.push(self.parse_expr()?);
                }
                match op.as_str() {
                    "inter" => Coordinator::Inter(feeds),
                    "union" => Coordinator::Union(feeds),
                    _ => Coordinator::Diff(feeds),
                }
            }
            "contains" | "contained_by" | "overlaps" => {
                let left = Box::new(self.parse_expr()?);
                self.expect(",")?;
                let right = Box::new(self.parse_expr()?);
                match op.as_str() {
                    "contains" => Coordinator::Contains { left, right },
                    "contained_by" => Coordinator::ContainedBy { left, right },
                    _ => Coordinator::Overlaps { left, right },
                }
            }
            "connects" => {
                let name = self.extractor_name()?;
                self.expect(",")?;
                let left = Box::new(self.parse_expr()?);
                self.expect(",")?;
                let right = Box::new(self.parse_expr()?);
                Coordinator::Connects { name, left, right }
            }
            "haspath" => {
                let left = Box::new(self.parse_expr()?);
                self.expect(",")?;
                let right = Box::new(self.parse_expr()?);
                self.expect(",")?;
                let path = self.quoted_path()?;
                Coordinator::HasPath { left, right, path }
            }
            "when" => {
                let boolean = self.when_expr()?;
                self.expect(",")?;
                let feed = Box::new(self.parse_expr()?);
                Coordinator::When { boolean, feed }
            }
            "widen" | "merge" => {
                let feed = Box::new(self.parse_expr()?);
                if op == "widen" {
                    Coordinator::Widen(feed)
                } else {
                    Coordinator::Merge(feed)
                }
            }
            _ => {
                return Err(ParseError::new(
                    0,
                    format!(
                        "Illegal operator '{}' in coordinator expression '{}'",
                        op, self.expr
                    ),
                ));
            }
        };
        self.expect(")")?;
        Ok(coordinator)
    }

    fn quoted_path(&mut self) -> Result<Vec<String>, ParseError> {
        let quote = self.pop()?;
        if quote != "\"" && quote != "'" {
            return Err(ParseError::new(
                0,
                format!(
                    "No quoted path present near '{}' in coordinator expression '{}'",
                    quote, self.expr
                ),
            ));
        }
        let mut path = Vec::new();
        loop {
            let tok = self.pop()?;
            if tok == quote {
                break;
            }
            path.push(tok);
        }
        Ok(path)
    }

    // orexpr -> andexpr ( 'or' andexpr )*
    fn when_expr(&mut self) -> Result<WhenExpr, ParseError> {
        let mut subs = vec![self.when_and()?];
        while self.peek() == Some("or") {
            self.pop()?;
            subs.push(self.when_and()?);
        }
        if subs.len() > 1 {
            Ok(WhenExpr::Or(subs))
        } else {
            Ok(subs.pop().unwrap())
        }
    }

    // andexpr -> notexpr ( 'and' notexpr )*
    fn when_and(&mut self) -> Result<WhenExpr, ParseError> {
        let mut subs = vec![self.when_not()?];
        while self.peek() == Some("and") {
            self.pop()?;
            subs.push(self.when_not()?);
        }
        if subs.len() > 1 {
            Ok(WhenExpr::And(subs))
        } else {
            Ok(subs.pop().unwrap())
        }
    }

    // notexpr -> atom | 'not' atom
    fn when_not(&mut self) -> Result<WhenExpr, ParseError> {
        if self.peek() == Some("not") {
            self.pop()?;
            Ok(WhenExpr::Not(Box::new(self.when_atom()?)))
        } else {
            self.when_atom()
        }
    }

    // atom -> REF | '(' orexpr ')'
    fn when_atom(&mut self) -> Result<WhenExpr, ParseError> {
        let tok = self.pop()?;
        if tok == "(" {
            let expr = self.when_expr()?;
            self.expect(")")?;
            return Ok(expr);
        }
        if EXTRACTOR_NAME.is_match(&tok) {
            return Ok(WhenExpr::Ref(tok));
        }
        Err(ParseError::new(
            0,
            format!(
                "Unparsable atom '{}' in boolean expression of '{}'",
                tok, self.expr
            ),
        ))
    }
}
