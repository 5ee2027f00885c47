//! The token test taxonomy: boolean predicates over a single token.
//!
//! Token tests are the leaves of the extractor graph. They are referenced
//! from phrase and parse rules with `&name`, combined with `and`, `or` and
//! `not`, and can delegate to other named tests through the manager.

mod expression;

pub use expression::TokenTestExpression;

use crate::manager::Manager;
use crate::matches::Match;
use crate::sequence::TokenSequence;
use crate::{MatchError, MatchResult, Requirement, Substitutions};
use std::collections::HashSet;
use std::rc::Rc;

/// External collaborator used by radius tests. Implementations map terms
/// into an embedding space and report a divergence between two terms,
/// smaller meaning closer. `None` means a term is unknown to the expander.
pub trait TermExpander {
    fn divergence(&self, anchor: &str, term: &str) -> Option<f64>;
}

#[derive(Debug, Clone)]
/// A boolean predicate over one token.
pub enum TokenTest {
    /// Matches any token. Pre-registered as `ANY`.
    Any,
    /// `/RE/i?`, a regular expression search over the token text.
    Regex {
        re: regex::Regex,
        case_sensitive: bool,
    },
    /// `<SUB>i?`, a substring test.
    Substring {
        substring: String,
        case_sensitive: bool,
    },
    /// `{tok tok ...}i?s?`, membership in a token set. With `s` the lemma
    /// annotation is tested instead of the surface form.
    Membership {
        members: HashSet<String>,
        case_sensitive: bool,
        stemming: bool,
    },
    /// `label[tok tok ...]`, membership of the token's annotation under
    /// `label`, tolerating set-valued annotations.
    Lookup {
        label: String,
        members: HashSet<String>,
    },
    /// `{terms}R a?`, a radius test against the manager's term expander.
    Radius {
        terms: HashSet<String>,
        radius: f64,
        match_all: bool,
    },
    /// `&name`, a reference to another test resolved through the manager
    /// with substitutions.
    Reference { name: String },
    And(Vec<TokenTest>),
    Or(Vec<TokenTest>),
    Not(Box<TokenTest>),
}

impl TokenTest {
    /// Whether the test accepts the token at index `at`.
    pub fn matches_at(
        &self,
        seq: &TokenSequence,
        at: usize,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<bool> {
        match self {
            TokenTest::Membership {
                members,
                case_sensitive,
                stemming: true,
            } => {
                if !seq.has_annotations("lemma") {
                    return Err(MatchError::MissingAnnotation {
                        layer: "lemma".to_string(),
                    });
                }
                let lemma = seq.lemma(at);
                let lemma = if *case_sensitive {
                    lemma
                } else {
                    lemma.to_lowercase()
                };
                Ok(members.contains(&lemma))
            }
            TokenTest::Lookup { label, members } => {
                match seq.annotation(label, at) {
                    Some(annotation) => {
                        Ok(annotation.intersects(&|value| members.contains(value)))
                    }
                    None => Ok(false),
                }
            }
            TokenTest::Reference { name } => {
                let (test, home, merged) = mgr.lookup_test(name, subst)?;
                test.matches_at(seq, at, &home, &merged)
            }
            TokenTest::And(subs) => {
                for test in subs {
                    if !test.matches_at(seq, at, mgr, subst)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TokenTest::Or(subs) => {
                for test in subs {
                    if test.matches_at(seq, at, mgr, subst)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            TokenTest::Not(sub) => Ok(!sub.matches_at(seq, at, mgr, subst)?),
            _ => self.matches_token(seq.token(at), mgr, subst),
        }
    }

    /// Whether the test accepts a bare token string. Used for tokens and
    /// for dependency edge labels in parse rules. Lookup and stemming
    /// membership tests cannot match a raw token.
    pub fn matches_token(
        &self,
        tok: &str,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<bool> {
        match self {
            TokenTest::Any => Ok(true),
            TokenTest::Regex { re, .. } => Ok(re.is_match(tok)),
            TokenTest::Substring {
                substring,
                case_sensitive,
            } => {
                if *case_sensitive {
                    Ok(tok.contains(substring.as_str()))
                } else {
                    Ok(tok.to_lowercase().contains(substring.as_str()))
                }
            }
            TokenTest::Membership {
                members,
                case_sensitive,
                ..
            } => {
                if *case_sensitive {
                    Ok(members.contains(tok))
                } else {
                    Ok(members.contains(&tok.to_lowercase()))
                }
            }
            TokenTest::Lookup { label, .. } => Err(MatchError::MissingAnnotation {
                layer: label.clone(),
            }),
            TokenTest::Radius {
                terms,
                radius,
                match_all,
            } => {
                let expander = mgr.expander().ok_or(MatchError::MissingExpander)?;
                let tok = tok.to_lowercase();
                if terms.contains(&tok) {
                    return Ok(true);
                }
                let mut within = terms
                    .iter()
                    .map(|anchor| matches!(expander.divergence(anchor, &tok), Some(d) if d < *radius));
                if *match_all {
                    Ok(within.all(|w| w))
                } else {
                    Ok(within.any(|w| w))
                }
            }
            TokenTest::Reference { name } => {
                let (test, home, merged) = mgr.lookup_test(name, subst)?;
                test.matches_token(tok, &home, &merged)
            }
            TokenTest::And(subs) => {
                for test in subs {
                    if !test.matches_token(tok, mgr, subst)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TokenTest::Or(subs) => {
                for test in subs {
                    if test.matches_token(tok, mgr, subst)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            TokenTest::Not(sub) => Ok(!sub.matches_token(tok, mgr, subst)?),
        }
    }

    /// Generate one single-token match at `start` if the test accepts it.
    pub fn matches(
        &self,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        if start < end && self.matches_at(seq, start, mgr, subst)? {
            Ok(vec![Match::token(seq.clone(), start, None)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Generate all single-token matches within the bounds.
    pub fn scan(
        &self,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let mut result = Vec::new();
        for at in start..end {
            if self.matches_at(seq, at, mgr, subst)? {
                result.push(Match::token(seq.clone(), at, None));
            }
        }
        Ok(result)
    }

    /// The annotation layers this test depends on.
    pub fn requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<HashSet<Requirement>> {
        let mut req = HashSet::new();
        match self {
            TokenTest::Lookup { label, .. } => {
                match label.as_str() {
                    "pos" => {
                        req.insert(Requirement::Pos);
                    }
                    "ner" => {
                        req.insert(Requirement::Ner);
                    }
                    "lemma" => {
                        req.insert(Requirement::Lemma);
                    }
                    _ => {}
                }
            }
            TokenTest::Membership { stemming: true, .. } => {
                req.insert(Requirement::Lemma);
            }
            TokenTest::Radius { .. } => {
                req.insert(Requirement::Embeddings);
            }
            TokenTest::Reference { name } => {
                let (test, home, merged) = mgr.lookup_test(name, subst)?;
                req.extend(test.requirements(&home, &merged)?);
            }
            TokenTest::And(subs) | TokenTest::Or(subs) => {
                for sub in subs {
                    req.extend(sub.requirements(mgr, subst)?);
                }
            }
            TokenTest::Not(sub) => {
                req.extend(sub.requirements(mgr, subst)?);
            }
            _ => {}
        }
        Ok(req)
    }
}
