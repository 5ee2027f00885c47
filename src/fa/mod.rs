//! Nondeterministic finite automata over tokens and dependency arcs.
//!
//! States live in an arena with integer ids; transitions hold destination
//! ids only. Composition follows the Thompson construction: each regex
//! operator produces a fresh fragment and wires it in with null
//! transitions. The redundant state copying during composition keeps the
//! construction simple.

mod lexicon;
mod parse;
mod phrase;

pub use lexicon::Lexicon;
pub use phrase::{PatternRule, PhraseExtractor};

use crate::manager::Manager;
use crate::{MatchError, MatchResult, ParseError, Requirement, Substitutions};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt::Write;
use std::rc::Rc;

/// Maximum number of tokens considered from a starting point while
/// matching, defending against runaway patterns on long sequences.
const MAX_MATCH: usize = 300;

static REFERENCE_ATOM: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^[&@]([/\\]?)([\w.]+)$").unwrap());
static DIRECTION_PREFIX: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^([/\\])(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Whether an NFA consumes tokens or walks dependency edges.
pub enum NfaKind {
    Phrase,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Direction restriction on an arc transition: `/` follows only up edges
/// (child to parent), `\` only down edges.
pub enum ArcDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub enum TransitionLabel {
    /// An ε transition.
    Null,
    /// A literal token or edge label. `raw` keeps any direction prefix for
    /// literal token comparison in phrase rules.
    Symbol {
        raw: String,
        symbol: String,
        direction: Option<ArcDirection>,
    },
    /// A referenced token test.
    Test {
        name: String,
        direction: Option<ArcDirection>,
    },
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub dest: usize,
    pub label: TransitionLabel,
}

#[derive(Debug, Clone)]
pub struct State {
    pub id: usize,
    pub transitions: Vec<Transition>,
    /// A callout state defers to another named extractor and exits through
    /// a single ε transition.
    pub callout: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Nfa {
    pub kind: NfaKind,
    pub name: Option<String>,
    pub case_insensitive: bool,
    pub max_match: usize,
    states: Vec<State>,
    initial: usize,
    finals: Vec<bool>,
}

fn decompose(symbol: &str) -> (String, Option<ArcDirection>) {
    match DIRECTION_PREFIX.captures(symbol) {
        Some(caps) => {
            let direction = if &caps[1] == "/" {
                ArcDirection::Up
            } else {
                ArcDirection::Down
            };
            (caps[2].to_string(), Some(direction))
        }
        None => (symbol.to_string(), None),
    }
}

impl Nfa {
    pub fn new(kind: NfaKind) -> Self {
        let mut nfa = Self {
            kind,
            name: None,
            case_insensitive: false,
            max_match: MAX_MATCH,
            states: Vec::new(),
            initial: 0,
            finals: Vec::new(),
        };
        let initial = nfa.add_state(None);
        nfa.initial = initial;
        nfa.finals[initial] = true;
        nfa
    }

    fn add_state(&mut self, callout: Option<String>) -> usize {
        let id = self.states.len();
        self.states.push(State {
            id,
            transitions: Vec::new(),
            callout,
        });
        self.finals.push(false);
        id
    }

    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn state(&self, sid: usize) -> &State {
        &self.states[sid]
    }

    pub fn is_final(&self, sid: usize) -> bool {
        self.finals[sid]
    }

    fn make_final(&mut self, sid: usize, fin: bool) {
        self.finals[sid] = fin;
    }

    fn final_states(&self) -> Vec<usize> {
        (0..self.states.len()).filter(|&s| self.finals[s]).collect()
    }

    fn add_transition(&mut self, src: usize, label: TransitionLabel) -> usize {
        let dest = self.add_state(None);
        self.states[src].transitions.push(Transition { dest, label });
        dest
    }

    /// Add an ε transition unless one to the same destination exists.
    fn add_unique_null(&mut self, src: usize, dest: usize) {
        let exists = self.states[src]
            .transitions
            .iter()
            .any(|t| t.dest == dest && matches!(t.label, TransitionLabel::Null));
        if !exists {
            self.states[src]
                .transitions
                .push(Transition {
                    dest,
                    label: TransitionLabel::Null,
                });
        }
    }

    /// Make this (fresh) NFA represent a single atom: a token test
    /// reference, a callout to another named expression, or a literal.
    /// The manager decides whether a reference denotes a token test.
    pub fn atom(&mut self, symbol: &str, mgr: &Rc<Manager>) -> MatchResult<()> {
        let initial = self.initial;
        let fin = if let Some(caps) = REFERENCE_ATOM.captures(symbol) {
            let direction = match &caps[1] {
                "/" => Some(ArcDirection::Up),
                "\\" => Some(ArcDirection::Down),
                _ => None,
            };
            let name = caps[2].to_string();
            if mgr.test_defined(&name) {
                self.add_transition(
                    initial,
                    TransitionLabel::Test { name, direction },
                )
            } else if direction.is_some() {
                return Err(MatchError::Syntax(ParseError::new(
                    0,
                    format!("Direction specified on missing test ({})", name),
                )));
            } else {
                // Callout: ε into a distinguished state carrying the
                // reference, with a single ε exit.
                let callout = self.add_state(Some(name));
                self.states[initial].transitions.push(Transition {
                    dest: callout,
                    label: TransitionLabel::Null,
                });
                self.add_transition(callout, TransitionLabel::Null)
            }
        } else {
            let (plain, direction) = decompose(symbol);
            self.add_transition(
                initial,
                TransitionLabel::Symbol {
                    raw: symbol.to_string(),
                    symbol: plain,
                    direction,
                },
            )
        };
        self.make_final(initial, false);
        self.make_final(fin, true);
        Ok(())
    }

    /// Copy another NFA's states into this arena, returning the id offset
    /// applied to the absorbed states. Finality is left to the caller.
    fn absorb(&mut self, fa: &Nfa) -> usize {
        let offset = self.states.len();
        for state in &fa.states {
            let id = state.id + offset;
            self.states.push(State {
                id,
                transitions: state
                    .transitions
                    .iter()
                    .map(|t| Transition {
                        dest: t.dest + offset,
                        label: t.label.clone(),
                    })
                    .collect(),
                callout: state.callout.clone(),
            });
            self.finals.push(false);
        }
        offset
    }

    /// Assemble the given NFAs in sequence, connected by ε transitions.
    pub fn concat(&mut self, fas: Vec<Nfa>) {
        for fa in fas {
            let finals = self.final_states();
            let offset = self.absorb(&fa);
            let init = fa.initial + offset;
            for state in finals {
                self.add_unique_null(state, init);
                self.make_final(state, false);
            }
            for sid in fa.final_states() {
                self.make_final(sid + offset, true);
            }
        }
    }

    /// Assemble the given NFAs as alternatives.
    pub fn altern(&mut self, fas: Vec<Nfa>) {
        let finals = self.final_states();
        for state in &finals {
            self.make_final(*state, false);
        }
        for fa in fas {
            let offset = self.absorb(&fa);
            let init = fa.initial + offset;
            for state in &finals {
                self.add_unique_null(*state, init);
            }
            for sid in fa.final_states() {
                self.make_final(sid + offset, true);
            }
        }
    }

    /// ε transitions from all final states back to the initial state.
    pub fn plus(&mut self) {
        let init = self.initial;
        for state in self.final_states() {
            self.add_unique_null(state, init);
        }
    }

    /// ε transitions from the initial state to all final states.
    pub fn opt(&mut self) {
        let init = self.initial;
        for state in self.final_states() {
            self.add_unique_null(init, state);
        }
    }

    pub fn star(&mut self) {
        self.plus();
        self.opt();
    }

    /// The transitive closure of the given states under ε transitions.
    /// After the first step, ε exits of callout states are not followed,
    /// since the callout has not been descended into yet.
    pub fn null_closure(&self, sids: &[usize]) -> HashSet<usize> {
        let mut sids: HashSet<usize> = sids.iter().copied().collect();
        let mut fresh: HashSet<usize> = sids
            .iter()
            .flat_map(|&s| self.states[s].transitions.iter())
            .filter(|t| matches!(t.label, TransitionLabel::Null))
            .map(|t| t.dest)
            .filter(|d| !sids.contains(d))
            .collect();
        while !fresh.is_empty() {
            sids.extend(fresh.iter().copied());
            fresh = fresh
                .iter()
                .filter(|&&s| self.states[s].callout.is_none())
                .flat_map(|&s| self.states[s].transitions.iter())
                .filter(|t| matches!(t.label, TransitionLabel::Null))
                .map(|t| t.dest)
                .filter(|d| !sids.contains(d))
                .collect();
        }
        sids
    }

    /// States reachable from `sid` by one or more ε transitions.
    pub fn null_transition_to(&self, sid: usize) -> Vec<usize> {
        let direct: Vec<usize> = self.states[sid]
            .transitions
            .iter()
            .filter(|t| matches!(t.label, TransitionLabel::Null))
            .map(|t| t.dest)
            .collect();
        let mut closure: Vec<usize> = self.null_closure(&direct).into_iter().collect();
        closure.sort_unstable();
        closure
    }

    /// All states reachable from this state by one non-ε transition
    /// matching the token at `at`, followed by any number of ε transitions.
    /// Each reached state carries the names of the token tests traversed to
    /// get there, so test matches can be attached as submatches.
    pub fn transit_one_token(
        &self,
        sid: usize,
        mgr: &Rc<Manager>,
        seq: &crate::TokenSequence,
        at: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<(usize, Vec<String>)>> {
        let mut result: Vec<(usize, Vec<String>)> = Vec::new();
        for t in &self.states[sid].transitions {
            let test_name = match &t.label {
                TransitionLabel::Null => continue,
                TransitionLabel::Symbol { raw, .. } => {
                    let matched = if self.case_insensitive {
                        seq.token(at).to_lowercase() == raw.to_lowercase()
                    } else {
                        seq.token(at) == raw
                    };
                    if !matched {
                        continue;
                    }
                    None
                }
                TransitionLabel::Test { name, .. } => {
                    let (test, home, merged) = mgr.lookup_test(name, subst)?;
                    if !test.matches_at(seq, at, &home, &merged)? {
                        continue;
                    }
                    Some(name.clone())
                }
            };
            for dest in self.null_closure(&[t.dest]) {
                match result.iter().position(|(s, _)| *s == dest) {
                    Some(i) => {
                        if let Some(name) = &test_name {
                            let names = &mut result[i].1;
                            if !names.iter().any(|n| n == name) {
                                names.push(name.clone());
                            }
                        }
                    }
                    None => {
                        let names = match &test_name {
                            Some(name) => vec![name.clone()],
                            None => Vec::new(),
                        };
                        result.push((dest, names));
                    }
                }
            }
        }
        Ok(result)
    }

    /// All (state, token) pairs reachable from this state by one non-ε arc
    /// transition whose label matches an edge from token `at`, followed by
    /// any number of ε transitions.
    pub fn transit_one_edge(
        &self,
        sid: usize,
        mgr: &Rc<Manager>,
        seq: &crate::TokenSequence,
        at: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<(usize, usize)>> {
        let mut result: Vec<(usize, usize)> = Vec::new();
        for t in &self.states[sid].transitions {
            let mut tokis: Vec<usize> = Vec::new();
            match &t.label {
                TransitionLabel::Null => continue,
                TransitionLabel::Symbol {
                    symbol, direction, ..
                } => {
                    if *direction != Some(ArcDirection::Down) {
                        for (parent, label) in seq.up_dependencies(at) {
                            if *parent >= 0 && label == symbol {
                                tokis.push(*parent as usize);
                            }
                        }
                    }
                    if *direction != Some(ArcDirection::Up) {
                        for (child, label) in seq.down_dependencies(at) {
                            if label == symbol {
                                tokis.push(*child);
                            }
                        }
                    }
                }
                TransitionLabel::Test { name, direction } => {
                    let (test, home, merged) = mgr.lookup_test(name, subst)?;
                    if *direction != Some(ArcDirection::Down) {
                        for (parent, label) in seq.up_dependencies(at) {
                            if *parent >= 0 && test.matches_token(label, &home, &merged)? {
                                tokis.push(*parent as usize);
                            }
                        }
                    }
                    if *direction != Some(ArcDirection::Up) {
                        for (child, label) in seq.down_dependencies(at) {
                            if test.matches_token(label, &home, &merged)? {
                                tokis.push(*child);
                            }
                        }
                    }
                }
            }
            for toki in tokis {
                for dest in self.null_closure(&[t.dest]) {
                    if !result.contains(&(dest, toki)) {
                        result.push((dest, toki));
                    }
                }
            }
        }
        Ok(result)
    }

    /// Aggregate the annotation requirements of every transition and
    /// callout in this automaton.
    pub fn requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<HashSet<Requirement>> {
        let mut req = HashSet::new();
        if self.kind == NfaKind::Parse {
            req.insert(Requirement::DepParse);
        }
        for state in &self.states {
            if let Some(name) = &state.callout {
                req.extend(mgr.requirements(name, subst)?);
            }
            for t in &state.transitions {
                if let TransitionLabel::Test { name, .. } = &t.label {
                    let (test, home, merged) = mgr.lookup_test(name, subst)?;
                    req.extend(test.requirements(&home, &merged)?);
                }
            }
        }
        Ok(req)
    }

    /// A human-readable representation of the automaton showing states and
    /// transitions. `>` marks the initial state and `@` final states.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for state in &self.states {
            if state.id == self.initial {
                out.push('>');
            }
            if self.finals[state.id] {
                out.push('@');
            }
            match &state.callout {
                Some(name) => writeln!(out, "{}:{}", state.id, name).unwrap(),
                None => writeln!(out, "{}", state.id).unwrap(),
            }
            for t in &state.transitions {
                match &t.label {
                    TransitionLabel::Null => writeln!(out, "  () -> {}", t.dest).unwrap(),
                    TransitionLabel::Symbol { raw, .. } => {
                        writeln!(out, "  ({}) -> {}", raw, t.dest).unwrap()
                    }
                    TransitionLabel::Test { name, .. } => {
                        writeln!(out, "  <{}> -> {}", name, t.dest).unwrap()
                    }
                }
            }
        }
        out
    }
}
