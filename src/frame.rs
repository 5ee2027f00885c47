//! Frames: labeled projections of matches from a match tree.
//!
//! A frame rule names an anchor extractor and a set of slots, each defined
//! by a path of extractor names. For every anchor match the engine walks
//! the submatch tree along each path and files the matches of the path's
//! last name under the slot, merging frames whose anchor matches share an
//! extent.

use crate::manager::Manager;
use crate::matches::Match;
use crate::{MatchError, MatchResult, ParseError, Requirement, Substitutions};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
/// The value of one frame slot: a single match, a set of matches, or
/// nested frames when the slot path ends at another frame rule.
pub enum SlotValue {
    One(Match),
    Many(Vec<Match>),
    Frames(Vec<Frame>),
}

#[derive(Debug, Clone, PartialEq, Default)]
/// A mapping from slot name to extracted values. Slot value lists behave
/// as sets under match equality (extent comparison).
pub struct Frame {
    fields: BTreeMap<String, SlotValue>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &BTreeMap<String, SlotValue> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add a match to a slot, converting a single value to a list when a
    /// second distinct match arrives.
    pub fn add(&mut self, slot: &str, value: Match) {
        let replacement = match self.fields.remove(slot) {
            None => SlotValue::One(value),
            Some(SlotValue::One(existing)) => {
                if existing == value {
                    SlotValue::One(existing)
                } else {
                    SlotValue::Many(vec![existing, value])
                }
            }
            Some(SlotValue::Many(mut values)) => {
                if !values.contains(&value) {
                    values.push(value);
                }
                SlotValue::Many(values)
            }
            Some(frames @ SlotValue::Frames(_)) => frames,
        };
        self.fields.insert(slot.to_string(), replacement);
    }

    /// Add a nested frame to a slot.
    pub fn add_frame(&mut self, slot: &str, frame: Frame) {
        let replacement = match self.fields.remove(slot) {
            Some(SlotValue::Frames(mut frames)) => {
                if !frames.contains(&frame) {
                    frames.push(frame);
                }
                SlotValue::Frames(frames)
            }
            _ => SlotValue::Frames(vec![frame]),
        };
        self.fields.insert(slot.to_string(), replacement);
    }

    /// Add the fields and values of another frame that are not present.
    pub fn merge(&mut self, other: Frame) {
        for (slot, value) in other.fields {
            match value {
                SlotValue::One(m) => self.add(&slot, m),
                SlotValue::Many(ms) => {
                    for m in ms {
                        self.add(&slot, m);
                    }
                }
                SlotValue::Frames(frames) => {
                    for frame in frames {
                        self.add_frame(&slot, frame);
                    }
                }
            }
        }
    }

    /// One frame subsumes another if it contains all of the same fields
    /// with the same values.
    pub fn subsumes(&self, other: &Frame) -> bool {
        other
            .fields
            .iter()
            .all(|(slot, value)| self.fields.get(slot) == Some(value))
    }

    /// A JSON-compatible representation; matches are represented by their
    /// matching text.
    pub fn as_json_value(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (slot, value) in &self.fields {
            let json = match value {
                SlotValue::One(m) => {
                    serde_json::Value::String(m.matching_text().to_string())
                }
                SlotValue::Many(ms) => serde_json::Value::Array(
                    ms.iter()
                        .map(|m| serde_json::Value::String(m.matching_text().to_string()))
                        .collect(),
                ),
                SlotValue::Frames(frames) => {
                    if frames.len() == 1 {
                        frames[0].as_json_value()
                    } else {
                        serde_json::Value::Array(
                            frames.iter().map(|f| f.as_json_value()).collect(),
                        )
                    }
                }
            };
            object.insert(slot.clone(), json);
        }
        serde_json::Value::Object(object)
    }

    pub fn as_json(&self) -> String {
        self.as_json_value().to_string()
    }
}

#[derive(Debug, Clone)]
/// A compiled frame rule.
pub struct FrameExtractor {
    pub anchor: String,
    slots: Vec<(String, Vec<String>)>,
}

impl FrameExtractor {
    pub fn new(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            slots: Vec::new(),
        }
    }

    pub fn add_slot(&mut self, name: impl Into<String>, path: Vec<String>) {
        self.slots.push((name.into(), path));
    }

    pub fn slots(&self) -> &[(String, Vec<String>)] {
        &self.slots
    }

    /// Project a frame from one anchor match. A slot whose path ends at
    /// another frame rule projects nested frames from the slot matches.
    pub fn extract_from_match(
        &self,
        mgr: &Rc<Manager>,
        anchor_match: &Match,
        subst: &Substitutions,
    ) -> MatchResult<Frame> {
        let mut frame = Frame::new();
        for (slot, path) in &self.slots {
            let nested = path.last().and_then(|name| mgr.lookup_frame(name));
            for hit in anchor_match.query(path) {
                match &nested {
                    Some(inner) => {
                        frame.add_frame(slot, inner.extract_from_match(mgr, hit, subst)?);
                    }
                    None => frame.add(slot, hit.clone()),
                }
            }
        }
        Ok(frame)
    }

    pub fn requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<HashSet<Requirement>> {
        mgr.requirements(&self.anchor, subst)
    }
}

static TOKEN_EXPRESSION: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?:\w+\.)*\w+|\S").unwrap());
static IDENTIFIER: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^(?:\w+\.)*\w+$").unwrap());
static PLAIN_NAME: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"^\w+$").unwrap());

/// Parser for `frame(anchor, slot = name1 name2 ..., ...)` expressions.
pub struct FrameExpression {
    expr: String,
    toks: Vec<String>,
}

impl FrameExpression {
    pub fn parse(expr: &str, mgr: &Rc<Manager>) -> MatchResult<FrameExtractor> {
        let toks = TOKEN_EXPRESSION
            .find_iter(expr)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut parser = Self {
            expr: expr.to_string(),
            toks,
        };
        let extractor = parser.frame(mgr)?;
        if !parser.toks.is_empty() {
            return Err(ParseError::new(
                0,
                format!(
                    "Extra tokens starting with '{}' in frame expression '{}'",
                    parser.toks[0], parser.expr
                ),
            )
            .into());
        }
        Ok(extractor)
    }

    fn pop(&mut self) -> Result<String, ParseError> {
        if self.toks.is_empty() {
            Err(ParseError::new(
                0,
                format!("Unexpected end of frame expression '{}'", self.expr),
            ))
        } else {
            Ok(self.toks.remove(0))
        }
    }

    fn peek(&self) -> Option<&str> {
        self.toks.first().map(|t| t.as_str())
    }

    fn expect(&mut self, expected: &str) -> Result<(), ParseError> {
        let tok = self.pop()?;
        if tok != expected {
            return Err(ParseError::new(
                0,
                format!(
                    "Expected '{}', got '{}' in frame expression '{}'",
                    expected, tok, self.expr
                ),
            ));
        }
        Ok(())
    }

    fn frame(&mut self, mgr: &Rc<Manager>) -> MatchResult<FrameExtractor> {
        self.expect("frame")?;
        self.expect("(")?;
        let anchor = self.pop()?;
        if !PLAIN_NAME.is_match(&anchor) {
            return Err(ParseError::new(
                0,
                format!(
                    "Illegal anchor name '{}' in frame expression '{}'",
                    anchor, self.expr
                ),
            )
            .into());
        }
        if !mgr.extractor_defined(&anchor) {
            return Err(MatchError::UnresolvedName(anchor));
        }
        let mut extractor = FrameExtractor::new(anchor);
        while self.peek() == Some(",") {
            self.pop()?;
            let slot = self.pop()?;
            if !PLAIN_NAME.is_match(&slot) {
                return Err(ParseError::new(
                    0,
                    format!(
                        "Illegal slot name '{}' in frame expression '{}'",
                        slot, self.expr
                    ),
                )
                .into());
            }
            self.expect("=")?;
            let mut path = Vec::new();
            while let Some(tok) = self.peek() {
                if !IDENTIFIER.is_match(tok) {
                    break;
                }
                path.push(self.pop()?);
            }
            if path.is_empty() {
                return Err(ParseError::new(
                    0,
                    format!(
                        "Empty path for slot '{}' in frame expression '{}'",
                        slot, self.expr
                    ),
                )
                .into());
            }
            extractor.add_slot(slot, path);
        }
        self.expect(")")?;
        Ok(extractor)
    }
}
