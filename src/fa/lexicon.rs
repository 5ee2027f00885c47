//! A lexicon matcher: efficient storage and longest-prefix matching of
//! literal token sequences loaded from external word lists, as imported by
//! the `L...->` rule form.

use crate::sequence::TokenSequence;
use crate::{MatchError, MatchResult};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
struct LexiconNode {
    /// A payload marks the node as a complete entry rather than a prefix.
    payload: Option<serde_json::Value>,
    children: HashMap<String, LexiconNode>,
}

#[derive(Debug)]
/// A prefix tree over token strings. Plain word-list entries carry the
/// payload `true`; CSV rows carry a column-name to value object.
pub struct Lexicon {
    root: LexiconNode,
    case_insensitive: bool,
}

impl Lexicon {
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            root: LexiconNode::default(),
            case_insensitive,
        }
    }

    pub fn load_from_strings<'a>(&mut self, entries: impl IntoIterator<Item = &'a str>) {
        for entry in entries {
            self.insert(entry, serde_json::Value::Bool(true));
        }
    }

    /// Each line of the file is one lexicon entry.
    pub fn load_from_text(&mut self, path: &Path) -> MatchResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|err| MatchError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        self.load_from_strings(contents.lines());
        Ok(())
    }

    /// The target column of each row is the entry; the payload maps header
    /// names to the row's values.
    pub fn load_from_csv(&mut self, path: &Path, target_column: usize) -> MatchResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|err| MatchError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut headers: Option<Vec<String>> = None;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let row = split_csv_line(line);
            match &headers {
                None => headers = Some(row),
                Some(names) => {
                    let entry = match row.get(target_column) {
                        Some(entry) => entry.clone(),
                        None => continue,
                    };
                    let payload = serde_json::Value::Object(
                        names
                            .iter()
                            .zip(row.iter())
                            .map(|(name, value)| {
                                (name.clone(), serde_json::Value::String(value.clone()))
                            })
                            .collect(),
                    );
                    self.insert(&entry, payload);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, entry: &str, payload: serde_json::Value) {
        let entry = if self.case_insensitive {
            entry.to_lowercase()
        } else {
            entry.to_string()
        };
        let tokens = TokenSequence::simple_word_tokens(&entry);
        if tokens.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for tok in tokens {
            node = node.children.entry(tok).or_default();
        }
        node.payload = Some(payload);
    }

    /// Entries matching the tokens starting at `at`, as pairs of exclusive
    /// end index and payload.
    pub fn matches(
        &self,
        seq: &TokenSequence,
        at: usize,
        end: usize,
    ) -> Vec<(usize, serde_json::Value)> {
        let mut result = Vec::new();
        let mut node = &self.root;
        let mut at = at;
        while at < end {
            let tok = if self.case_insensitive {
                seq.token(at).to_lowercase()
            } else {
                seq.token(at).to_string()
            };
            match node.children.get(&tok) {
                Some(next) => {
                    if let Some(payload) = &next.payload {
                        result.push((at + 1, payload.clone()));
                    }
                    node = next;
                }
                None => break,
            }
            at += 1;
        }
        result
    }
}

/// Minimal CSV field splitting with double-quote handling.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if quoted && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    quoted = !quoted;
                }
            }
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
