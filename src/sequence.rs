//! The annotated token sequence consumed by all extractors.
//!
//! A [TokenSequence] is produced by the caller (tokenization and NLP
//! annotation are external concerns) and borrowed by every match emitted
//! against it. It carries the tokens with their character offsets, optional
//! per-token annotation layers such as part of speech or lemma, and the
//! dependency edge set as child and parent adjacency maps.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A per-token annotation value. Layers such as `pos` hold a single string
/// per token, while layers written by phrase-level annotators may hold a
/// set of values.
pub enum Annotation {
    One(String),
    Many(Vec<String>),
}

impl Annotation {
    /// Whether any of the annotation values is a member of the given set.
    pub fn intersects(&self, members: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Annotation::One(value) => members(value),
            Annotation::Many(values) => values.iter().any(|v| members(v)),
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            Annotation::One(value) => Some(value),
            Annotation::Many(values) => values.first().map(|v| v.as_str()),
        }
    }
}

/// An ordered sequence of tokens with character offsets, optional per-token
/// annotation layers, and a dependency edge set.
///
/// Offsets and lengths address the source `text`. The `offset` field places
/// the sequence within a larger document, so match offsets can be reported
/// either sentence-relative or document-absolute.
///
/// Dependency edges are held redundantly as `up[i]` (parent index, label)
/// and `down[i]` (child index, label) adjacency lists. A parent index of −1
/// marks a root token. Well-formed input has at most one non-root parent
/// per token, but the matcher tolerates ties.
pub struct TokenSequence {
    pub text: String,
    pub tokens: Vec<String>,
    pub offsets: Vec<usize>,
    pub lengths: Vec<usize>,
    pub offset: usize,
    annotations: HashMap<String, Vec<Option<Annotation>>>,
    up: Vec<Vec<(i32, String)>>,
    down: Vec<Vec<(usize, String)>>,
}

impl TokenSequence {
    pub fn new(
        text: impl Into<String>,
        tokens: Vec<String>,
        offsets: Vec<usize>,
        lengths: Vec<usize>,
    ) -> Self {
        assert_eq!(tokens.len(), offsets.len());
        assert_eq!(tokens.len(), lengths.len());
        let n = tokens.len();
        Self {
            text: text.into(),
            tokens,
            offsets,
            lengths,
            offset: 0,
            annotations: HashMap::new(),
            up: vec![Vec::new(); n],
            down: vec![Vec::new(); n],
        }
    }

    /// Build a sequence from bare tokens, joining them with single spaces
    /// to synthesize the source text and offsets.
    pub fn from_tokens(tokens: &[&str]) -> Self {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(tokens.len());
        let mut lengths = Vec::with_capacity(tokens.len());
        for (i, tok) in tokens.iter().enumerate() {
            if i > 0 {
                text.push(' ');
            }
            offsets.push(text.len());
            lengths.push(tok.len());
            text.push_str(tok);
        }
        TokenSequence::new(
            text,
            tokens.iter().map(|t| t.to_string()).collect(),
            offsets,
            lengths,
        )
    }

    /// Split text into simple word tokens: maximal alphanumeric runs and
    /// single non-space punctuation characters. This is the tokenization
    /// used for lexicon entries, which must agree with how callers tokenize
    /// the words being looked up.
    pub fn simple_word_tokens(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch.is_alphanumeric() || ch == '_' {
                current.push(ch);
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                if !ch.is_whitespace() {
                    tokens.push(ch.to_string());
                }
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, i: usize) -> &str {
        &self.tokens[i]
    }

    /// Attach an annotation layer. The layer must supply one optional value
    /// per token.
    pub fn set_annotations(&mut self, label: impl Into<String>, values: Vec<Option<Annotation>>) {
        assert_eq!(values.len(), self.tokens.len());
        self.annotations.insert(label.into(), values);
    }

    /// Builder-style variant of [set_annotations](Self::set_annotations)
    /// taking plain strings.
    pub fn with_annotations(mut self, label: &str, values: &[&str]) -> Self {
        let layer = values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    None
                } else {
                    Some(Annotation::One(v.to_string()))
                }
            })
            .collect();
        self.set_annotations(label, layer);
        self
    }

    pub fn has_annotations(&self, label: &str) -> bool {
        self.annotations.contains_key(label)
    }

    pub fn annotation(&self, label: &str, i: usize) -> Option<&Annotation> {
        self.annotations
            .get(label)
            .and_then(|layer| layer.get(i))
            .and_then(|v| v.as_ref())
    }

    /// Install the dependency edge set from (child, parent, label) triples.
    /// A parent of −1 marks the child as a root token.
    pub fn set_dependencies(&mut self, edges: &[(usize, i32, &str)]) {
        let n = self.tokens.len();
        self.up = vec![Vec::new(); n];
        self.down = vec![Vec::new(); n];
        for (child, parent, label) in edges {
            self.up[*child].push((*parent, label.to_string()));
            if *parent >= 0 {
                self.down[*parent as usize].push((*child, label.to_string()));
            }
        }
    }

    /// Builder-style variant of [set_dependencies](Self::set_dependencies).
    pub fn with_dependencies(mut self, edges: &[(usize, i32, &str)]) -> Self {
        self.set_dependencies(edges);
        self
    }

    pub fn up_dependencies(&self, i: usize) -> &[(i32, String)] {
        &self.up[i]
    }

    pub fn down_dependencies(&self, i: usize) -> &[(usize, String)] {
        &self.down[i]
    }

    /// Whether token `i` is a root of the dependency graph.
    pub fn is_root(&self, i: usize) -> bool {
        self.up[i].iter().any(|(parent, _)| *parent == -1)
    }

    /// The character offset of token `i`, also accepting `i == len()` as
    /// the end of the last token.
    pub fn normalized_offset(&self, i: usize) -> usize {
        if i < self.offsets.len() {
            self.offsets[i]
        } else if i == self.offsets.len() && i > 0 {
            self.offsets[i - 1] + self.lengths[i - 1]
        } else {
            0
        }
    }

    /// The source text covered by the half-open token span `[begin, end)`.
    pub fn span_text(&self, begin: usize, end: usize) -> &str {
        if begin >= end || begin >= self.len() {
            return "";
        }
        let start_offset = self.offsets[begin];
        let end_offset = self.offsets[end - 1] + self.lengths[end - 1];
        &self.text[start_offset..end_offset]
    }

    /// The lemma annotation of token `i`, falling back to the lowercased
    /// surface form when no lemma layer is present.
    pub fn lemma(&self, i: usize) -> String {
        match self.annotation("lemma", i).and_then(|a| a.first()) {
            Some(lemma) => lemma.to_lowercase(),
            None => self.tokens[i].to_lowercase(),
        }
    }
}

impl std::fmt::Debug for TokenSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSequence")
            .field("tokens", &self.tokens)
            .field("offset", &self.offset)
            .finish()
    }
}
