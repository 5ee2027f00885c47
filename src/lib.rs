//! Tokex is a rule-driven information extraction engine for annotated token
//! sequences. A user writes a set of named rules in a small declarative
//! language; the engine compiles them into an interconnected set of
//! extractors and runs any rule against token sequences to obtain matches.
//!
//! # Overview
//!
//! Five rule classes span complementary expressive levels. A *token test*
//! (`name : ...`) is a boolean predicate over one token. A *phrase rule*
//! (`name -> ...`) is a regular expression over tokens, compiled into a
//! nondeterministic finite automaton. A *parse rule* (`name ^ ...`) is a
//! regular expression over dependency graph edges. A *coordinator*
//! (`name ~ ...`) combines the match streams of other rules with operators
//! such as `match`, `select`, `filter` and `connects`. A *frame rule*
//! (`name $ frame(...)`) projects labeled slots from a match tree.
//!
//! Rules reference each other by name. The [Manager] owns all compiled
//! extractors, resolves names through nested namespaces and imports,
//! applies lexical substitutions attached to rule definitions, and
//! memoizes match results per token sequence.
//!
//! The engine consumes pre-annotated [TokenSequence] values supplied by the
//! caller. Tokenization, sentence splitting and NLP annotation are outside
//! its scope; [Manager::requirements] reports which annotation layers a
//! rule needs so the caller can request them up front.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tokex::{Manager, TokenSequence};
//!
//! let manager = Manager::new();
//! manager.parse_block(
//!     r"
//! num   : /^[0-9]+$/
//! run  -> &num+
//! ",
//! );
//!
//! let seq = Rc::new(TokenSequence::from_tokens(&["1", "23", "x", "456"]));
//! let matches = manager.scan("run", &seq, 0, None, &None).unwrap();
//! assert_eq!(matches.len(), 2);
//! assert_eq!(matches[0].matching_text(), "1 23");
//! ```

mod cache;
pub mod coordinator;
mod error;
pub mod fa;
mod frame;
mod manager;
mod matches;
mod regexp;
mod sequence;
mod statement;
pub mod tokentest;
mod util;

#[cfg(test)]
mod __tests__;

use std::collections::HashMap;
use std::rc::Rc;

pub use coordinator::{Coordinator, WhenExpr};
pub use fa::{ArcDirection, Lexicon, Nfa, NfaKind, PatternRule, PhraseExtractor};
pub use frame::{Frame, FrameExtractor, SlotValue};
pub use manager::{BrokenStatement, Manager, BUILTINS};
pub use matches::{CoordSlots, Match, MatchDetail};
pub use regexp::Regexp;
pub use sequence::{Annotation, TokenSequence};
pub use statement::{Delimiter, Region, Statement, StatementParser};
pub use tokentest::{TermExpander, TokenTest};
pub use util::{Log, Position, Source};

/// An annotation layer or external resource an extractor depends on.
///
/// Aggregated transitively over everything a rule references, so a caller
/// can configure its annotator before producing token sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Requirement {
    Pos,
    Lemma,
    Ner,
    DepParse,
    Embeddings,
}

/// The kind of a registered extractor, one per rule-definition delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    Test,
    Phrase,
    Parse,
    Coord,
    Frame,
}

impl ExtractorKind {
    /// Human-readable kind name used in error messages.
    pub fn long_name(&self) -> &'static str {
        match self {
            ExtractorKind::Test => "token test",
            ExtractorKind::Phrase => "phrase",
            ExtractorKind::Parse => "parse",
            ExtractorKind::Coord => "coordinator",
            ExtractorKind::Frame => "frame",
        }
    }

    /// The delimiter that introduces a definition of this kind.
    pub fn delimiter(&self) -> &'static str {
        match self {
            ExtractorKind::Test => ":",
            ExtractorKind::Phrase => "->",
            ExtractorKind::Parse => "^",
            ExtractorKind::Coord => "~",
            ExtractorKind::Frame => "$",
        }
    }
}

/// Immutable name bindings attached to a rule definition.
///
/// When resolving a reference, the manager merges the bindings of the
/// resolved rule with those inherited from the enclosing call (the caller
/// wins on collision) and applies the merged map to the referenced name
/// until a fixed point is reached.
pub type Substitutions = Option<Rc<HashMap<String, String>>>;

#[derive(Debug, Clone)]
/// An error raised while parsing one of the rule expression languages.
///
/// Expression errors never abort rule ingestion; the offending statement is
/// demoted to a [Region::Broken] region carrying the message.
pub struct ParseError {
    pub pointer: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
/// An error raised while registering or running rules.
pub enum MatchError {
    /// A referenced rule name could not be resolved.
    UnresolvedName(String),
    /// A reference resolved to an extractor of the wrong kind.
    KindMismatch {
        name: String,
        expected: &'static str,
        found: ExtractorKind,
    },
    /// A rule name was defined twice in the same manager.
    Redefinition { name: String, existing: ExtractorKind },
    /// An import path did not resolve; lists the candidates tried.
    ImportUnresolved { path: String, tried: Vec<String> },
    /// The operation is recognized by the parser but not supported by the
    /// matching runtime.
    Unsupported(&'static str),
    /// A token test needed an annotation layer the sequence does not carry.
    MissingAnnotation { layer: String },
    /// A radius test ran without a term expander installed on the manager.
    MissingExpander,
    /// An expression failed to parse.
    Syntax(ParseError),
    /// File I/O during imports or lexicon loading.
    Io { path: String, message: String },
}

/// Result alias used throughout the matching runtime.
pub type MatchResult<T> = Result<T, MatchError>;
