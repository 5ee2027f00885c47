use crate::{MatchError, ParseError};
use std::fmt::{Display, Formatter};

impl ParseError {
    pub fn new(pointer: usize, message: String) -> Self {
        Self { pointer, message }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {}", self.message)
    }
}

impl Display for MatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::UnresolvedName(name) => {
                write!(f, "Pattern name not found: {}", name)
            }
            MatchError::KindMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "'{}' must refer to a {} expression, but it refers to a {} expression.",
                    name,
                    expected,
                    found.long_name()
                )
            }
            MatchError::Redefinition { name, existing } => {
                write!(
                    f,
                    "'{}' is already defined as a {} expression.",
                    name,
                    existing.long_name()
                )
            }
            MatchError::ImportUnresolved { path, tried } => {
                write!(
                    f,
                    "Can't resolve import path '{}' (tried {}).",
                    path,
                    tried.join(", ")
                )
            }
            MatchError::Unsupported(op) => {
                write!(f, "The '{}' operator is not supported.", op)
            }
            MatchError::MissingAnnotation { layer } => {
                write!(f, "Annotation layer '{}' is not available.", layer)
            }
            MatchError::MissingExpander => {
                write!(f, "No term expander is installed on the manager.")
            }
            MatchError::Syntax(err) => write!(f, "{}", err),
            MatchError::Io { path, message } => {
                write!(f, "I/O error on '{}': {}", path, message)
            }
        }
    }
}

impl From<ParseError> for MatchError {
    fn from(err: ParseError) -> Self {
        MatchError::Syntax(err)
    }
}

impl std::error::Error for ParseError {}
impl std::error::Error for MatchError {}
