//! Small shared utilities for source positions and leveled debug logging.

mod logger;
mod position;
mod source;

use once_cell::unsync::OnceCell;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// A structure to assign multiple level debugging to managers and extractors.
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// The line and column information at a source offset.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A wrapper for rule source text with lazily computed line information,
/// used to turn region offsets into diagnostic positions.
pub struct Source<'s> {
    pub text: &'s str,
    line_breaks: OnceCell<Vec<usize>>,
}
