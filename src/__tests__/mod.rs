//! Shared helpers for the test suites: a small punctuation-splitting
//! tokenizer with character offsets, and annotation builders.

mod binding_test;
mod coordinator_test;
mod frame_test;
mod match_test;
mod parse_test;
mod phrase_test;
mod statement_test;
mod tokentest_test;

use crate::sequence::TokenSequence;
use std::rc::Rc;

/// Tokenize text into alphanumeric runs and single punctuation characters,
/// tracking character offsets into the source.
pub fn tokenize(text: &str) -> TokenSequence {
    let mut tokens: Vec<String> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();
    let mut lengths: Vec<usize> = Vec::new();
    let mut word_start: Option<usize> = None;

    let flush = |tokens: &mut Vec<String>,
                     offsets: &mut Vec<usize>,
                     lengths: &mut Vec<usize>,
                     start: &mut Option<usize>,
                     end: usize| {
        if let Some(begin) = start.take() {
            tokens.push(text[begin..end].to_string());
            offsets.push(begin);
            lengths.push(end - begin);
        }
    };

    for (i, ch) in text.char_indices() {
        if ch.is_alphanumeric() || ch == '_' {
            if word_start.is_none() {
                word_start = Some(i);
            }
        } else {
            flush(&mut tokens, &mut offsets, &mut lengths, &mut word_start, i);
            if !ch.is_whitespace() {
                tokens.push(ch.to_string());
                offsets.push(i);
                lengths.push(ch.len_utf8());
            }
        }
    }
    flush(
        &mut tokens,
        &mut offsets,
        &mut lengths,
        &mut word_start,
        text.len(),
    );

    TokenSequence::new(text, tokens, offsets, lengths)
}

pub fn seq(text: &str) -> Rc<TokenSequence> {
    Rc::new(tokenize(text))
}

pub fn seq_with_pos(text: &str, pos: &[&str]) -> Rc<TokenSequence> {
    Rc::new(tokenize(text).with_annotations("pos", pos))
}
