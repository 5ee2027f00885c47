//! The match memo: a keyed cache over manager matching operations.
//!
//! The key is (operation, rule name, extractor kind, start, end, and an
//! order-independent hash of the frozen substitution map); the value is the
//! materialized list of matches. The cache holds results for one token
//! sequence at a time and is cleared when the sequence identity changes.

use crate::matches::Match;
use crate::{ExtractorKind, Substitutions};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Scan,
    Matches,
}

pub type CacheKey = (CacheOp, String, ExtractorKind, usize, usize, u64);

/// Order-independent hash of a substitution map, so equivalent maps built
/// in different orders share cache entries.
pub fn substitution_hash(subst: &Substitutions) -> u64 {
    match subst {
        None => 0,
        Some(map) => {
            let mut combined = 0u64;
            for (key, value) in map.iter() {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                value.hash(&mut hasher);
                combined ^= hasher.finish();
            }
            combined
        }
    }
}

pub struct MatchCache {
    enabled: bool,
    seq_id: Option<usize>,
    entries: HashMap<CacheKey, Vec<Match>>,
}

impl MatchCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seq_id: None,
            entries: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Note the identity of the sequence being matched, invalidating the
    /// cache if it changed.
    pub fn note_sequence(&mut self, seq_id: usize) {
        if self.seq_id != Some(seq_id) {
            self.entries.clear();
            self.seq_id = Some(seq_id);
        }
    }

    pub fn find(&self, key: &CacheKey) -> Option<Vec<Match>> {
        if !self.enabled {
            return None;
        }
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, matches: Vec<Match>) {
        if self.enabled {
            self.entries.insert(key, matches);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seq_id = None;
    }

    /// Purge all entries for one rule name.
    pub fn purge(&mut self, name: &str) {
        self.entries.retain(|key, _| key.1 != name);
    }
}
