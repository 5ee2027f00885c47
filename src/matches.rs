//! The match model: value objects describing a located span and the tree of
//! submatches collected while producing it.

use crate::sequence::TokenSequence;
use ptree::TreeItem;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
/// Semantic accessor slots carried by coordinator matches. These reference
/// the matches a coordinator operator combined, and exist so that every
/// named extractor implicated in a match is reachable through the submatch
/// tree (the invariant that makes the `select` operator well defined).
pub struct CoordSlots {
    pub left: Option<Box<Match>>,
    pub right: Option<Box<Match>>,
    pub submatch: Option<Box<Match>>,
    pub supermatch: Option<Box<Match>>,
    pub members: Vec<Match>,
}

#[derive(Debug, Clone)]
/// The kind-specific part of a match.
pub enum MatchDetail {
    /// A single-token match produced by a token test.
    Token,
    /// A phrase match with a half-open `[begin, end)` token span.
    Phrase,
    /// A dependency walk. The end index is *inclusive* and may be smaller
    /// than the begin index when the walk runs against token order.
    Arc,
    /// A coordinator match carrying its semantic slots.
    Coord(CoordSlots),
}

#[derive(Debug, Clone)]
/// A located span over a token sequence together with its submatch tree.
///
/// Equality and hashing consider only `(begin, end)`, and ordering is
/// lexicographic on the same pair. This is deliberate: the set-theoretic
/// coordinator operators deduplicate match streams by extent, regardless
/// of which rule produced a match.
pub struct Match {
    pub seq: Rc<TokenSequence>,
    pub begin: usize,
    pub end: usize,
    pub name: Option<String>,
    pub submatches: Vec<Match>,
    pub payload: Option<serde_json::Value>,
    pub detail: MatchDetail,
}

impl Match {
    pub fn token(seq: Rc<TokenSequence>, at: usize, name: Option<String>) -> Self {
        Self {
            seq,
            begin: at,
            end: at + 1,
            name,
            submatches: Vec::new(),
            payload: None,
            detail: MatchDetail::Token,
        }
    }

    pub fn phrase(seq: Rc<TokenSequence>, begin: usize, end: usize) -> Self {
        Self {
            seq,
            begin,
            end,
            name: None,
            submatches: Vec::new(),
            payload: None,
            detail: MatchDetail::Phrase,
        }
    }

    pub fn arc(seq: Rc<TokenSequence>, begin: usize, end: usize) -> Self {
        Self {
            seq,
            begin,
            end,
            name: None,
            submatches: Vec::new(),
            payload: None,
            detail: MatchDetail::Arc,
        }
    }

    /// A coordinator match whose extent is the normalized extent of the
    /// source match.
    pub fn coord(source: &Match, slots: CoordSlots) -> Self {
        let (begin, end) = source.span();
        Self {
            seq: source.seq.clone(),
            begin,
            end,
            name: None,
            submatches: Vec::new(),
            payload: None,
            detail: MatchDetail::Coord(slots),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_submatches(mut self, submatches: Vec<Match>) -> Self {
        self.submatches = submatches;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn add_submatch(&mut self, m: Match) {
        self.submatches.push(m);
    }

    pub fn is_arc(&self) -> bool {
        matches!(self.detail, MatchDetail::Arc)
    }

    /// Token index one past the last token, assuming `end` really is the
    /// end. Arc matches use an inclusive end index.
    pub fn exclusive_end(&self) -> usize {
        if self.is_arc() {
            self.end + 1
        } else {
            self.end
        }
    }

    /// The normalized half-open `[begin, end)` token span, reversing the
    /// internal begin and end fields when a dependency walk ran against
    /// token order.
    pub fn span(&self) -> (usize, usize) {
        let adjust = self.exclusive_end() - self.end;
        let (begin, end) = if self.end < self.begin {
            (self.end, self.begin)
        } else {
            (self.begin, self.end)
        };
        (begin, end + adjust)
    }

    pub fn overlaps(&self, other: &Match) -> bool {
        if self.is_arc() {
            self.begin <= other.begin && other.begin <= self.end
                || self.begin <= other.end && other.end <= self.end
                || other.begin <= self.begin && self.begin <= other.end
                || other.begin <= self.end && self.end <= other.end
        } else {
            self.begin <= other.begin && other.begin < self.end
                || self.begin < other.end && other.end <= self.end
                || other.begin <= self.begin && self.begin < other.end
                || other.begin < self.end && self.end <= other.end
        }
    }

    pub fn covers(&self, index: usize) -> bool {
        if self.is_arc() {
            self.begin <= index && index <= self.end
        } else {
            self.begin <= index && index < self.end
        }
    }

    /// The character offset at which the match starts. With
    /// `absolute = true` the offset is relative to the complete document
    /// text rather than to this sequence.
    pub fn start_offset(&self, absolute: bool) -> usize {
        let (begin, _) = self.span();
        let mut offset = self.seq.normalized_offset(begin);
        if absolute {
            offset += self.seq.offset;
        }
        offset
    }

    /// The exclusive character offset at which the match ends.
    pub fn end_offset(&self, absolute: bool) -> usize {
        let (_, end) = self.span();
        let mut offset = if end == 0 {
            0
        } else {
            self.seq.normalized_offset(end - 1) + self.seq.lengths[end - 1]
        };
        if absolute {
            offset += self.seq.offset;
        }
        offset
    }

    /// The verbatim matching text, empty for zero-length matches.
    pub fn matching_text(&self) -> &str {
        let (begin, end) = self.span();
        self.seq.span_text(begin, end)
    }

    /// The lemmas of the covered tokens joined with spaces, falling back to
    /// lowercased surface forms.
    pub fn matching_lemma(&self) -> String {
        let (begin, end) = self.span();
        (begin..end)
            .map(|i| self.seq.lemma(i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The direct children of this match in the submatch tree. For
    /// coordinator matches this enumerates the semantic slots as well as
    /// the plain submatch list, with equal slot values reported once.
    pub fn direct_submatches(&self) -> Vec<&Match> {
        match &self.detail {
            MatchDetail::Coord(slots) => {
                // The same match is often filed in two slots (for example
                // as both left and supermatch); enumerate it once so select
                // does not double-report descendants. The submatch and
                // member lists hold distinct matches and are kept whole.
                fn push<'m>(result: &mut Vec<&'m Match>, m: &'m Match) {
                    let dup = result
                        .iter()
                        .any(|r| r.begin == m.begin && r.end == m.end && r.name == m.name);
                    if !dup {
                        result.push(m);
                    }
                }
                let mut result: Vec<&Match> = Vec::new();
                if let Some(m) = &slots.left {
                    push(&mut result, m);
                }
                if let Some(m) = &slots.right {
                    push(&mut result, m);
                }
                if let Some(m) = &slots.submatch {
                    push(&mut result, m);
                }
                if let Some(m) = &slots.supermatch {
                    push(&mut result, m);
                }
                result.extend(self.submatches.iter());
                result.extend(slots.members.iter());
                result
            }
            _ => self.submatches.iter().collect(),
        }
    }

    /// All matches associated with named subexpressions of this match or
    /// any of its descendants, optionally restricted to one name.
    pub fn all_submatches(&self, name: Option<&str>) -> Vec<&Match> {
        let mut result = Vec::new();
        for m in self.direct_submatches() {
            if name.is_none() || m.name.as_deref() == name {
                result.push(m);
            }
            result.extend(m.all_submatches(name));
        }
        result
    }

    /// Find matches of a sequence of extractor names in the submatch tree,
    /// allowing matches of other extractors in between. Yields the matches
    /// of the last name in the path.
    pub fn query(&self, names: &[String]) -> Vec<&Match> {
        let mut result = Vec::new();
        self.query_into(names, &mut result);
        result
    }

    fn query_into<'m>(&'m self, names: &[String], out: &mut Vec<&'m Match>) {
        if names.is_empty() {
            return;
        }
        let mut rest = names;
        if self.name.as_deref() == Some(names[0].as_str()) {
            rest = &names[1..];
            if rest.is_empty() {
                out.push(self);
                return;
            }
        }
        for m in self.direct_submatches() {
            m.query_into(rest, out);
        }
    }

    /// For coordinator matches with two feeds, expand the extent to cover
    /// both feed matches and the intervening text. With `maximize = true`
    /// also cover the extents of the submatch and supermatch trees.
    pub fn widen(&self, maximize: bool) -> Match {
        let mut widened = self.clone();
        if let MatchDetail::Coord(slots) = &self.detail {
            if let (Some(left), Some(right)) = (&slots.left, &slots.right) {
                widened.begin = left.begin.min(right.begin);
                widened.end = left.end.max(right.end);
            }
            if maximize {
                if let Some(sm) = &slots.submatch {
                    let sm = sm.widen(true);
                    widened.begin = widened.begin.min(sm.begin);
                    widened.end = widened.end.max(sm.end);
                }
                if let Some(sm) = &slots.supermatch {
                    let sm = sm.widen(true);
                    widened.begin = widened.begin.min(sm.begin);
                    widened.end = widened.end.max(sm.end);
                }
            }
        }
        widened
    }

    /// Print the match and its submatch tree to stdout.
    pub fn print_match_tree(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.begin == other.begin && self.end == other.end
    }
}

impl Eq for Match {}

impl Hash for Match {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.begin.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for Match {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Match {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.begin, self.end).cmp(&(other.begin, other.end))
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.detail {
            MatchDetail::Token => "TokenMatch",
            MatchDetail::Phrase => "Match",
            MatchDetail::Arc => "ArcMatch",
            MatchDetail::Coord(_) => "CoordMatch",
        };
        match &self.name {
            Some(name) => write!(
                f,
                "{}([{}],{},{},{})",
                kind,
                name,
                self.begin,
                self.end,
                self.matching_text()
            ),
            None => write!(
                f,
                "{}({},{},{})",
                kind,
                self.begin,
                self.end,
                self.matching_text()
            ),
        }
    }
}

impl TreeItem for Match {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self)
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::Owned(self.direct_submatches().into_iter().cloned().collect())
    }
}
