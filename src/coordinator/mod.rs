//! The coordinator algebra: a tree of operators producing match streams
//! from feeds.
//!
//! A coordinator takes match streams as input and produces match streams
//! as output. The base stream `_` supplies a single match covering the
//! current bounds, so `match(X, _)` has the same meaning as scanning `X`
//! over the sequence, while in a nested context `_` denotes the extent
//! established by the surrounding operator.

mod expression;

pub use expression::CoordinatorExpression;

use crate::manager::Manager;
use crate::matches::{CoordSlots, Match};
use crate::sequence::TokenSequence;
use crate::{ExtractorKind, MatchError, MatchResult, Requirement, Substitutions};
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone)]
/// Boolean expression over document-level recorded matches, used by the
/// `when` operator.
pub enum WhenExpr {
    Ref(String),
    And(Vec<WhenExpr>),
    Or(Vec<WhenExpr>),
    Not(Box<WhenExpr>),
}

impl WhenExpr {
    /// Evaluate against the document-level recorded-match set. Evaluating
    /// a reference runs the named rule over the current sequence and
    /// records any hit, then answers whether the rule matched some *other*
    /// sequence of the current document.
    pub fn eval(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        subst: &Substitutions,
    ) -> MatchResult<bool> {
        match self {
            WhenExpr::Ref(name) => {
                let matches = mgr.scan(name, seq, 0, None, subst)?;
                if !matches.is_empty() {
                    mgr.record(name, seq);
                }
                Ok(mgr.recorded(name, seq))
            }
            WhenExpr::And(subs) => {
                for sub in subs {
                    if !sub.eval(mgr, seq, subst)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            WhenExpr::Or(subs) => {
                for sub in subs {
                    if sub.eval(mgr, seq, subst)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WhenExpr::Not(sub) => Ok(!sub.eval(mgr, seq, subst)?),
        }
    }

    fn collect_requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
        req: &mut HashSet<Requirement>,
    ) -> MatchResult<()> {
        match self {
            WhenExpr::Ref(name) => {
                req.extend(mgr.requirements(name, subst)?);
            }
            WhenExpr::And(subs) | WhenExpr::Or(subs) => {
                for sub in subs {
                    sub.collect_requirements(mgr, subst, req)?;
                }
            }
            WhenExpr::Not(sub) => sub.collect_requirements(mgr, subst, req)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// One node of a coordinator tree.
pub enum Coordinator {
    /// `_`, the base stream: one match spanning the current bounds.
    Base,
    /// Matches of the named rule textually contained in each feed match.
    Match { name: String, feed: Box<Coordinator> },
    /// Matches of the named rule already recorded in the submatch trees of
    /// the feed matches. A pure tree walk; the rule is not re-run.
    Select { name: String, feed: Box<Coordinator> },
    /// Feed matches that (do not, when inverted) contain a match of the
    /// named rule.
    Filter {
        name: String,
        feed: Box<Coordinator>,
        inverted: bool,
    },
    /// Feed matches with an immediately preceding named-rule match. Like
    /// `Precedes` with proximity 0, but emits at most one match per feed
    /// match.
    Prefix {
        name: String,
        feed: Box<Coordinator>,
        inverted: bool,
    },
    /// Feed matches with an immediately following named-rule match.
    Suffix {
        name: String,
        feed: Box<Coordinator>,
        inverted: bool,
    },
    /// Feed matches with a named-rule match within `proximity` tokens on
    /// either side.
    Near {
        name: String,
        feed: Box<Coordinator>,
        proximity: usize,
        inverted: bool,
    },
    /// Feed matches with a named-rule match ending within `proximity`
    /// tokens before their begin.
    Precedes {
        name: String,
        feed: Box<Coordinator>,
        proximity: usize,
        inverted: bool,
    },
    /// Feed matches with a named-rule match starting within `proximity`
    /// tokens after their end.
    Follows {
        name: String,
        feed: Box<Coordinator>,
        proximity: usize,
        inverted: bool,
    },
    /// Feed matches containing at least `count` named-rule matches.
    Count {
        name: String,
        feed: Box<Coordinator>,
        count: usize,
        inverted: bool,
    },
    /// Matches co-extensive in all feeds.
    Inter(Vec<Coordinator>),
    /// All matches from all feeds, deduplicated by extent.
    Union(Vec<Coordinator>),
    /// Matches of the first feed with no equal-extent match in any other.
    Diff(Vec<Coordinator>),
    /// Left-feed matches that contain some right-feed match.
    Contains {
        left: Box<Coordinator>,
        right: Box<Coordinator>,
    },
    /// Left-feed matches contained by some right-feed match.
    ContainedBy {
        left: Box<Coordinator>,
        right: Box<Coordinator>,
    },
    /// Left-feed matches that overlap some right-feed match.
    Overlaps {
        left: Box<Coordinator>,
        right: Box<Coordinator>,
    },
    /// Pairs of feed matches connected by a walk of the named parse rule.
    Connects {
        name: String,
        left: Box<Coordinator>,
        right: Box<Coordinator>,
    },
    /// Emit the feed only when the boolean holds for the current document.
    When {
        boolean: WhenExpr,
        feed: Box<Coordinator>,
    },
    /// Widen two-feed coordinator matches to cover both feeds.
    Widen(Box<Coordinator>),
    /// Merge consecutive overlapping matches of the feed.
    Merge(Box<Coordinator>),
    /// Parsed for compatibility; unsupported at run time.
    HasPath {
        left: Box<Coordinator>,
        right: Box<Coordinator>,
        path: Vec<String>,
    },
}

fn spans_overlap(lm: &Match, rm: &Match) -> bool {
    lm.begin <= rm.begin && rm.begin < lm.end
        || lm.begin < rm.end && rm.end <= lm.end
        || rm.begin <= lm.begin && lm.begin < rm.end
        || rm.begin < lm.end && lm.end <= rm.end
}

impl Coordinator {
    /// Matches anchored at exactly `start`.
    pub fn matches(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let mut out = self.scan(mgr, seq, start, end, subst)?;
        out.retain(|m| m.begin == start);
        Ok(out)
    }

    /// All matches within the bounds.
    pub fn scan(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        match self {
            Coordinator::Base => Ok(vec![
                Match::phrase(seq.clone(), start, end).with_name("_")
            ]),

            Coordinator::Match { name, feed } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    for pm in mgr.scan(name, seq, fm.begin, Some(fm.end), subst)? {
                        if pm.end > fm.end {
                            continue;
                        }
                        let mut slots = CoordSlots::default();
                        slots.left = Some(Box::new(fm.clone()));
                        slots.submatch = Some(Box::new(pm.clone()));
                        slots.supermatch = Some(Box::new(fm.clone()));
                        out.push(Match::coord(&pm, slots));
                    }
                }
                Ok(out)
            }

            Coordinator::Select { name, feed } => {
                if !mgr.extractor_defined(name) {
                    return Err(MatchError::UnresolvedName(name.clone()));
                }
                let selected = Manager::apply_substitutions(name, subst);
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let mut submatches: Vec<Match> = fm
                        .all_submatches(Some(selected.as_str()))
                        .into_iter()
                        .cloned()
                        .collect();
                    submatches.sort();
                    for pm in submatches {
                        let mut slots = CoordSlots::default();
                        slots.left = Some(Box::new(fm.clone()));
                        slots.submatch = Some(Box::new(pm.clone()));
                        slots.supermatch = Some(Box::new(fm.clone()));
                        out.push(Match::coord(&pm, slots));
                    }
                }
                Ok(out)
            }

            Coordinator::Filter {
                name,
                feed,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hits = mgr.scan(name, seq, fm.begin, Some(fm.end), subst)?;
                    let hit = hits.into_iter().find(|pm| pm.end <= fm.end);
                    if *inverted {
                        // Inverted filter matches do not carry a submatch.
                        if hit.is_none() {
                            let mut slots = CoordSlots::default();
                            slots.left = Some(Box::new(fm.clone()));
                            out.push(Match::coord(&fm, slots));
                        }
                    } else if let Some(pm) = hit {
                        let mut slots = CoordSlots::default();
                        slots.left = Some(Box::new(fm.clone()));
                        slots.submatch = Some(Box::new(pm));
                        out.push(Match::coord(&fm, slots));
                    }
                }
                Ok(out)
            }

            Coordinator::Prefix {
                name,
                feed,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hit = mgr
                        .scan(name, seq, start, Some(fm.begin), subst)?
                        .into_iter()
                        .find(|pm| pm.end == fm.begin);
                    self.push_filter_result(&mut out, fm, hit, *inverted);
                }
                Ok(out)
            }

            Coordinator::Suffix {
                name,
                feed,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hit = mgr
                        .scan(name, seq, fm.end, Some(end), subst)?
                        .into_iter()
                        .find(|pm| pm.begin == fm.end);
                    self.push_filter_result(&mut out, fm, hit, *inverted);
                }
                Ok(out)
            }

            Coordinator::Precedes {
                name,
                feed,
                proximity,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hits = mgr.scan(name, seq, start, Some(fm.begin), subst)?;
                    if *inverted {
                        let hit = hits.into_iter().find(|pm| {
                            fm.begin >= pm.end && fm.begin - pm.end <= *proximity
                        });
                        self.push_filter_result(&mut out, fm, hit, true);
                    } else {
                        for pm in hits {
                            if fm.begin >= pm.end && fm.begin - pm.end <= *proximity {
                                let mut slots = CoordSlots::default();
                                slots.left = Some(Box::new(fm.clone()));
                                slots.submatch = Some(Box::new(pm));
                                out.push(Match::coord(&fm, slots));
                            }
                        }
                    }
                }
                Ok(out)
            }

            Coordinator::Follows {
                name,
                feed,
                proximity,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hits = mgr.scan(name, seq, fm.end, Some(end), subst)?;
                    if *inverted {
                        let hit = hits.into_iter().find(|pm| {
                            pm.begin >= fm.end && pm.begin - fm.end <= *proximity
                        });
                        self.push_filter_result(&mut out, fm, hit, true);
                    } else {
                        for pm in hits {
                            if pm.begin >= fm.end && pm.begin - fm.end <= *proximity {
                                let mut slots = CoordSlots::default();
                                slots.left = Some(Box::new(fm.clone()));
                                slots.submatch = Some(Box::new(pm));
                                out.push(Match::coord(&fm, slots));
                            }
                        }
                    }
                }
                Ok(out)
            }

            Coordinator::Near {
                name,
                feed,
                proximity,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hits = mgr.scan(name, seq, start, Some(end), subst)?;
                    if *inverted {
                        let near = hits.iter().any(|pm| {
                            fm.begin >= pm.end && fm.begin - pm.end <= *proximity
                                || pm.begin >= fm.end && pm.begin - fm.end <= *proximity
                        });
                        if !near {
                            let mut slots = CoordSlots::default();
                            slots.left = Some(Box::new(fm.clone()));
                            out.push(Match::coord(&fm, slots));
                        }
                    } else {
                        for pm in hits {
                            let before = fm.begin >= pm.end
                                && fm.begin - pm.end <= *proximity;
                            let after = pm.begin >= fm.end
                                && pm.begin - fm.end <= *proximity;
                            for _ in 0..(before as usize + after as usize) {
                                let mut slots = CoordSlots::default();
                                slots.left = Some(Box::new(fm.clone()));
                                slots.submatch = Some(Box::new(pm.clone()));
                                out.push(Match::coord(&fm, slots));
                            }
                        }
                    }
                }
                Ok(out)
            }

            Coordinator::Count {
                name,
                feed,
                count,
                inverted,
            } => {
                let mut out = Vec::new();
                for fm in feed.scan(mgr, seq, start, end, subst)? {
                    let hits: Vec<Match> = mgr
                        .scan(name, seq, fm.begin, Some(fm.end), subst)?
                        .into_iter()
                        .filter(|pm| pm.end <= fm.end)
                        .collect();
                    if *inverted {
                        if hits.len() < *count {
                            let mut slots = CoordSlots::default();
                            slots.left = Some(Box::new(fm.clone()));
                            out.push(Match::coord(&fm, slots));
                        }
                    } else if hits.len() >= *count {
                        let mut slots = CoordSlots::default();
                        slots.left = Some(Box::new(fm.clone()));
                        let mut m = Match::coord(&fm, slots);
                        m.submatches = hits;
                        out.push(m);
                    }
                }
                Ok(out)
            }

            Coordinator::Inter(feeds) => {
                let mut result: Vec<((usize, usize), Match)> = Vec::new();
                for (i, feed) in feeds.iter().enumerate() {
                    let ms = feed.scan(mgr, seq, start, end, subst)?;
                    if i == 0 {
                        for m in ms {
                            let key = (m.begin, m.end);
                            let coord =
                                Match::coord(&m, CoordSlots::default()).with_submatches(vec![m]);
                            match result.iter().position(|(k, _)| *k == key) {
                                Some(at) => result[at].1 = coord,
                                None => result.push((key, coord)),
                            }
                        }
                    } else {
                        let mut matched: HashSet<(usize, usize)> = HashSet::new();
                        for m in ms {
                            let key = (m.begin, m.end);
                            if let Some(at) = result.iter().position(|(k, _)| *k == key) {
                                result[at].1.submatches.push(m);
                                matched.insert(key);
                            }
                        }
                        result.retain(|(k, _)| matched.contains(k));
                    }
                    if result.is_empty() {
                        return Ok(Vec::new());
                    }
                }
                Ok(result.into_iter().map(|(_, m)| m).collect())
            }

            Coordinator::Union(feeds) => {
                let mut result: Vec<((usize, usize), Match)> = Vec::new();
                for feed in feeds {
                    for m in feed.scan(mgr, seq, start, end, subst)? {
                        let key = (m.begin, m.end);
                        match result.iter().position(|(k, _)| *k == key) {
                            Some(at) => result[at].1.submatches.push(m),
                            None => {
                                let coord = Match::coord(&m, CoordSlots::default())
                                    .with_submatches(vec![m]);
                                result.push((key, coord));
                            }
                        }
                    }
                }
                Ok(result.into_iter().map(|(_, m)| m).collect())
            }

            Coordinator::Diff(feeds) => {
                let mut result: Vec<((usize, usize), Match)> = Vec::new();
                for (i, feed) in feeds.iter().enumerate() {
                    let ms = feed.scan(mgr, seq, start, end, subst)?;
                    if i == 0 {
                        for m in ms {
                            let key = (m.begin, m.end);
                            let mut slots = CoordSlots::default();
                            slots.submatch = Some(Box::new(m.clone()));
                            let coord = Match::coord(&m, slots);
                            match result.iter().position(|(k, _)| *k == key) {
                                Some(at) => result[at].1 = coord,
                                None => result.push((key, coord)),
                            }
                        }
                    } else {
                        let drop: HashSet<(usize, usize)> =
                            ms.iter().map(|m| (m.begin, m.end)).collect();
                        result.retain(|(k, _)| !drop.contains(k));
                    }
                    if result.is_empty() {
                        return Ok(Vec::new());
                    }
                }
                Ok(result.into_iter().map(|(_, m)| m).collect())
            }

            Coordinator::Contains { left, right }
            | Coordinator::ContainedBy { left, right }
            | Coordinator::Overlaps { left, right } => {
                let rightm = right.scan(mgr, seq, start, end, subst)?;
                let mut out = Vec::new();
                for lm in left.scan(mgr, seq, start, end, subst)? {
                    for rm in rightm.iter().filter(|rm| spans_overlap(&lm, rm)) {
                        let keep = match self {
                            Coordinator::Contains { .. } => {
                                lm.begin <= rm.begin && rm.end <= lm.end
                            }
                            Coordinator::ContainedBy { .. } => {
                                rm.begin <= lm.begin && lm.end <= rm.end
                            }
                            _ => true,
                        };
                        if keep {
                            let mut slots = CoordSlots::default();
                            slots.left = Some(Box::new(lm.clone()));
                            slots.right = Some(Box::new(rm.clone()));
                            out.push(Match::coord(&lm, slots));
                        }
                    }
                }
                Ok(out)
            }

            Coordinator::Connects { name, left, right } => {
                let kind = mgr.lookup_kind(name, subst)?;
                if kind != ExtractorKind::Parse {
                    return Err(MatchError::KindMismatch {
                        name: name.clone(),
                        expected: "parse",
                        found: kind,
                    });
                }
                let leftm = left.scan(mgr, seq, start, end, subst)?;
                if leftm.is_empty() {
                    return Ok(Vec::new());
                }
                let rightm = right.scan(mgr, seq, start, end, subst)?;
                if rightm.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Vec::new();
                for lm in &leftm {
                    for i in lm.begin..lm.end {
                        for pm in mgr.matches(name, seq, i, Some(end), subst)? {
                            for rm in rightm.iter().filter(|rm| rm.covers(pm.end)) {
                                let mut slots = CoordSlots::default();
                                slots.left = Some(Box::new(lm.clone()));
                                slots.right = Some(Box::new(rm.clone()));
                                slots.submatch = Some(Box::new(pm.clone()));
                                out.push(Match::coord(&pm, slots));
                            }
                        }
                    }
                }
                Ok(out)
            }

            Coordinator::When { boolean, feed } => {
                if boolean.eval(mgr, seq, subst)? {
                    feed.scan(mgr, seq, start, end, subst)
                } else {
                    Ok(Vec::new())
                }
            }

            Coordinator::Widen(feed) => Ok(feed
                .scan(mgr, seq, start, end, subst)?
                .into_iter()
                .map(|m| m.widen(false))
                .collect()),

            Coordinator::Merge(feed) => {
                let mut ms = feed.scan(mgr, seq, start, end, subst)?;
                ms.sort();
                let mut out: Vec<Match> = Vec::new();
                let mut current: Option<Match> = None;
                for m in ms {
                    let extend = matches!(&current, Some(merged) if merged.overlaps(&m));
                    if extend {
                        let merged = current.as_mut().unwrap();
                        merged.begin = merged.begin.min(m.begin);
                        merged.end = merged.end.max(m.end);
                        if let crate::matches::MatchDetail::Coord(slots) = &mut merged.detail
                        {
                            slots.members.push(m);
                        }
                    } else {
                        if let Some(merged) = current.take() {
                            out.push(merged);
                        }
                        let mut slots = CoordSlots::default();
                        slots.left = Some(Box::new(m.clone()));
                        slots.members.push(m.clone());
                        current = Some(Match::coord(&m, slots));
                    }
                }
                if let Some(merged) = current {
                    out.push(merged);
                }
                Ok(out)
            }

            Coordinator::HasPath { .. } => Err(MatchError::Unsupported("haspath")),
        }
    }

    fn push_filter_result(
        &self,
        out: &mut Vec<Match>,
        fm: Match,
        hit: Option<Match>,
        inverted: bool,
    ) {
        if inverted {
            if hit.is_none() {
                let mut slots = CoordSlots::default();
                slots.left = Some(Box::new(fm.clone()));
                out.push(Match::coord(&fm, slots));
            }
        } else if let Some(pm) = hit {
            let mut slots = CoordSlots::default();
            slots.left = Some(Box::new(fm.clone()));
            slots.submatch = Some(Box::new(pm));
            out.push(Match::coord(&fm, slots));
        }
    }

    /// The union of the feeds' requirements plus those of any named rules.
    pub fn requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
    ) -> MatchResult<HashSet<Requirement>> {
        let mut req = HashSet::new();
        match self {
            Coordinator::Base => {}
            Coordinator::Match { name, feed }
            | Coordinator::Select { name, feed }
            | Coordinator::Filter { name, feed, .. }
            | Coordinator::Prefix { name, feed, .. }
            | Coordinator::Suffix { name, feed, .. }
            | Coordinator::Near { name, feed, .. }
            | Coordinator::Precedes { name, feed, .. }
            | Coordinator::Follows { name, feed, .. }
            | Coordinator::Count { name, feed, .. } => {
                req.extend(feed.requirements(mgr, subst)?);
                req.extend(mgr.requirements(name, subst)?);
            }
            Coordinator::Inter(feeds)
            | Coordinator::Union(feeds)
            | Coordinator::Diff(feeds) => {
                for feed in feeds {
                    req.extend(feed.requirements(mgr, subst)?);
                }
            }
            Coordinator::Contains { left, right }
            | Coordinator::ContainedBy { left, right }
            | Coordinator::Overlaps { left, right }
            | Coordinator::HasPath { left, right, .. } => {
                req.extend(left.requirements(mgr, subst)?);
                req.extend(right.requirements(mgr, subst)?);
            }
            Coordinator::Connects { name, left, right } => {
                req.extend(left.requirements(mgr, subst)?);
                req.extend(right.requirements(mgr, subst)?);
                req.extend(mgr.requirements(name, subst)?);
            }
            Coordinator::When { boolean, feed } => {
                req.extend(feed.requirements(mgr, subst)?);
                boolean.collect_requirements(mgr, subst, &mut req)?;
            }
            Coordinator::Widen(feed) | Coordinator::Merge(feed) => {
                req.extend(feed.requirements(mgr, subst)?);
            }
        }
        Ok(req)
    }
}
