//! Phrase matching: running a token NFA against a sequence, plus the
//! built-in phrase extractors and the lexicon matcher.

use super::{Lexicon, Nfa, NfaKind};
use crate::manager::Manager;
use crate::matches::Match;
use crate::regexp::Regexp;
use crate::sequence::TokenSequence;
use crate::{ExtractorKind, MatchError, MatchResult, Requirement, Substitutions};
use once_cell::unsync::OnceCell;
use std::collections::HashSet;
use std::rc::Rc;

struct PhraseContext<'c> {
    mgr: &'c Rc<Manager>,
    seq: &'c Rc<TokenSequence>,
    start: usize,
    end: usize,
    subst: &'c Substitutions,
}

impl Nfa {
    /// All matches starting exactly at `start`, from the ε-closure of the
    /// initial state. Zero-length matches are dropped.
    pub fn matches(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        match self.kind {
            NfaKind::Phrase => self.phrase_matches(mgr, seq, start, end, subst),
            NfaKind::Parse => self.parse_matches(mgr, seq, start, end, subst),
        }
    }

    /// All matches anywhere in the bounds. Phrase automata yield only the
    /// longest match at a start position and resume scanning after it;
    /// parse automata try every start and emit every walk.
    pub fn scan(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        match self.kind {
            NfaKind::Phrase => self.phrase_scan(mgr, seq, start, end, subst),
            NfaKind::Parse => self.parse_scan(mgr, seq, start, end, subst),
        }
    }

    fn phrase_matches(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let ctx = PhraseContext {
            mgr,
            seq,
            start,
            end,
            subst,
        };
        let mut out = Vec::new();
        for sid in self.null_closure(&[self.initial()]) {
            self.phrase_match(&ctx, start, sid, &mut out)?;
        }
        out.retain(|m| m.end != start);
        Ok(out)
    }

    fn phrase_match(
        &self,
        ctx: &PhraseContext,
        at: usize,
        sid: usize,
        out: &mut Vec<Match>,
    ) -> MatchResult<()> {
        if at > ctx.end || at - ctx.start > self.max_match {
            return Ok(());
        }
        if let Some(name) = self.state(sid).callout.clone() {
            // Descend into the referenced extractor and continue from
            // wherever its matches end.
            let kind = ctx.mgr.lookup_kind(&name, ctx.subst)?;
            if !matches!(
                kind,
                ExtractorKind::Phrase | ExtractorKind::Coord | ExtractorKind::Test
            ) {
                return Err(MatchError::KindMismatch {
                    name,
                    expected: "phrase, token test or coordinator",
                    found: kind,
                });
            }
            let subs = ctx
                .mgr
                .matches(&name, ctx.seq, at, Some(ctx.end), ctx.subst)?;
            for mut sub in subs {
                sub.set_name(&name);
                if self.is_final(sid) {
                    let mut m = Match::phrase(ctx.seq.clone(), ctx.start, sub.end);
                    m.name = self.name.clone();
                    m.add_submatch(sub.clone());
                    out.push(m);
                }
                for dest in self.null_transition_to(sid) {
                    let mut collected = Vec::new();
                    self.phrase_match(ctx, sub.end, dest, &mut collected)?;
                    for mut m in collected {
                        m.add_submatch(sub.clone());
                        out.push(m);
                    }
                }
            }
        } else {
            if at < ctx.end {
                for (dest, test_names) in
                    self.transit_one_token(sid, ctx.mgr, ctx.seq, at, ctx.subst)?
                {
                    let mut collected = Vec::new();
                    self.phrase_match(ctx, at + 1, dest, &mut collected)?;
                    for mut m in collected {
                        for name in &test_names {
                            m.add_submatch(Match::token(
                                ctx.seq.clone(),
                                at,
                                Some(name.clone()),
                            ));
                        }
                        out.push(m);
                    }
                }
            }
            if self.is_final(sid) {
                let mut m = Match::phrase(ctx.seq.clone(), ctx.start, at);
                m.name = self.name.clone();
                out.push(m);
            }
        }
        Ok(())
    }

    /// The longest match starting exactly at `start`, if any.
    pub fn match_at(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Option<Match>> {
        let mut longest: Option<Match> = None;
        for m in self.matches(mgr, seq, start, end, subst)? {
            if m.end < m.begin {
                continue;
            }
            if longest.as_ref().map_or(true, |best| m.end > best.end) {
                longest = Some(m);
            }
        }
        Ok(longest)
    }

    /// The longest match found from the first start position at or after
    /// `start` where there is one.
    pub fn search(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Option<Match>> {
        let mut start = start;
        while start < end {
            if let Some(m) = self.match_at(mgr, seq, start, end, subst)? {
                return Ok(Some(m));
            }
            start += 1;
        }
        Ok(None)
    }

    fn phrase_scan(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let mut out = Vec::new();
        let mut start = start;
        while let Some(m) = self.search(mgr, seq, start, end, subst)? {
            // Resume where the match stopped; the max() guard keeps
            // zero-width matches from stalling the scan.
            start = m.end.max(start + 1);
            out.push(m);
        }
        Ok(out)
    }
}

/// A phrase rule: either a compiled pattern, one of the built-in
/// zero-width or root extractors, or a lexicon matcher.
pub enum PhraseExtractor {
    Pattern(PatternRule),
    /// Built-in `START`: matches zero-width at token index 0.
    SeqStart,
    /// Built-in `END`: matches zero-width at the end of the sequence.
    SeqEnd,
    /// Built-in `ROOT`: matches from the scan start to the leftmost
    /// contiguous run of dependency-root tokens.
    ParseRoot,
    Lexicon(Lexicon),
}

/// A phrase or parse rule holding its regex IR, compiled into an NFA on
/// first use so references can be classified against the full rule set.
pub struct PatternRule {
    pub kind: NfaKind,
    pub regex: Regexp,
    pub case_insensitive: bool,
    compiled: OnceCell<Rc<Nfa>>,
}

impl PatternRule {
    pub fn new(kind: NfaKind, regex: Regexp, case_insensitive: bool) -> Self {
        Self {
            kind,
            regex,
            case_insensitive,
            compiled: OnceCell::new(),
        }
    }

    pub fn nfa(&self, mgr: &Rc<Manager>, name: &str) -> MatchResult<Rc<Nfa>> {
        self.compiled
            .get_or_try_init(|| {
                let mut nfa = self.regex.fa(mgr, self.kind, self.case_insensitive)?;
                nfa.name = Some(name.to_string());
                Ok(Rc::new(nfa))
            })
            .map(|nfa| nfa.clone())
    }
}

impl PhraseExtractor {
    pub fn matches(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
        name: &str,
    ) -> MatchResult<Vec<Match>> {
        match self {
            PhraseExtractor::Pattern(pattern) => {
                pattern.nfa(mgr, name)?.matches(mgr, seq, start, end, subst)
            }
            PhraseExtractor::SeqStart => {
                if start == 0 {
                    Ok(vec![Match::phrase(seq.clone(), 0, 0).with_name("START")])
                } else {
                    Ok(Vec::new())
                }
            }
            PhraseExtractor::SeqEnd => {
                if start == seq.len() {
                    Ok(vec![
                        Match::phrase(seq.clone(), start, start).with_name("END")
                    ])
                } else {
                    Ok(Vec::new())
                }
            }
            PhraseExtractor::ParseRoot => {
                let mut in_roots = false;
                for at in start..end {
                    if seq.is_root(at) {
                        in_roots = true;
                    } else {
                        if in_roots {
                            return Ok(vec![
                                Match::phrase(seq.clone(), start, at).with_name("ROOT")
                            ]);
                        }
                        return Ok(Vec::new());
                    }
                }
                Ok(Vec::new())
            }
            PhraseExtractor::Lexicon(lexicon) => Ok(lexicon
                .matches(seq, start, end)
                .into_iter()
                .map(|(to, payload)| {
                    Match::phrase(seq.clone(), start, to).with_payload(payload)
                })
                .collect()),
        }
    }

    pub fn scan(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
        name: &str,
    ) -> MatchResult<Vec<Match>> {
        match self {
            PhraseExtractor::Pattern(pattern) => {
                pattern.nfa(mgr, name)?.scan(mgr, seq, start, end, subst)
            }
            // The built-ins and lexicons share the generic longest-match
            // search loop over their matches method.
            _ => {
                let mut out = Vec::new();
                let mut at = start;
                while at < end {
                    let mut longest: Option<Match> = None;
                    for m in self.matches(mgr, seq, at, end, subst, name)? {
                        if m.end >= m.begin
                            && longest.as_ref().map_or(true, |best| m.end > best.end)
                        {
                            longest = Some(m);
                        }
                    }
                    match longest {
                        Some(m) => {
                            at = m.end.max(at + 1);
                            out.push(m);
                        }
                        None => at += 1,
                    }
                }
                Ok(out)
            }
        }
    }

    pub fn requirements(
        &self,
        mgr: &Rc<Manager>,
        subst: &Substitutions,
        name: &str,
    ) -> MatchResult<HashSet<Requirement>> {
        match self {
            PhraseExtractor::Pattern(pattern) => {
                pattern.nfa(mgr, name)?.requirements(mgr, subst)
            }
            PhraseExtractor::ParseRoot => {
                Ok(HashSet::from([Requirement::DepParse]))
            }
            _ => Ok(HashSet::new()),
        }
    }
}
