//! Parse matching: walking a dependency graph with an arc NFA.
//!
//! Arc matches use an inclusive end index, and the end may be smaller than
//! the begin when a walk runs primarily upward in the tree. Scanning does
//! not jump past matches: every start position is tried, and every
//! successful walk from a start is emitted, since a greedy jump would miss
//! alternative walks sharing a prefix node.

use super::{Nfa, NfaKind};
use crate::manager::Manager;
use crate::matches::Match;
use crate::sequence::TokenSequence;
use crate::{ExtractorKind, MatchError, MatchResult, Substitutions};
use std::collections::HashSet;
use std::rc::Rc;

struct ParseContext<'c> {
    mgr: &'c Rc<Manager>,
    seq: &'c Rc<TokenSequence>,
    start: usize,
    end: usize,
    subst: &'c Substitutions,
}

impl Nfa {
    pub(super) fn parse_matches(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        debug_assert_eq!(self.kind, NfaKind::Parse);
        let ctx = ParseContext {
            mgr,
            seq,
            start,
            end,
            subst,
        };
        let mut out = Vec::new();
        for sid in self.null_closure(&[self.initial()]) {
            // One visited set per walk origin, shared across the whole
            // recursion to keep cyclic graphs from looping.
            let mut visited: HashSet<(usize, usize)> = HashSet::new();
            self.arc_match(&ctx, start, sid, &mut visited, &mut out)?;
        }
        out.retain(|m| m.end != start);
        Ok(out)
    }

    fn arc_match(
        &self,
        ctx: &ParseContext,
        at: usize,
        sid: usize,
        visited: &mut HashSet<(usize, usize)>,
        out: &mut Vec<Match>,
    ) -> MatchResult<()> {
        if at > ctx.end || at.saturating_sub(ctx.start) > self.max_match {
            return Ok(());
        }
        if !visited.insert((sid, at)) {
            return Ok(());
        }
        if let Some(name) = self.state(sid).callout.clone() {
            let kind = ctx.mgr.lookup_kind(&name, ctx.subst)?;
            if !matches!(kind, ExtractorKind::Parse | ExtractorKind::Test) {
                return Err(MatchError::KindMismatch {
                    name,
                    expected: "parse or token test",
                    found: kind,
                });
            }
            let subs = ctx
                .mgr
                .matches(&name, ctx.seq, at, Some(ctx.end), ctx.subst)?;
            for mut sub in subs {
                sub.set_name(&name);
                if self.is_final(sid) {
                    let mut m = Match::arc(ctx.seq.clone(), ctx.start, sub.end);
                    m.name = self.name.clone();
                    m.add_submatch(sub.clone());
                    out.push(m);
                }
                for dest in self.null_transition_to(sid) {
                    let mut collected = Vec::new();
                    self.arc_match(ctx, sub.end, dest, visited, &mut collected)?;
                    for mut m in collected {
                        m.add_submatch(sub.clone());
                        out.push(m);
                    }
                }
            }
        } else {
            if at < ctx.end {
                for (dest, toki) in
                    self.transit_one_edge(sid, ctx.mgr, ctx.seq, at, ctx.subst)?
                {
                    // Label matches are not recorded as submatches of arc
                    // walks.
                    self.arc_match(ctx, toki, dest, visited, out)?;
                }
            }
            if self.is_final(sid) {
                let mut m = Match::arc(ctx.seq.clone(), ctx.start, at);
                m.name = self.name.clone();
                out.push(m);
            }
        }
        Ok(())
    }

    pub(super) fn parse_scan(
        &self,
        mgr: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let mut out = Vec::new();
        for at in start..end {
            out.extend(self.parse_matches(mgr, seq, at, end, subst)?);
        }
        Ok(out)
    }
}
