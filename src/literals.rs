// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Literal-prefix extraction and search, used by `exec.rs` to skip ahead
//! to candidate match positions before running a full matching engine.
//!
//! A regex prefix is a set of literal byte strings that *must* be
//! matched at the beginning of a search in order for the whole regex to
//! match. There are three ways we scan for one, cheapest first:
//!
//! 1. A single byte prefix: `memchr`.
//! 2. Two or more single-byte alternatives: a 256-entry sparse set.
//! 3. Anything else: an Aho-Corasick automaton over the alternatives.

use std::collections::HashSet;
use std::fmt;

use aho_corasick::AhoCorasick;
use memchr::memchr;

use crate::prog::{Inst, InstIdx, Prog};

const LITERAL_BUDGET: usize = 3000;

/// A set of candidate literal prefixes gathered by walking the compiled
/// program from its anchored start, plus whether finding one of them
/// guarantees the whole regex matches at that position (`at_match`).
struct AlternateLiterals {
    at_match: bool,
    literals: Vec<Vec<u8>>,
}

impl AlternateLiterals {
    fn empty() -> AlternateLiterals {
        AlternateLiterals { at_match: false, literals: vec![] }
    }

    fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    fn is_single_byte(&self) -> bool {
        self.literals.len() == 1 && self.literals[0].len() == 1
    }

    fn all_single_bytes(&self) -> bool {
        !self.literals.is_empty() && self.literals.iter().all(|s| s.len() == 1)
    }

    fn is_one_literal(&self) -> bool {
        self.literals.len() == 1
    }

    fn num_bytes(&self) -> usize {
        self.literals.iter().map(Vec::len).sum()
    }

    fn add_alternates(&mut self, alts: AlternateLiterals) {
        self.at_match = self.at_match && alts.at_match;
        self.literals.extend(alts.literals);
    }

    fn add_byte_range(&mut self, lo: u8, hi: u8) {
        let orig = std::mem::replace(&mut self.literals, Vec::new());
        for b in lo..=hi {
            for alt in &orig {
                let mut alt = alt.clone();
                alt.push(b);
                self.literals.push(alt);
            }
            if b == u8::MAX {
                break;
            }
        }
    }
}

/// Walks every branch reachable from the program's anchored start,
/// collecting the literal bytes that must appear at the very front of
/// any match. Bails out (returning an empty set) as soon as any branch
/// has no required prefix at all, or the total cost exceeds the budget.
struct PrefixBuilder<'r> {
    prog: &'r Prog,
    limit: usize,
}

impl<'r> PrefixBuilder<'r> {
    fn new(prog: &'r Prog) -> PrefixBuilder<'r> {
        PrefixBuilder { prog, limit: LITERAL_BUDGET }
    }

    fn build(&self) -> AlternateLiterals {
        let mut stack = vec![self.prog.start_anchored];
        let mut seen = HashSet::new();
        let mut out = AlternateLiterals { at_match: true, literals: vec![] };
        while let Some(pc) = stack.pop() {
            if !seen.insert(pc) {
                continue;
            }
            match *self.prog.get(pc) {
                Inst::Alt { out: o0, out1: o1 } => {
                    stack.push(o1);
                    stack.push(o0);
                    continue;
                }
                _ => {}
            }
            let branch = RequiredLiterals::new(self.prog, self.limit / 10).run(pc);
            if branch.is_empty() {
                return AlternateLiterals::empty();
            }
            if out.num_bytes() + branch.num_bytes() > self.limit {
                return AlternateLiterals::empty();
            }
            out.add_alternates(branch);
        }
        out
    }
}

/// Follows a single straight-line path (no further branching choices
/// that matter here — an inner `Alt` just means "stop, we can't say
/// anything more about what comes next") collecting the literal bytes
/// that must be consumed before the first real choice point or `Match`.
struct RequiredLiterals<'r> {
    prog: &'r Prog,
    limit: usize,
}

impl<'r> RequiredLiterals<'r> {
    fn new(prog: &'r Prog, limit: usize) -> RequiredLiterals<'r> {
        RequiredLiterals { prog, limit }
    }

    fn run(&self, mut pc: InstIdx) -> AlternateLiterals {
        let mut alts = AlternateLiterals { at_match: true, literals: vec![vec![]] };
        loop {
            match *self.prog.get(pc) {
                Inst::Nop { out } | Inst::Capture { out, .. } => pc = out,
                Inst::ByteRange { lo, hi, fold_ascii_case, out } => {
                    if fold_ascii_case {
                        alts.at_match = false;
                        break;
                    }
                    let nbytes = (hi - lo) as usize + 1;
                    let projected = alts.num_bytes() * nbytes + alts.literals.len() * nbytes;
                    if projected > self.limit {
                        alts.at_match = false;
                        break;
                    }
                    alts.add_byte_range(lo, hi);
                    pc = out;
                }
                Inst::Alt { .. } | Inst::EmptyWidth { .. } | Inst::Match { .. } => {
                    alts.at_match = leads_to_match(self.prog, pc);
                    break;
                }
                Inst::Fail => {
                    alts.at_match = false;
                    break;
                }
            }
        }
        if alts.literals.len() == 1 && alts.literals[0].is_empty() {
            AlternateLiterals::empty()
        } else {
            alts
        }
    }
}

/// True iff `pc`, after skipping `Nop`/`Capture` edges, is a bare `Match`
/// with nothing else in between — i.e. finding the literal bytes that led
/// here is sufficient on its own to know the whole regex matched, with no
/// remaining choice point or empty-width assertion left to check.
fn leads_to_match(prog: &Prog, mut pc: InstIdx) -> bool {
    loop {
        match *prog.get(pc) {
            Inst::Nop { out } | Inst::Capture { out, .. } => pc = out,
            Inst::Match { .. } => return true,
            _ => return false,
        }
    }
}

/// A compiled set of required literal prefixes, ready to scan a
/// haystack for candidate starting positions.
pub struct Literals {
    at_match: bool,
    matcher: LiteralMatcher,
}

enum LiteralMatcher {
    /// No useful prefix; never advances past position 0.
    Empty,
    Byte(u8),
    Bytes { sparse: Box<[bool; 256]> },
    Automaton(AhoCorasick),
}

impl Literals {
    /// Extract the required literal prefix set from `prog`, if any.
    pub fn extract(prog: &Prog) -> Literals {
        let alts = PrefixBuilder::new(prog).build();
        Self::from_alternates(alts)
    }

    fn from_alternates(mut alts: AlternateLiterals) -> Literals {
        if alts.is_empty() {
            return Literals { at_match: false, matcher: LiteralMatcher::Empty };
        }
        let at_match = alts.at_match;
        let matcher = if alts.is_single_byte() {
            LiteralMatcher::Byte(alts.literals[0][0])
        } else if alts.all_single_bytes() {
            let mut sparse = Box::new([false; 256]);
            for lit in &alts.literals {
                sparse[lit[0] as usize] = true;
            }
            LiteralMatcher::Bytes { sparse }
        } else {
            let lits = std::mem::take(&mut alts.literals);
            LiteralMatcher::Automaton(
                AhoCorasick::new(lits).expect("literal set builds a valid automaton"),
            )
        };
        Literals { at_match, matcher }
    }

    /// True iff a prefix match guarantees the whole regex matches there
    /// (so callers can skip running the full engine and just record the
    /// prefix's own span).
    pub fn at_match(&self) -> bool {
        self.at_match
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.matcher, LiteralMatcher::Empty)
    }

    /// Find the first candidate position (and its end) in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        match &self.matcher {
            LiteralMatcher::Empty => Some((0, 0)),
            LiteralMatcher::Byte(b) => memchr(*b, haystack).map(|i| (i, i + 1)),
            LiteralMatcher::Bytes { sparse } => {
                haystack.iter().position(|&b| sparse[b as usize]).map(|i| (i, i + 1))
            }
            LiteralMatcher::Automaton(ac) => {
                ac.find(haystack).map(|m| (m.start(), m.end()))
            }
        }
    }
}

impl fmt::Debug for Literals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Literals").field("at_match", &self.at_match).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;
    use crate::parse::{parse, ParseFlags};
    use crate::simplify::simplify;

    fn compile(pattern: &str) -> Prog {
        let ast = parse(pattern, ParseFlags::default()).unwrap();
        let simplified = simplify(&ast);
        Compiler::new(false, 10 << 20).compile(&simplified, Vec::new()).unwrap()
    }

    #[test]
    fn single_literal_prefix() {
        let prog = compile("abc");
        let lits = Literals::extract(&prog);
        assert!(!lits.is_empty());
        assert_eq!(lits.find(b"xxabcxx"), Some((2, 5)));
    }

    #[test]
    fn alternation_prefix_set() {
        let prog = compile("cat|dog");
        let lits = Literals::extract(&prog);
        assert_eq!(lits.find(b"the dog ran"), Some((4, 7)));
    }

    #[test]
    fn unanchored_star_has_no_useful_prefix() {
        let prog = compile("a*b");
        // `a*b` can start matching with zero `a`s, so there is no
        // required literal prefix byte.
        let lits = Literals::extract(&prog);
        assert!(lits.is_empty());
    }
}
