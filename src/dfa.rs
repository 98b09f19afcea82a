//! A lazy (on-the-fly) DFA (§4.6).
//!
//! States are built and cached only as they're reached, keyed by the
//! *set* of NFA instructions they represent (mirroring Thompson
//! construction's subset-construction idea) plus a small flag word
//! recording which empty-width assertions were true on entry. Building
//! a whole DFA ahead of time is exponential in the worst case; building
//! it lazily and caching transitions means the cost is proportional to
//! the states actually visited.
//!
//! This engine reports only match/no-match and the overall match
//! boundary (by running forward, then again in reverse from the forward
//! match's end to find the true start) -- it never tracks submatches.
//! `exec.rs` falls back to OnePass, BitState or the NFA simulation
//! whenever capture groups are requested.

use std::collections::HashMap;

use crate::input::{satisfied, Input};
use crate::prog::{Inst, InstIdx, Prog};

/// A subset of live instruction ids plus the flag word used to
/// disambiguate states that reach the same instructions through
/// different empty-width histories.
#[derive(Clone, Eq, PartialEq, Hash)]
struct StateKey {
    insts: Vec<InstIdx>,
    is_match: bool,
}

/// A sentinel-tagged cache entry instead of the original engine's
/// reserved-pointer-value trick (design notes recommend a tagged enum
/// here over punning specific pointer bit patterns).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StateId {
    Dead,
    Live(usize),
}

struct State {
    insts: Vec<InstIdx>,
    is_match: bool,
    next: Vec<Option<StateId>>,
}

/// Bails out of the DFA and signals the caller to fall back to another
/// engine -- either the program grew its cache past budget, or the
/// search hit a construct the DFA can't represent (never happens here
/// since every `Inst` variant is representable, but kept for parity
/// with the original's `NoMatch`-equivalent "quit" bailout).
#[derive(Debug)]
pub struct DfaBailed;

pub struct Dfa<'r> {
    prog: &'r Prog,
    states: Vec<State>,
    cache: HashMap<StateKey, StateId>,
    num_classes: usize,
}

impl<'r> Dfa<'r> {
    fn new(prog: &'r Prog) -> Dfa<'r> {
        Dfa { prog, states: Vec::new(), cache: HashMap::new(), num_classes: prog.byte_map.num_classes() }
    }

    /// Search `input` starting at or after `start` using the forward
    /// program `prog`. Returns the match span `(start, end)` on success.
    /// `anchored` requires the match to begin exactly at `start`. Bails
    /// out (falling back to another engine) if the instruction set ever
    /// exceeds the program's DFA memory budget -- tracked here simply as
    /// a cap on cached states, since each state costs roughly
    /// `num_classes` pointer-words.
    ///
    /// Finding the match's start requires a second pass: `reverse_prog`
    /// (the same pattern compiled with `Compiler::new(true, ..)`, see
    /// `exec::Executor`) is run backward from `end`, which is how the
    /// original engine avoids needing a DFA that tracks priority well
    /// enough to answer "where did this match begin" in one pass.
    pub fn search(
        prog: &'r Prog,
        reverse_prog: &'r Prog,
        input: Input,
        start: usize,
        anchored: bool,
    ) -> Result<Option<(usize, usize)>, DfaBailed> {
        let mut dfa = Dfa::new(prog);
        let end = match dfa.run(input, start, anchored, Direction::Forward)? {
            None => return Ok(None),
            Some(e) => e,
        };
        let mut rdfa = Dfa::new(reverse_prog);
        let begin = match rdfa.run(input, end, true, Direction::Backward)? {
            None => end, // degenerate empty-width-only match
            Some(b) => b,
        };
        Ok(Some((begin, end)))
    }

    fn budget_exceeded(&self) -> bool {
        let per_state = self.num_classes.max(1) * std::mem::size_of::<Option<StateId>>();
        self.states.len() * per_state > self.prog.dfa_size_limit
    }

    fn start_key(&self, input: Input, pos: usize, anchored_at: Option<usize>) -> StateKey {
        let start_pc = if anchored_at.is_some() { self.prog.start_anchored } else { self.prog.start_unanchored };
        let mut insts = Vec::new();
        let mut seen = vec![false; self.prog.len()];
        // Empty-width assertions refer to absolute text positions, so
        // `before`/`after` are the same regardless of which direction
        // (forward or reverse-program) this DFA instance is stepping.
        let before = input.context_before(pos);
        let after = input.context_after(pos);
        add_closure(self.prog, start_pc, before, after, &mut seen, &mut insts);
        let is_match = insts.iter().any(|&pc| matches!(self.prog.get(pc), Inst::Match { .. }));
        StateKey { insts, is_match }
    }

    fn intern(&mut self, key: StateKey) -> StateId {
        if let Some(&id) = self.cache.get(&key) {
            return id;
        }
        if key.insts.is_empty() {
            self.cache.insert(key, StateId::Dead);
            return StateId::Dead;
        }
        let id = StateId::Live(self.states.len());
        self.states.push(State {
            insts: key.insts.clone(),
            is_match: key.is_match,
            next: vec![None; self.num_classes],
        });
        self.cache.insert(key, id);
        id
    }

    fn transition(
        &mut self,
        id: usize,
        class: u8,
        input: Input,
        _pos: usize,
        next_pos: usize,
        _dir: Direction,
    ) -> StateId {
        if let Some(cached) = self.states[id].next[class as usize] {
            return cached;
        }
        let byte = self.prog.byte_map.representative(class);
        let mut insts = Vec::new();
        let mut seen = vec![false; self.prog.len()];
        let before = input.context_before(next_pos);
        let after = input.context_after(next_pos);
        for &pc in &self.states[id].insts.clone() {
            if let &Inst::ByteRange { lo, hi, fold_ascii_case, out } = self.prog.get(pc) {
                if byte_matches(byte, lo, hi, fold_ascii_case) {
                    add_closure(self.prog, out, before, after, &mut seen, &mut insts);
                }
            }
        }
        let is_match = insts.iter().any(|&pc| matches!(self.prog.get(pc), Inst::Match { .. }));
        let key = StateKey { insts, is_match };
        let next_id = self.intern(key);
        self.states[id].next[class as usize] = Some(next_id);
        next_id
    }

    /// Step the DFA from `start`, consuming input either increasing
    /// position (`Forward`) or decreasing it (`Backward`, used with a
    /// reverse-compiled program to recover a match's start). Returns the
    /// furthest position reached at which the state was a match.
    fn run(
        &mut self,
        input: Input,
        start: usize,
        anchored: bool,
        dir: Direction,
    ) -> Result<Option<usize>, DfaBailed> {
        let anchored_at = if anchored { Some(start) } else { None };
        let mut cur = self.intern(self.start_key(input, start, anchored_at));
        let mut last_match = None;
        let mut pos = start;
        loop {
            match cur {
                StateId::Dead => break,
                StateId::Live(id) => {
                    if self.states[id].is_match {
                        last_match = Some(pos);
                    }
                    let byte = match dir {
                        Direction::Forward => input.byte_at(pos),
                        Direction::Backward => {
                            if pos == 0 {
                                None
                            } else {
                                input.byte_at(pos - 1)
                            }
                        }
                    };
                    let byte = match byte {
                        None => break,
                        Some(b) => b,
                    };
                    if self.budget_exceeded() {
                        return Err(DfaBailed);
                    }
                    let class = self.prog.byte_map.class(byte);
                    let next_pos = match dir {
                        Direction::Forward => pos + 1,
                        Direction::Backward => pos - 1,
                    };
                    cur = self.transition(id, class, input, pos, next_pos, dir);
                    pos = next_pos;
                }
            }
        }
        Ok(last_match)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Direction {
    Forward,
    Backward,
}

fn add_closure(
    prog: &Prog,
    pc: InstIdx,
    before: Option<u8>,
    after: Option<u8>,
    seen: &mut [bool],
    out: &mut Vec<InstIdx>,
) {
    let mut stack = vec![pc];
    while let Some(pc) = stack.pop() {
        if seen[pc as usize] {
            continue;
        }
        seen[pc as usize] = true;
        match prog.get(pc) {
            Inst::Nop { out: o } | Inst::Capture { out: o, .. } => stack.push(*o),
            Inst::EmptyWidth { look, out: o } => {
                if satisfied(*look, before, after) {
                    stack.push(*o);
                }
            }
            Inst::Alt { out: o0, out1: o1 } => {
                stack.push(*o1);
                stack.push(*o0);
            }
            Inst::ByteRange { .. } | Inst::Match { .. } => out.push(pc),
            Inst::Fail => {}
        }
    }
}

#[inline]
fn byte_matches(b: u8, lo: u8, hi: u8, fold: bool) -> bool {
    if lo <= b && b <= hi {
        return true;
    }
    if fold {
        let swapped = match b {
            b'A'..=b'Z' => Some(b + 32),
            b'a'..=b'z' => Some(b - 32),
            _ => None,
        };
        if let Some(s) = swapped {
            return lo <= s && s <= hi;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;
    use crate::parse::{parse, ParseFlags};
    use crate::simplify::simplify;

    fn compile(pattern: &str) -> (Prog, Prog) {
        let ast = parse(pattern, ParseFlags::default()).unwrap();
        let simplified = simplify(&ast);
        let fwd = Compiler::new(false, 10 << 20).compile(&simplified, Vec::new()).unwrap();
        let rev = Compiler::new(true, 10 << 20).compile(&simplified, Vec::new()).unwrap();
        (fwd, rev)
    }

    #[test]
    fn finds_unanchored_match_span() {
        let (fwd, rev) = compile("b+");
        let found = Dfa::search(&fwd, &rev, Input::new(b"aabbbcc"), 0, false).unwrap();
        assert_eq!(found, Some((2, 5)));
    }

    #[test]
    fn no_match_returns_none() {
        let (fwd, rev) = compile("xyz");
        let found = Dfa::search(&fwd, &rev, Input::new(b"abc"), 0, false).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn anchored_search_rejects_later_match() {
        let (fwd, rev) = compile("^b+");
        let found = Dfa::search(&fwd, &rev, Input::new(b"abbb"), 0, true).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn never_nl_respects_class_exclusion() {
        let (fwd, rev) = compile("[^ ]+");
        let found = Dfa::search(&fwd, &rev, Input::new(b"ab cd"), 0, false).unwrap();
        assert_eq!(found, Some((0, 2)));
    }
}
