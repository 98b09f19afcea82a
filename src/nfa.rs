// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A Thompson-style NFA simulation that tracks submatches (§4.5).
//!
//! Two queues of threads (current, next) are stepped one byte at a
//! time; each thread is an instruction id plus a capture-register
//! snapshot. `add_thread` expands a single instruction through `Nop`,
//! `Capture`, `Alt` and `EmptyWidth` edges with an explicit stack so
//! that nesting depth, not host stack depth, bounds deeply nested
//! patterns. This never fails: the worst it does is report no match.

use crate::input::{satisfied, Input};
use crate::prog::{Inst, InstIdx, Prog};

/// Dense+sparse thread set: `contains` is O(1) without initialising the
/// dense array, same trick as the original engine's sparse set.
struct ThreadSet {
    dense: Vec<Thread>,
    sparse: Vec<u32>,
    len: usize,
}

#[derive(Clone)]
struct Thread {
    pc: InstIdx,
    caps: Vec<Option<usize>>,
}

impl ThreadSet {
    fn new(num_insts: usize, num_slots: usize) -> ThreadSet {
        ThreadSet {
            dense: vec![Thread { pc: 0, caps: vec![None; num_slots] }; num_insts],
            sparse: vec![0; num_insts],
            len: 0,
        }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn contains(&self, pc: InstIdx) -> bool {
        let s = self.sparse[pc as usize] as usize;
        s < self.len && self.dense[s].pc == pc
    }

    fn insert(&mut self, pc: InstIdx) -> usize {
        let i = self.len;
        self.dense[i].pc = pc;
        self.sparse[pc as usize] = i as u32;
        self.len += 1;
        i
    }
}

pub struct Nfa<'r> {
    prog: &'r Prog,
}

impl<'r> Nfa<'r> {
    /// Run the NFA over `input` starting at byte offset `start`.
    /// `anchored` forces the search to only consider matches beginning
    /// exactly at `start`. On success, `caps` holds `2*num_captures`
    /// slots (`None` for unset groups); pass an empty slice if only the
    /// boolean result is needed.
    pub fn search(
        prog: &'r Prog,
        input: Input,
        start: usize,
        anchored: bool,
        caps: &mut [Option<usize>],
    ) -> bool {
        let nfa = Nfa { prog };
        let num_slots = prog.num_captures * 2;
        let mut clist = ThreadSet::new(prog.len(), num_slots.max(caps.len()));
        let mut nlist = ThreadSet::new(prog.len(), num_slots.max(caps.len()));
        nfa.exec(&mut clist, &mut nlist, input, start, anchored, caps)
    }

    fn exec(
        &self,
        clist: &mut ThreadSet,
        nlist: &mut ThreadSet,
        input: Input,
        start: usize,
        anchored: bool,
        caps: &mut [Option<usize>],
    ) -> bool {
        let mut matched = false;
        let mut pos = start;
        clist.clear();
        nlist.clear();
        let num_slots = clist.dense.first().map_or(0, |t| t.caps.len());

        loop {
            if clist.len == 0 {
                if matched || (anchored && pos > start) {
                    break;
                }
            }
            if clist.len == 0 || (!anchored && !matched) {
                let mut scratch = vec![None; num_slots];
                self.add_thread(clist, &mut scratch, self.prog.start_unanchored, input, pos);
            }

            let this_byte = input.byte_at(pos);
            for i in 0..clist.len {
                let pc = clist.dense[i].pc;
                let mut thread_caps = clist.dense[i].caps.clone();
                match self.prog.get(pc) {
                    Inst::Match { .. } => {
                        if caps.len() >= thread_caps.len() {
                            caps[..thread_caps.len()].copy_from_slice(&thread_caps);
                        } else {
                            caps.copy_from_slice(&thread_caps[..caps.len()]);
                        }
                        matched = true;
                        // Leftmost-first: a match kills lower-priority
                        // threads in *this* step, but threads already
                        // queued in `nlist` (higher priority, further
                        // along) still get to finish.
                        break;
                    }
                    &Inst::ByteRange { lo, hi, fold_ascii_case, out } => {
                        if let Some(b) = this_byte {
                            if byte_matches(b, lo, hi, fold_ascii_case) {
                                self.add_thread(nlist, &mut thread_caps, out, input, pos + 1);
                            }
                        }
                    }
                    _ => {}
                }
            }

            if this_byte.is_none() {
                break;
            }
            pos += 1;
            std::mem::swap(clist, nlist);
            nlist.clear();
        }
        matched
    }

    fn add_thread(
        &self,
        list: &mut ThreadSet,
        thread_caps: &mut [Option<usize>],
        start_pc: InstIdx,
        input: Input,
        pos: usize,
    ) {
        if list.contains(start_pc) {
            return;
        }
        let slot = list.insert(start_pc);
        match self.prog.get(start_pc) {
            Inst::Nop { out } => {
                list.dense[slot].caps.copy_from_slice(thread_caps);
                self.add_thread(list, thread_caps, *out, input, pos);
            }
            Inst::EmptyWidth { look, out } => {
                let before = input.context_before(pos);
                let after = input.context_after(pos);
                list.dense[slot].caps.copy_from_slice(thread_caps);
                if satisfied(*look, before, after) {
                    self.add_thread(list, thread_caps, *out, input, pos);
                }
            }
            Inst::Capture { slot: cap_slot, out } => {
                list.dense[slot].caps.copy_from_slice(thread_caps);
                let cs = *cap_slot as usize;
                if cs < thread_caps.len() {
                    let old = thread_caps[cs];
                    thread_caps[cs] = Some(pos);
                    self.add_thread(list, thread_caps, *out, input, pos);
                    thread_caps[cs] = old;
                } else {
                    self.add_thread(list, thread_caps, *out, input, pos);
                }
            }
            Inst::Alt { out, out1 } => {
                let (out, out1) = (*out, *out1);
                list.dense[slot].caps.copy_from_slice(thread_caps);
                self.add_thread(list, thread_caps, out, input, pos);
                self.add_thread(list, thread_caps, out1, input, pos);
            }
            Inst::ByteRange { .. } | Inst::Match { .. } => {
                list.dense[slot].caps.copy_from_slice(thread_caps);
            }
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
        if let Some(swapped) = swap_ascii_case(b) {
            return lo <= swapped && swapped <= hi;
        }
    }
    false
}

#[inline]
fn swap_ascii_case(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b + 32),
        b'a'..=b'z' => Some(b - 32),
        _ => None,
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

    fn is_match(prog: &Prog, text: &str) -> bool {
        let mut caps = vec![];
        Nfa::search(prog, Input::new(text.as_bytes()), 0, false, &mut caps)
    }

    #[test]
    fn matches_simple_literal() {
        let prog = compile("abc");
        assert!(is_match(&prog, "xxabcxx"));
        assert!(!is_match(&prog, "xyz"));
    }

    #[test]
    fn anchored_requires_prefix() {
        let prog = compile("^abc");
        let mut caps = vec![];
        assert!(Nfa::search(&prog, Input::new(b"abcxx"), 0, true, &mut caps));
        assert!(!Nfa::search(&prog, Input::new(b"xabcxx"), 0, true, &mut caps));
    }

    #[test]
    fn captures_submatch_boundaries() {
        let prog = compile("a(b+)c");
        let mut caps = vec![None; prog.num_captures * 2];
        assert!(Nfa::search(&prog, Input::new(b"xabbbcX"), 0, false, &mut caps));
        assert_eq!(caps[2], Some(2));
        assert_eq!(caps[3], Some(5));
    }

    #[test]
    fn leftmost_first_prefers_first_alternative() {
        let prog = compile("a|ab");
        let mut caps = vec![None; 2];
        assert!(Nfa::search(&prog, Input::new(b"ab"), 0, true, &mut caps));
        assert_eq!(caps[1], Some(1)); // matched "a", not "ab"
    }

    #[test]
    fn star_does_not_loop_forever_on_empty_submatch() {
        // (a*)* must terminate cleanly rather than looping on an
        // empty-string inner match.
        let prog = compile("(a*)*");
        let mut caps = vec![None; prog.num_captures * 2];
        assert!(Nfa::search(&prog, Input::new(b""), 0, true, &mut caps));
    }
}
