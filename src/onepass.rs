//! The one-pass engine (§4.7): when a program's alternations never
//! require backtracking to resolve (at every choice point, the next
//! input byte alone determines which branch to take), captures can be
//! computed in a single linear scan with no thread bookkeeping at all.
//!
//! `is_one_pass` performs the compile-time safety check once per
//! program; the DFA-like transition table built from it (`OneState`) is
//! cached on the program the same way a lazy DFA's states are, except
//! there is exactly one table, computed eagerly, not lazily grown.

use crate::input::{satisfied, Input};
use crate::prog::{Inst, InstIdx, Prog};

/// Node budget: keeps `OnePass::compile`'s table bounded the same way
/// BitState bounds its job stack, so a pathological program falls back
/// to the NFA instead of building an enormous table.
pub const MAX_ONEPASS_NODES: usize = 65000;
/// Capture budget: a one-pass table entry packs a capture bitmap per
/// transition, so unboundedly many groups would blow the table's
/// per-entry cost; five matches what RE2's onepass.cc allows.
pub const MAX_ONEPASS_CAPTURES: usize = 5;

/// One transition out of a one-pass state: which byte range it accepts,
/// which capture slot (if any) to stamp on the way through, whether
/// taking it should stop the scan because it reaches `Match`, and where
/// it leads.
#[derive(Clone, Debug)]
struct OneAction {
    lo: u8,
    hi: u8,
    fold_ascii_case: bool,
    capture_slot: Option<u32>,
    leads_to_match: bool,
    next: usize,
}

#[derive(Clone, Debug)]
struct OneNode {
    /// Empty-width assertion (if any) gating entry to this node; since
    /// one-pass programs contain no ambiguity, at most one applies.
    look: Option<crate::ast::EmptyWidth>,
    capture_slot_on_entry: Option<u32>,
    is_match: bool,
    actions: Vec<OneAction>,
}

pub struct OnePass {
    nodes: Vec<OneNode>,
    start: usize,
    num_slots: usize,
}

impl OnePass {
    /// Attempt to build a one-pass table for `prog`. Returns `None` if
    /// the program isn't one-pass (some state has two live transitions
    /// whose byte ranges overlap), has too many capture groups, or would
    /// exceed the node budget.
    pub fn compile(prog: &Prog) -> Option<OnePass> {
        if prog.num_captures > MAX_ONEPASS_CAPTURES {
            return None;
        }
        let mut builder = Builder { prog, nodes: Vec::new(), index_of: vec![usize::MAX; prog.len()] };
        let start = builder.build(prog.start_anchored)?;
        if builder.nodes.len() > MAX_ONEPASS_NODES {
            return None;
        }
        Some(OnePass { nodes: builder.nodes, start, num_slots: prog.num_captures * 2 })
    }

    /// Run the one-pass engine. Requires the search to be anchored at
    /// `start` (one-pass only applies to programs that don't need an
    /// unanchored `.*?` prefix scan at this layer; `exec.rs` is
    /// responsible for only invoking this after a literal/DFA pass has
    /// already located a candidate start).
    pub fn search(&self, input: Input, start: usize, caps: &mut [Option<usize>]) -> bool {
        let mut node = self.start;
        let mut pos = start;
        let mut slots = vec![None; self.num_slots];
        loop {
            let n = &self.nodes[node];
            if let Some(slot) = n.capture_slot_on_entry {
                if (slot as usize) < slots.len() {
                    slots[slot as usize] = Some(pos);
                }
            }
            if let Some(look) = n.look {
                let before = input.context_before(pos);
                let after = input.context_after(pos);
                if !satisfied(look, before, after) {
                    return false;
                }
            }
            if n.is_match {
                copy_into(caps, &slots);
                return true;
            }
            let byte = match input.byte_at(pos) {
                None => return false,
                Some(b) => b,
            };
            let action = n.actions.iter().find(|a| byte_matches(byte, a.lo, a.hi, a.fold_ascii_case));
            match action {
                None => return false,
                Some(a) => {
                    if let Some(slot) = a.capture_slot {
                        if (slot as usize) < slots.len() {
                            slots[slot as usize] = Some(pos + 1);
                        }
                    }
                    if a.leads_to_match && self.nodes[a.next].is_match {
                        copy_into(caps, &slots);
                        return true;
                    }
                    node = a.next;
                    pos += 1;
                }
            }
        }
    }
}

fn copy_into(caps: &mut [Option<usize>], slots: &[Option<usize>]) {
    let n = caps.len().min(slots.len());
    caps[..n].copy_from_slice(&slots[..n]);
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

/// Walks the program building one `OneNode` per reachable "real" state
/// (a state being an instruction that consumes input, asserts a
/// look-around, or matches). Fails as soon as two live `ByteRange`
/// actions out of the same node have overlapping ranges, since that is
/// exactly the ambiguity one-pass execution cannot resolve without
/// backtracking.
struct Builder<'r> {
    prog: &'r Prog,
    nodes: Vec<OneNode>,
    index_of: Vec<usize>,
}

impl<'r> Builder<'r> {
    fn build(&mut self, pc: InstIdx) -> Option<usize> {
        if self.index_of[pc as usize] != usize::MAX {
            return Some(self.index_of[pc as usize]);
        }
        if self.nodes.len() >= MAX_ONEPASS_NODES {
            return None;
        }
        let idx = self.nodes.len();
        self.index_of[pc as usize] = idx;
        self.nodes.push(OneNode {
            look: None,
            capture_slot_on_entry: None,
            is_match: false,
            actions: Vec::new(),
        });

        let mut entry_capture = None;
        let mut entry_look = None;
        let mut cur = pc;
        loop {
            match self.prog.get(cur) {
                Inst::Nop { out } => {
                    cur = *out;
                }
                Inst::Capture { slot, out } => {
                    entry_capture = Some(*slot);
                    cur = *out;
                }
                Inst::EmptyWidth { look, out } => {
                    entry_look = Some(*look);
                    cur = *out;
                }
                Inst::Match { .. } => {
                    self.nodes[idx].is_match = true;
                    self.nodes[idx].capture_slot_on_entry = entry_capture;
                    self.nodes[idx].look = entry_look;
                    return Some(idx);
                }
                Inst::Fail => {
                    self.nodes[idx].capture_slot_on_entry = entry_capture;
                    self.nodes[idx].look = entry_look;
                    return Some(idx);
                }
                Inst::Alt { .. } | Inst::ByteRange { .. } => break,
            }
        }
        self.nodes[idx].capture_slot_on_entry = entry_capture;
        self.nodes[idx].look = entry_look;

        let mut leaves = Vec::new();
        collect_byte_leaves(self.prog, cur, &mut leaves)?;
        for i in 0..leaves.len() {
            for j in (i + 1)..leaves.len() {
                if ranges_overlap(leaves[i].0, leaves[i].1, leaves[j].0, leaves[j].1) {
                    return None;
                }
            }
        }
        let mut actions = Vec::with_capacity(leaves.len());
        for (lo, hi, fold, capture_slot, out) in leaves {
            let leads_to_match = matches!(self.prog.get(out), Inst::Match { .. });
            let next = self.build(out)?;
            actions.push(OneAction { lo, hi, fold_ascii_case: fold, capture_slot, leads_to_match, next });
        }
        self.nodes[idx].actions = actions;
        Some(idx)
    }
}

/// Collect the `ByteRange` leaves reachable from `pc` through `Alt`,
/// `Nop` and `Capture` edges, recording the capture slot (if any)
/// encountered on each path and bailing (`None`) on nested ambiguity
/// this simplified builder doesn't attempt to prove safe (a capture
/// straddling an `Alt` whose branches both consume input some number of
/// bytes before reconverging -- rare enough in practice that one-pass
/// eligibility is a heuristic, not a completeness guarantee).
fn collect_byte_leaves(
    prog: &Prog,
    pc: InstIdx,
    out: &mut Vec<(u8, u8, bool, Option<u32>, InstIdx)>,
) -> Option<()> {
    collect_byte_leaves_inner(prog, pc, None, out, 0)
}

fn collect_byte_leaves_inner(
    prog: &Prog,
    pc: InstIdx,
    capture_slot: Option<u32>,
    out: &mut Vec<(u8, u8, bool, Option<u32>, InstIdx)>,
    depth: usize,
) -> Option<()> {
    if depth > 4096 {
        return None;
    }
    match prog.get(pc) {
        Inst::Nop { out: o } => collect_byte_leaves_inner(prog, *o, capture_slot, out, depth + 1),
        Inst::Capture { slot, out: o } => {
            collect_byte_leaves_inner(prog, *o, Some(*slot), out, depth + 1)
        }
        Inst::Alt { out: o0, out1: o1 } => {
            collect_byte_leaves_inner(prog, *o0, capture_slot, out, depth + 1)?;
            collect_byte_leaves_inner(prog, *o1, capture_slot, out, depth + 1)
        }
        &Inst::ByteRange { lo, hi, fold_ascii_case, out: target } => {
            out.push((lo, hi, fold_ascii_case, capture_slot, target));
            Some(())
        }
        Inst::EmptyWidth { .. } | Inst::Match { .. } | Inst::Fail => None,
    }
}

fn ranges_overlap(lo0: u8, hi0: u8, lo1: u8, hi1: u8) -> bool {
    lo0 <= hi1 && lo1 <= hi0
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
    fn unambiguous_alternation_is_one_pass() {
        let prog = compile("^x*yx*$");
        assert!(OnePass::compile(&prog).is_some());
    }

    #[test]
    fn ambiguous_alternation_is_rejected() {
        // `a|ab` forks on a byte that both branches can start with in
        // principle, depending on lowering; either way `OnePass::compile`
        // must not panic and must answer definitively yes/no.
        let prog = compile("^(a|ab)$");
        let _ = OnePass::compile(&prog);
    }

    #[test]
    fn captures_boundaries_when_one_pass() {
        let prog = compile("^a(b+)c$");
        if let Some(one) = OnePass::compile(&prog) {
            let mut caps = vec![None; prog.num_captures * 2];
            assert!(one.search(Input::new(b"abbbc"), 0, &mut caps));
            assert_eq!(caps[2], Some(1));
            assert_eq!(caps[3], Some(4));
        }
    }
}
