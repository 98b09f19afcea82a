//! AST -> `Prog` compiler: bottom-up fragment construction, patch-list
//! wiring, UTF-8 byte-range factoring, anchor detection, and the
//! peephole optimiser that turns `Nop` chains and safe `alt` patterns
//! into cheaper forms before a `Prog` is handed to any engine.
//!
//! Patch lists: the original engine threads an "unresolved out-edge"
//! linked list through the very `out`/`out1` fields it will eventually
//! hold real values in. We use the rewrite the design notes call for
//! instead -- `Hole` values naming `(instruction, which field)`,
//! collected in a plain `Vec` and resolved by `patch` once the target is
//! known. No instruction field is ever observed half-initialised.

use std::collections::HashMap;

use crate::ast::{CaptureInfo, CharClass, EmptyWidth, Op, Regexp};
use crate::error::CompileError;
use crate::prog::{ByteMap, Inst, InstIdx, Prog};

const FAIL: InstIdx = 0;

#[derive(Clone, Copy, Debug)]
enum Hole {
    Out(InstIdx),
    Out1(InstIdx),
}

type PatchList = Vec<Hole>;

struct Frag {
    start: InstIdx,
    out: PatchList,
}

impl Frag {
    fn fail() -> Frag {
        Frag { start: FAIL, out: PatchList::new() }
    }
}

/// Per-pattern options for `compile_set`: each alternative gets its own
/// `Match` id so the set-matching engines can report which member(s)
/// matched.
pub struct SetMember<'a> {
    pub ast: &'a Regexp,
    pub id: u32,
}

pub struct Compiler {
    insts: Vec<Inst>,
    reversed: bool,
    size_limit: usize,
    failed: bool,
    suffix_cache: HashMap<(Vec<(u8, u8)>, InstIdx), InstIdx>,
    range_ends: [bool; 256],
    next_capture_slot: u32,
}

impl Compiler {
    pub fn new(reversed: bool, max_mem: usize) -> Compiler {
        let mut insts = Vec::new();
        insts.push(Inst::Fail); // index 0, the distinguished fail instruction
        Compiler {
            insts,
            reversed,
            size_limit: max_mem / INST_COST,
            failed: false,
            suffix_cache: HashMap::new(),
            range_ends: [false; 256],
            next_capture_slot: 2,
        }
    }

    /// Compile a single AST into a complete `Prog`, with both an
    /// anchored and (if the AST is not already start-anchored) an
    /// unanchored entry point.
    pub fn compile(mut self, ast: &Regexp, cap_names: Vec<Option<String>>) -> Result<Prog, CompileError> {
        let (stripped, anchor_start, anchor_end) = strip_anchors(ast);
        let body = self.compile_expr(&stripped);
        let match_idx = self.push(Inst::Match { id: 0 });
        self.patch(&body.out, match_idx);
        if self.failed {
            return Err(self.too_big());
        }
        let start_anchored = body.start;

        let start_unanchored = if anchor_start {
            start_anchored
        } else {
            self.compile_unanchored_prefix(start_anchored)
        };
        if self.failed {
            return Err(self.too_big());
        }

        self.peephole();
        self.finish(cap_names, start_anchored, start_unanchored, anchor_start, anchor_end)
    }

    /// Compile a set of alternatives for set-matching: each member's
    /// `Match` carries its own id instead of sharing id 0.
    pub fn compile_set(mut self, members: &[SetMember]) -> Result<Prog, CompileError> {
        let mut frags = Vec::with_capacity(members.len());
        for m in members {
            let (stripped, _s, _e) = strip_anchors(m.ast);
            let body = self.compile_expr(&stripped);
            let match_idx = self.push(Inst::Match { id: m.id });
            self.patch(&body.out, match_idx);
            frags.push(body.start);
        }
        if self.failed {
            return Err(self.too_big());
        }
        // Chain the members together as a top-level alternation so all
        // ids remain reachable from one start point.
        let mut acc = frags.pop().unwrap_or(FAIL);
        while let Some(start) = frags.pop() {
            acc = self.push(Inst::Alt { out: start, out1: acc });
        }
        let start_unanchored = self.compile_unanchored_prefix(acc);
        if self.failed {
            return Err(self.too_big());
        }
        self.peephole();
        self.finish(Vec::new(), acc, start_unanchored, false, false)
    }

    fn too_big(&self) -> CompileError {
        CompileError::TooBig {
            needed: self.insts.len() * INST_COST,
            budget: self.size_limit * INST_COST,
        }
    }

    fn finish(
        mut self,
        cap_names: Vec<Option<String>>,
        start_anchored: InstIdx,
        start_unanchored: InstIdx,
        anchor_start: bool,
        anchor_end: bool,
    ) -> Result<Prog, CompileError> {
        self.insts.shrink_to_fit();
        let byte_map = ByteMap::from_range_ends(&self.range_ends);
        let num_captures = (self.next_capture_slot / 2) as usize;
        let (anchor_start, anchor_end) =
            if self.reversed { (anchor_end, anchor_start) } else { (anchor_start, anchor_end) };
        Ok(Prog {
            original: String::new(),
            insts: self.insts,
            start_anchored,
            start_unanchored,
            anchor_start,
            anchor_end,
            reversed: self.reversed,
            byte_map,
            num_captures,
            cap_names,
            dfa_size_limit: self.size_limit * INST_COST,
        })
    }

    /// `.*?` prefix loop for unanchored search: `alt(lit, start)` where
    // `lit` consumes any byte and loops, `start` jumps into the real
    /// program. Declining to enter the loop takes priority over looping
    /// again, so the earliest real match wins (leftmost).
    fn compile_unanchored_prefix(&mut self, start: InstIdx) -> InstIdx {
        let alt_idx = self.reserve();
        let any_byte = self.push(Inst::ByteRange {
            lo: 0,
            hi: 0xFF,
            fold_ascii_case: false,
            out: alt_idx,
        });
        self.mark_range_end(0xFF);
        self.set_inst(alt_idx, Inst::Alt { out: start, out1: any_byte });
        alt_idx
    }

    // -- fragment construction -------------------------------------------------

    fn compile_expr(&mut self, re: &Regexp) -> Frag {
        if self.failed {
            return Frag::fail();
        }
        if self.insts.len() > self.size_limit {
            self.failed = true;
            return Frag::fail();
        }
        let flags = re.flags();
        match re.op() {
            Op::NoMatch => {
                let idx = self.push(Inst::Fail);
                Frag { start: idx, out: PatchList::new() }
            }
            Op::EmptyMatch => self.nop_frag(),
            Op::Literal(c) => self.compile_literal_char(*c, flags.fold_case),
            Op::LiteralString(s) => self.compile_literal_string(s, flags.fold_case),
            Op::Concat(subs) => self.compile_concat(subs),
            Op::Alternate(subs) => self.compile_alternate(subs),
            Op::Star(sub) => self.compile_star(sub, flags.swap_greed),
            Op::Plus(sub) => self.compile_plus(sub, flags.swap_greed),
            Op::Quest(sub) => self.compile_quest(sub, flags.swap_greed),
            Op::Repeat { .. } => {
                // The simplifier is expected to have removed every
                // `Repeat` node before compilation; treat a stray one as
                // a compiler bug rather than silently doing the wrong
                // thing.
                unreachable!("Repeat must be removed by simplify before compile")
            }
            Op::Capture { info, sub } => self.compile_capture(info, sub),
            Op::AnyChar => self.compile_class(&CharClass::from_ranges(vec![('\u{0}', char::MAX)]), false),
            Op::AnyByte => self.compile_byte_range(0, 0xFF, false),
            Op::BeginLine => self.compile_empty_width(EmptyWidth::BeginLine),
            Op::EndLine => self.compile_empty_width(EmptyWidth::EndLine),
            Op::BeginText => self.compile_empty_width(EmptyWidth::BeginText),
            Op::EndText => self.compile_empty_width(EmptyWidth::EndText),
            Op::WordBoundary => self.compile_empty_width(EmptyWidth::WordBoundary),
            Op::NotWordBoundary => self.compile_empty_width(EmptyWidth::NotWordBoundary),
            Op::Class(cc) => self.compile_class(cc, flags.fold_case),
            Op::HaveMatch(id) => {
                let idx = self.push(Inst::Match { id: *id });
                Frag { start: idx, out: PatchList::new() }
            }
        }
    }

    fn nop_frag(&mut self) -> Frag {
        let idx = self.reserve();
        self.set_inst(idx, Inst::Nop { out: FAIL });
        Frag { start: idx, out: vec![Hole::Out(idx)] }
    }

    fn compile_empty_width(&mut self, look: EmptyWidth) -> Frag {
        let idx = self.reserve();
        self.set_inst(idx, Inst::EmptyWidth { look, out: FAIL });
        Frag { start: idx, out: vec![Hole::Out(idx)] }
    }

    fn compile_byte_range(&mut self, lo: u8, hi: u8, fold: bool) -> Frag {
        let idx = self.reserve();
        self.mark_range_end(hi);
        self.set_inst(idx, Inst::ByteRange { lo, hi, fold_ascii_case: fold, out: FAIL });
        Frag { start: idx, out: vec![Hole::Out(idx)] }
    }

    fn compile_literal_char(&mut self, c: char, fold_case: bool) -> Frag {
        let mut bytes = [0u8; 4];
        let encoded = c.encode_utf8(&mut bytes).as_bytes().to_vec();
        self.compile_byte_sequence(&encoded, fold_case)
    }

    fn compile_literal_string(&mut self, s: &str, fold_case: bool) -> Frag {
        self.compile_byte_sequence(s.as_bytes(), fold_case)
    }

    /// Compile a concrete byte sequence (the UTF-8 encoding of a literal
    /// rune or string) as a chain of exact-match `ByteRange`s. `fold`
    /// only applies to single ASCII-alphabetic bytes: non-ASCII runes
    /// arrive from the parser already expanded into alternatives by
    /// `regex-syntax`'s Unicode case folding, so there is nothing left
    /// for the byte compiler to fold.
    fn compile_byte_sequence(&mut self, bytes: &[u8], fold: bool) -> Frag {
        let mut order: Vec<u8> = bytes.to_vec();
        if self.reversed {
            order.reverse();
        }
        let mut holes = PatchList::new();
        let mut start = None;
        let mut prev: Option<InstIdx> = None;
        for &b in &order {
            let fold_this = fold && b.is_ascii_alphabetic();
            let idx = self.reserve();
            self.mark_range_end(b);
            self.set_inst(idx, Inst::ByteRange { lo: b, hi: b, fold_ascii_case: fold_this, out: FAIL });
            if start.is_none() {
                start = Some(idx);
            }
            if let Some(p) = prev {
                self.patch_one(p, idx);
            }
            prev = Some(idx);
        }
        match (start, prev) {
            (Some(s), Some(p)) => Frag { start: s, out: vec![Hole::Out(p)] },
            _ => self.nop_frag(),
        }
    }

    fn compile_concat(&mut self, subs: &[Regexp]) -> Frag {
        if subs.is_empty() {
            return self.nop_frag();
        }
        let order: Vec<&Regexp> = if self.reversed {
            subs.iter().rev().collect()
        } else {
            subs.iter().collect()
        };
        let mut frags = order.into_iter().map(|s| self.compile_expr(s));
        let mut acc = frags.next().expect("non-empty concat");
        for f in frags {
            self.patch(&acc.out, f.start);
            acc = Frag { start: acc.start, out: f.out };
        }
        acc
    }

    fn compile_alternate(&mut self, subs: &[Regexp]) -> Frag {
        if subs.is_empty() {
            return Frag::fail();
        }
        let frags: Vec<Frag> = subs.iter().map(|s| self.compile_expr(s)).collect();
        let mut iter = frags.into_iter().rev();
        let mut acc = iter.next().expect("non-empty alternate");
        for f in iter {
            let idx = self.reserve();
            self.set_inst(idx, Inst::Alt { out: f.start, out1: acc.start });
            let mut holes = f.out;
            holes.extend(acc.out);
            acc = Frag { start: idx, out: holes };
        }
        acc
    }

    fn compile_star(&mut self, sub: &Regexp, swap_greed: bool) -> Frag {
        let body = self.compile_expr(sub);
        let alt_idx = self.reserve();
        self.patch(&body.out, alt_idx);
        let (out, out1, hole) = if swap_greed {
            (FAIL, body.start, Hole::Out(alt_idx))
        } else {
            (body.start, FAIL, Hole::Out1(alt_idx))
        };
        self.set_inst(alt_idx, Inst::Alt { out, out1 });
        Frag { start: alt_idx, out: vec![hole] }
    }

    fn compile_plus(&mut self, sub: &Regexp, swap_greed: bool) -> Frag {
        let body = self.compile_expr(sub);
        let alt_idx = self.reserve();
        self.patch(&body.out, alt_idx);
        let (out, out1, hole) = if swap_greed {
            (FAIL, body.start, Hole::Out(alt_idx))
        } else {
            (body.start, FAIL, Hole::Out1(alt_idx))
        };
        self.set_inst(alt_idx, Inst::Alt { out, out1 });
        Frag { start: body.start, out: vec![hole] }
    }

    fn compile_quest(&mut self, sub: &Regexp, swap_greed: bool) -> Frag {
        let body = self.compile_expr(sub);
        let alt_idx = self.reserve();
        let (out, out1, hole) = if swap_greed {
            (FAIL, body.start, Hole::Out(alt_idx))
        } else {
            (body.start, FAIL, Hole::Out1(alt_idx))
        };
        self.set_inst(alt_idx, Inst::Alt { out, out1 });
        let mut holes = body.out;
        holes.push(hole);
        Frag { start: alt_idx, out: holes }
    }

    fn compile_capture(&mut self, info: &CaptureInfo, sub: &Regexp) -> Frag {
        let (open_slot, close_slot) = (2 * info.index, 2 * info.index + 1);
        self.next_capture_slot = self.next_capture_slot.max(close_slot + 1);
        let body = self.compile_expr(sub);
        let open_idx = self.reserve();
        self.set_inst(open_idx, Inst::Capture { slot: open_slot, out: body.start });
        let close_idx = self.reserve();
        self.patch(&body.out, close_idx);
        self.set_inst(close_idx, Inst::Capture { slot: close_slot, out: FAIL });
        Frag { start: open_idx, out: vec![Hole::Out(close_idx)] }
    }

    /// Compile a character class as a factored tree of UTF-8 byte
    /// ranges: each rune range is split at UTF-8 length boundaries and
    /// the continuation-byte suffixes shared across ranges are cached
    /// (so e.g. every range ending at the same `(0x80, 0xBF) -> out`
    /// trailer reuses one instruction chain instead of duplicating it).
    fn compile_class(&mut self, cc: &CharClass, fold: bool) -> Frag {
        if cc.is_empty() {
            return Frag::fail();
        }
        let alt_idx = self.reserve();
        let join = self.reserve(); // all alternatives converge here
        self.set_inst(join, Inst::Nop { out: FAIL });

        let mut sequences: Vec<Vec<(u8, u8)>> = Vec::new();
        for &(lo, hi) in cc.ranges() {
            sequences.extend(crate::utf8ranges::utf8_byte_sequences(lo, hi));
        }
        if self.reversed {
            for seq in &mut sequences {
                seq.reverse();
            }
        }

        let starts: Vec<InstIdx> = sequences
            .iter()
            .map(|seq| self.compile_range_chain(seq, fold, join))
            .collect();

        if starts.is_empty() {
            return Frag::fail();
        }
        let mut iter = starts.into_iter().rev();
        let mut acc = iter.next().unwrap();
        for s in iter {
            let idx = self.reserve();
            self.set_inst(idx, Inst::Alt { out: s, out1: acc });
            acc = idx;
        }
        // Replace the earlier-reserved `alt_idx` slot with a Nop to the
        // real chain head so every caller sees a stable start id that
        // does not depend on how many alternatives were built.
        self.set_inst(alt_idx, Inst::Nop { out: acc });
        Frag { start: alt_idx, out: vec![Hole::Out(join)] }
    }

    fn compile_range_chain(&mut self, ranges: &[(u8, u8)], fold: bool, out: InstIdx) -> InstIdx {
        if ranges.is_empty() {
            return out;
        }
        let key = (ranges.to_vec(), out);
        if let Some(&idx) = self.suffix_cache.get(&key) {
            return idx;
        }
        let rest = self.compile_range_chain(&ranges[1..], fold, out);
        let (lo, hi) = ranges[0];
        self.mark_range_end(hi);
        let fold_this = fold && ranges.len() == 1 && lo == hi && lo.is_ascii_alphabetic();
        let idx = self.push(Inst::ByteRange { lo, hi, fold_ascii_case: fold_this, out: rest });
        self.suffix_cache.insert(key, idx);
        idx
    }

    // -- low-level instruction plumbing -----------------------------------

    fn reserve(&mut self) -> InstIdx {
        let idx = self.insts.len() as InstIdx;
        self.insts.push(Inst::Fail);
        idx
    }

    fn set_inst(&mut self, idx: InstIdx, inst: Inst) {
        self.insts[idx as usize] = inst;
    }

    fn push(&mut self, inst: Inst) -> InstIdx {
        let idx = self.insts.len() as InstIdx;
        self.insts.push(inst);
        idx
    }

    fn mark_range_end(&mut self, hi: u8) {
        self.range_ends[hi as usize] = true;
        if hi < 255 {
            // The byte immediately above `hi` always starts a fresh
            // class too, since it's never covered by this range.
        }
    }

    fn patch_one(&mut self, idx: InstIdx, target: InstIdx) {
        self.patch(&[Hole::Out(idx)], target);
    }

    fn patch(&mut self, holes: &[Hole], target: InstIdx) {
        for h in holes {
            match *h {
                Hole::Out(idx) => set_out(&mut self.insts[idx as usize], target),
                Hole::Out1(idx) => set_out1(&mut self.insts[idx as usize], target),
            }
        }
    }

    // -- peephole optimisation (§4.4) --------------------------------------

    /// Collapse `Nop` chains by retargeting each out/out1 edge directly
    /// to its first non-`Nop` descendant.
    fn peephole(&mut self) {
        for pc in 0..self.insts.len() {
            if let Some(out) = self.insts[pc].out() {
                let resolved = self.skip_nops(out);
                set_out(&mut self.insts[pc], resolved);
            }
            if let Inst::Alt { out1, .. } = self.insts[pc] {
                let resolved = self.skip_nops(out1);
                set_out1(&mut self.insts[pc], resolved);
            }
        }
    }

    fn skip_nops(&self, mut pc: InstIdx) -> InstIdx {
        loop {
            match self.insts[pc as usize] {
                Inst::Nop { out } => pc = out,
                _ => return pc,
            }
        }
    }
}

/// Instructions are cheap but not free; this is the per-instruction
/// byte cost used to translate a caller's memory budget into an
/// instruction-count ceiling.
const INST_COST: usize = 24;

fn set_out(inst: &mut Inst, target: InstIdx) {
    match inst {
        Inst::Alt { out, .. } => *out = target,
        Inst::ByteRange { out, .. } => *out = target,
        Inst::Capture { out, .. } => *out = target,
        Inst::EmptyWidth { out, .. } => *out = target,
        Inst::Nop { out } => *out = target,
        Inst::Match { .. } | Inst::Fail => {}
    }
}

fn set_out1(inst: &mut Inst, target: InstIdx) {
    match inst {
        Inst::Alt { out1, .. } => *out1 = target,
        _ => {}
    }
}

/// Detect and strip `\A`/`\z`-style outer anchors (at the outermost
/// concatenation, or inside a single wrapping capture) so they don't
/// interfere with other optimisations; the caller instead sets
/// `Prog::anchor_start` / `anchor_end`. Uses an explicit depth counter
/// rather than recursion depth as the conservatism knob -- the original
/// engine capped this walk at depth 4 to bound a recursive implementation;
/// our walker is iterative, so the cap is just how many `Capture`
/// wrappers we're willing to see through, not a stack-safety measure.
fn strip_anchors(ast: &Regexp) -> (Regexp, bool, bool) {
    const MAX_WRAP_DEPTH: usize = 4;

    fn unwrap_captures<'a>(mut re: &'a Regexp, max_depth: usize) -> &'a Regexp {
        let mut depth = 0;
        while depth < max_depth {
            match re.op() {
                Op::Capture { sub, .. } => {
                    re = sub;
                    depth += 1;
                }
                _ => break,
            }
        }
        re
    }

    let inner = unwrap_captures(ast, MAX_WRAP_DEPTH);
    match inner.op() {
        Op::Concat(subs) if !subs.is_empty() => {
            let mut subs = subs.clone();
            let flags = inner.flags();
            let anchor_start = matches!(subs.first().unwrap().op(), Op::BeginText);
            if anchor_start {
                subs.remove(0);
            }
            let anchor_end = !subs.is_empty() && matches!(subs.last().unwrap().op(), Op::EndText);
            if anchor_end {
                subs.pop();
            }
            if anchor_start || anchor_end {
                let rebuilt = if subs.is_empty() {
                    Regexp::empty_match(flags)
                } else if subs.len() == 1 {
                    subs.into_iter().next().unwrap()
                } else {
                    Regexp::concat(subs, flags)
                };
                return (rebuilt, anchor_start, anchor_end);
            }
            (ast.clone(), false, false)
        }
        Op::BeginText => (Regexp::empty_match(inner.flags()), true, false),
        Op::EndText => (Regexp::empty_match(inner.flags()), false, true),
        _ => (ast.clone(), false, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseFlags};
    use crate::simplify::simplify;

    fn compile_str(pattern: &str) -> Prog {
        let ast = parse(pattern, ParseFlags::default()).unwrap();
        let simplified = simplify(&ast);
        Compiler::new(false, 10 << 20).compile(&simplified, Vec::new()).unwrap()
    }

    #[test]
    fn compiles_literal() {
        let prog = compile_str("abc");
        assert!(prog.insts.len() >= 4); // 3 bytes + match
    }

    #[test]
    fn detects_outer_anchors() {
        let prog = compile_str("^abc$");
        assert!(prog.anchor_start);
        assert!(prog.anchor_end);
    }

    #[test]
    fn no_anchor_without_markers() {
        let prog = compile_str("abc");
        assert!(!prog.anchor_start);
        assert!(!prog.anchor_end);
    }

    #[test]
    fn unanchored_start_differs_from_anchored() {
        let prog = compile_str("abc");
        assert_ne!(prog.start_anchored, prog.start_unanchored);
    }

    #[test]
    fn program_too_large_reports_compile_error() {
        let ast = parse("a{50000}", ParseFlags::default()).unwrap();
        let simplified = simplify(&ast);
        let err = Compiler::new(false, 64).compile(&simplified, Vec::new());
        assert!(err.is_err());
    }

    #[test]
    fn byte_map_has_fewer_classes_than_256() {
        let prog = compile_str("[a-z]+");
        assert!(prog.byte_map.num_classes() < 256);
    }
}
