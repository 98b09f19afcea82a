//! The compiled instruction program (`Prog`): a flat, read-only array of
//! byte-oriented instructions plus the metadata every execution engine
//! needs (start points, anchor flags, byte map).
//!
//! The original engine packs opcode + operands into a single machine
//! word, using the low bits of the `out` field as an opcode tag and
//! reusing that same field, pre-patch, to thread a patch list through
//! still-dangling edges. Rust has no trouble giving every instruction
//! its own enum variant and a named `Vec<(u32, bool)>` patch-list side
//! table (see `compile::PatchList`), so we take the straightforward
//! route the design notes call out explicitly: a tagged enum here, and
//! an explicit patch arena in the compiler. Lookup stays O(1); only the
//! microarchitectural trick of cramming it into one word is gone.

use std::fmt;

use crate::ast::EmptyWidth;

/// Index of an instruction within `Prog::insts`. Index 0 is reserved for
/// the distinguished `Fail` instruction so that "no target" can be
/// represented without an `Option`.
pub type InstIdx = u32;

/// A single instruction. `ByteRange` is the only instruction that
/// consumes input; everything else is a zero-width control-flow or
/// bookkeeping step.
#[derive(Clone, Debug)]
pub enum Inst {
    /// Branch to one of two continuations; `out` is preferred, so this
    /// is how priority order is encoded through the whole pipeline.
    Alt { out: InstIdx, out1: InstIdx },
    /// Consume one byte in `[lo, hi]`. If `fold_ascii_case` is set, an
    /// ASCII letter also matches its opposite-case counterpart.
    ByteRange { lo: u8, hi: u8, fold_ascii_case: bool, out: InstIdx },
    /// Record the current text position into capture register `slot`.
    Capture { slot: u32, out: InstIdx },
    /// Succeed (without consuming input) iff every flag in `look` holds
    /// at the current position.
    EmptyWidth { look: EmptyWidth, out: InstIdx },
    /// Accept with match identifier `id` (used by `compile_set`; a
    /// regular single-pattern program always uses id 0).
    Match { id: u32 },
    /// Unconditional continuation. The peephole optimiser (`compile`)
    /// eliminates all reachable `Nop`s before a `Prog` is handed to any
    /// engine, so no executor needs to special-case it.
    Nop { out: InstIdx },
    /// Never succeeds. Lives at index 0.
    Fail,
}

impl Inst {
    pub fn out(&self) -> Option<InstIdx> {
        match *self {
            Inst::Alt { out, .. } => Some(out),
            Inst::ByteRange { out, .. } => Some(out),
            Inst::Capture { out, .. } => Some(out),
            Inst::EmptyWidth { out, .. } => Some(out),
            Inst::Nop { out } => Some(out),
            Inst::Match { .. } | Inst::Fail => None,
        }
    }
}

/// A 256-entry table mapping each raw byte to a dense equivalence-class
/// id in `[0, num_classes)`. Two bytes share a class iff no `ByteRange`
/// instruction in the program distinguishes between them; this is what
/// lets the DFA's per-state transition table be `num_classes` wide
/// instead of 256 wide.
#[derive(Clone, Debug)]
pub struct ByteMap {
    class_of: [u8; 256],
    num_classes: usize,
    /// For each class, its highest-valued member byte (used by the
    /// "required first byte" / literal scan heuristics).
    representative: Vec<u8>,
}

impl ByteMap {
    /// Build a byte map from the 256-bit "this byte ends a distinguished
    /// range" bitmap the compiler accumulates while emitting
    /// `ByteRange` instructions.
    pub fn from_range_ends(range_ends: &[bool; 256]) -> ByteMap {
        let mut class_of = [0u8; 256];
        let mut class = 0u8;
        let mut representative = Vec::new();
        for byte in 0..256u16 {
            class_of[byte as usize] = class;
            if range_ends[byte as usize] {
                representative.push(byte as u8);
                class = class.saturating_add(1);
            }
        }
        let num_classes = representative.len().max(1);
        ByteMap { class_of, num_classes, representative }
    }

    #[inline]
    pub fn class(&self, byte: u8) -> u8 {
        self.class_of[byte as usize]
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn representative(&self, class: u8) -> u8 {
        self.representative
            .get(class as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// The compiled program plus every piece of metadata an execution
/// engine needs to run it. Immutable and read-only after `compile`
/// finishes trimming it to size; the DFA's lazily-filled transition
/// cache lives beside a `Prog`, not inside it (see `dfa::Dfa`).
pub struct Prog {
    pub original: String,
    pub insts: Vec<Inst>,
    pub start_anchored: InstIdx,
    pub start_unanchored: InstIdx,
    pub anchor_start: bool,
    pub anchor_end: bool,
    pub reversed: bool,
    pub byte_map: ByteMap,
    pub num_captures: usize,
    pub cap_names: Vec<Option<String>>,
    pub dfa_size_limit: usize,
}

impl Prog {
    pub fn is_anchored_start(&self) -> bool {
        self.anchor_start
    }

    pub fn is_anchored_end(&self) -> bool {
        self.anchor_end
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn get(&self, pc: InstIdx) -> &Inst {
        &self.insts[pc as usize]
    }
}

impl fmt::Debug for Prog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prog")
            .field("original", &self.original)
            .field("num_insts", &self.insts.len())
            .field("anchor_start", &self.anchor_start)
            .field("anchor_end", &self.anchor_end)
            .field("reversed", &self.reversed)
            .finish()
    }
}
