//! Engine dispatch (§4.9): decides, per search, which of the four
//! matching engines actually runs, and assembles their answers into one
//! result.
//!
//! `Executor` owns a compiled anchored program, a second program
//! compiled in reverse (needed by the DFA to recover a match's start
//! once it has found the end), and a lazily-built one-pass table. The
//! dispatch order mirrors the original engine's: try to shrink the
//! search with a literal prefix first, prefer OnePass when the program
//! qualifies and captures are wanted, fall back to BitState while the
//! program/input stay small, and otherwise run the DFA for the
//! boolean/boundary answer with the full NFA simulation as the only
//! engine that can always produce submatches.

use crate::ast::Regexp;
use crate::bitstate::BitState;
use crate::compile::{Compiler, SetMember};
use crate::dfa::Dfa;
use crate::error::{CompileError, Error, ParseError};
use crate::input::Input;
use crate::literals::Literals;
use crate::nfa::Nfa;
use crate::onepass::OnePass;
use crate::parse::{self, ParseFlags};
use crate::prog::Prog;
use crate::simplify::simplify;

/// Force a particular engine instead of the automatic heuristic.
/// Exposed (as the teacher's own `MatchEngine` was) for tests and
/// benchmarks that need to pin down which engine ran.
#[derive(Clone, Copy, Debug)]
pub enum MatchEngine {
    Automatic,
    Nfa,
    BitState,
    OnePass,
    Dfa,
}

/// A compiled pattern plus every engine capable of searching it.
pub struct Executor {
    prog: Prog,
    reverse_prog: Prog,
    literals: Literals,
    one_pass: Option<OnePass>,
    engine: MatchEngine,
    /// Per-member programs, populated only by `new_set`: set-matching
    /// needs to report which alternative(s) matched, which the shared
    /// combined program (used for the initial candidate-narrowing scan)
    /// doesn't expose on its own.
    set_members: Vec<Prog>,
}

impl Executor {
    pub fn new(pattern: &str, parse_flags: ParseFlags, size_limit: usize) -> Result<Executor, Error> {
        Executor::with_engine(pattern, parse_flags, size_limit, MatchEngine::Automatic)
    }

    pub fn with_engine(
        pattern: &str,
        parse_flags: ParseFlags,
        size_limit: usize,
        engine: MatchEngine,
    ) -> Result<Executor, Error> {
        let ast = parse::parse(pattern, parse_flags).map_err(Error::Parse)?;
        let simplified = simplify(&ast);
        let cap_names = collect_cap_names(&simplified);

        let mut prog = Compiler::new(false, size_limit)
            .compile(&simplified, cap_names.clone())
            .map_err(Error::Compile)?;
        prog.original = pattern.to_string();

        let mut reverse_prog = Compiler::new(true, size_limit)
            .compile(&simplified, cap_names)
            .map_err(Error::Compile)?;
        reverse_prog.original = pattern.to_string();

        let literals = Literals::extract(&prog);
        let one_pass = OnePass::compile(&prog);

        log::debug!(
            "compiled {:?}: {} insts, one_pass={}, anchor_start={}, anchor_end={}",
            pattern,
            prog.len(),
            one_pass.is_some(),
            prog.is_anchored_start(),
            prog.is_anchored_end(),
        );

        Ok(Executor { prog, reverse_prog, literals, one_pass, engine, set_members: Vec::new() })
    }

    /// Compile a set of patterns for set-matching: id 0..N, no
    /// submatches, used only through `search_set`.
    pub fn new_set(patterns: &[&str], parse_flags: ParseFlags, size_limit: usize) -> Result<Executor, Error> {
        let mut asts = Vec::with_capacity(patterns.len());
        for p in patterns {
            let ast = parse::parse(p, parse_flags).map_err(Error::Parse)?;
            asts.push(simplify(&ast));
        }
        let members: Vec<SetMember> =
            asts.iter().enumerate().map(|(i, ast)| SetMember { ast, id: i as u32 }).collect();
        let mut prog = Compiler::new(false, size_limit).compile_set(&members).map_err(Error::Compile)?;
        prog.original = patterns.join("|");
        let reverse_members: Vec<SetMember> =
            asts.iter().enumerate().map(|(i, ast)| SetMember { ast, id: i as u32 }).collect();
        let mut reverse_prog =
            Compiler::new(true, size_limit).compile_set(&reverse_members).map_err(Error::Compile)?;
        reverse_prog.original = prog.original.clone();
        let literals = Literals::extract(&prog);

        let mut set_members = Vec::with_capacity(asts.len());
        for (ast, pattern) in asts.iter().zip(patterns.iter()) {
            let cap_names = collect_cap_names(ast);
            let mut member_prog =
                Compiler::new(false, size_limit).compile(ast, cap_names).map_err(Error::Compile)?;
            member_prog.original = (*pattern).to_string();
            set_members.push(member_prog);
        }

        Ok(Executor { prog, reverse_prog, literals, one_pass: None, engine: MatchEngine::Nfa, set_members })
    }

    pub fn capture_names(&self) -> &[Option<String>] {
        &self.prog.cap_names
    }

    pub fn num_captures(&self) -> usize {
        self.prog.num_captures
    }

    /// Report whether `text` matches anywhere, without computing
    /// capture boundaries.
    pub fn is_match(&self, text: &[u8]) -> bool {
        self.search(text, 0, &mut []).is_some()
    }

    /// Search for the leftmost match starting at or after `start`,
    /// filling `caps` (if non-empty) with `2*num_captures` byte offsets.
    /// Returns the overall match span.
    pub fn search(&self, text: &[u8], start: usize, caps: &mut [Option<usize>]) -> Option<(usize, usize)> {
        let input = Input::new(text);

        let search_start = if !self.literals.is_empty() {
            match self.literals.find(&text[start..]) {
                None => return None,
                Some((s, e)) => {
                    if self.literals.at_match() && caps.len() <= 2 {
                        if caps.len() == 2 {
                            caps[0] = Some(start + s);
                            caps[1] = Some(start + e);
                        }
                        return Some((start + s, start + e));
                    }
                    start + s
                }
            }
        } else {
            start
        };

        match self.engine {
            MatchEngine::Nfa => self.search_nfa(input, search_start, caps),
            MatchEngine::BitState => self.search_bit_state(input, search_start, caps),
            MatchEngine::OnePass => self.search_one_pass(input, search_start, caps),
            MatchEngine::Dfa => self.search_dfa(input, search_start, caps),
            MatchEngine::Automatic => self.search_auto(input, search_start, caps),
        }
    }

    fn search_auto(&self, input: Input, start: usize, caps: &mut [Option<usize>]) -> Option<(usize, usize)> {
        let anchored = self.prog.is_anchored_start();

        if anchored && caps.len() <= 2 * crate::onepass::MAX_ONEPASS_CAPTURES {
            if let Some(one) = &self.one_pass {
                let mut full = vec![None; self.prog.num_captures * 2];
                if one.search(input, start, &mut full) {
                    copy_caps(caps, &full);
                    return span_of(&full);
                }
                return None;
            }
        }

        if BitState::should_exec(&self.prog, input.len() - start) {
            let mut full = vec![None; self.prog.num_captures * 2];
            if BitState::search(&self.prog, input, start, &mut full) {
                copy_caps(caps, &full);
                return span_of(&full);
            }
            if anchored {
                return None;
            }
        }

        if caps.len() <= 2 {
            if let Ok(found) = Dfa::search(&self.prog, &self.reverse_prog, input, start, anchored) {
                match found {
                    None => return None,
                    Some((s, e)) => {
                        if caps.len() == 2 {
                            caps[0] = Some(s);
                            caps[1] = Some(e);
                        }
                        return Some((s, e));
                    }
                }
            }
        }

        self.search_nfa(input, start, caps)
    }

    /// Run the Thompson NFA simulation directly. Always correct, works
    /// on any size of program or input, and is the only engine exposed
    /// here guaranteed to report every requested submatch.
    pub fn search_nfa(&self, input: Input, start: usize, caps: &mut [Option<usize>]) -> Option<(usize, usize)> {
        let anchored = self.prog.is_anchored_start();
        let mut full = vec![None; self.prog.num_captures.max(1) * 2];
        if Nfa::search(&self.prog, input, start, anchored, &mut full) {
            copy_caps(caps, &full);
            span_of(&full)
        } else {
            None
        }
    }

    /// Run the bounded backtracker directly. Caller should have already
    /// checked `BitState::should_exec`.
    pub fn search_bit_state(
        &self,
        input: Input,
        start: usize,
        caps: &mut [Option<usize>],
    ) -> Option<(usize, usize)> {
        let mut full = vec![None; self.prog.num_captures * 2];
        if BitState::search(&self.prog, input, start, &mut full) {
            copy_caps(caps, &full);
            span_of(&full)
        } else {
            None
        }
    }

    /// Run the one-pass engine directly. Caller should have already
    /// confirmed `self.one_pass.is_some()` and that the search is meant
    /// to be anchored at `start`.
    pub fn search_one_pass(
        &self,
        input: Input,
        start: usize,
        caps: &mut [Option<usize>],
    ) -> Option<(usize, usize)> {
        let one = self.one_pass.as_ref()?;
        let mut full = vec![None; self.prog.num_captures * 2];
        if one.search(input, start, &mut full) {
            copy_caps(caps, &full);
            span_of(&full)
        } else {
            None
        }
    }

    /// Run the lazy DFA directly: boolean/boundary answer only. If
    /// `caps` asks for more than the overall match span, this degrades
    /// to filling just the first two slots and leaving the rest unset --
    /// callers wanting full submatches should use `search_nfa`,
    /// `search_bit_state` or `search_one_pass` instead.
    pub fn search_dfa(&self, input: Input, start: usize, caps: &mut [Option<usize>]) -> Option<(usize, usize)> {
        let anchored = self.prog.is_anchored_start();
        match Dfa::search(&self.prog, &self.reverse_prog, input, start, anchored) {
            Ok(Some((s, e))) => {
                if caps.len() >= 2 {
                    caps[0] = Some(s);
                    caps[1] = Some(e);
                }
                Some((s, e))
            }
            _ => None,
        }
    }

    /// Which pattern(s) in a set-compiled program matched `text`.
    /// Returns one boolean per original pattern, in order. The shared
    /// combined program (built by `compile_set`) first rules out texts
    /// that match nothing at all via its own literal prefix set; member
    /// programs are only consulted when that coarse check passes.
    pub fn search_set(&self, text: &[u8]) -> Vec<bool> {
        let input = Input::new(text);
        if !self.literals.is_empty() && self.literals.find(text).is_none() {
            return vec![false; self.set_members.len()];
        }
        self.set_members
            .iter()
            .map(|prog| {
                let anchored = prog.is_anchored_start();
                let mut full = vec![None; prog.num_captures.max(1) * 2];
                Nfa::search(prog, input, 0, anchored, &mut full)
            })
            .collect()
    }
}

fn copy_caps(caps: &mut [Option<usize>], full: &[Option<usize>]) {
    let n = caps.len().min(full.len());
    caps[..n].copy_from_slice(&full[..n]);
}

fn span_of(full: &[Option<usize>]) -> Option<(usize, usize)> {
    match (full.get(0).copied().flatten(), full.get(1).copied().flatten()) {
        (Some(s), Some(e)) => Some((s, e)),
        _ => None,
    }
}

fn collect_cap_names(re: &Regexp) -> Vec<Option<String>> {
    let mut names = vec![None];
    collect_cap_names_inner(re, &mut names);
    names
}

fn collect_cap_names_inner(re: &Regexp, names: &mut Vec<Option<String>>) {
    use crate::ast::Op;
    match re.op() {
        Op::Capture { info, sub } => {
            let idx = info.index as usize;
            while names.len() <= idx {
                names.push(None);
            }
            names[idx] = info.name.as_ref().map(|n| n.to_string());
            collect_cap_names_inner(sub, names);
        }
        Op::Concat(subs) | Op::Alternate(subs) => {
            for s in subs {
                collect_cap_names_inner(s, names);
            }
        }
        Op::Star(s) | Op::Plus(s) | Op::Quest(s) => collect_cap_names_inner(s, names),
        Op::Repeat { sub, .. } => collect_cap_names_inner(sub, names),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(pattern: &str) -> Executor {
        Executor::new(pattern, ParseFlags::like_perl(), 10 << 20).unwrap()
    }

    #[test]
    fn literal_prefix_short_circuits_exec() {
        let e = exec("abc");
        assert!(e.is_match(b"xxabcxx"));
        assert!(!e.is_match(b"xyz"));
    }

    #[test]
    fn full_match_captures_named_and_numbered_groups() {
        let e = exec(r"(\w+):(\d+)");
        let mut caps = vec![None; e.num_captures() * 2];
        let found = e.search(b"port:8080", 0, &mut caps);
        assert_eq!(found, Some((0, 9)));
        assert_eq!(caps[2], Some(0));
        assert_eq!(caps[3], Some(4));
        assert_eq!(caps[4], Some(5));
        assert_eq!(caps[5], Some(9));
    }

    #[test]
    fn case_insensitive_partial_match() {
        let e = exec(r"(?i)wand");
        assert!(e.is_match(b"the magic WAND appeared"));
    }

    #[test]
    fn bit_state_handles_small_bounded_backtrack_case() {
        let e = exec("a+b");
        let text = vec![b'a'; 480].into_iter().chain(std::iter::once(b'b')).collect::<Vec<u8>>();
        assert!(e.is_match(&text));
    }
}
