// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A byte-oriented regular expression execution core.
//!
//! This crate is the pipeline underneath a regex engine, not the
//! convenience wrapper on top of one: parse a pattern into an AST
//! (`parse`), simplify it to the compiler's core operator set
//! (`simplify`), compile it to a `Prog` (`compile`), and search text
//! with whichever of the four matching engines fits the job --
//! `search_nfa`, `search_dfa`, `search_one_pass`, `search_bit_state` --
//! or let `Executor::search` pick automatically.
//!
//! There is no `Regex` type here with a `captures`/`replace`/iterator
//! surface; that layer belongs on top of this one; see the [REDESIGN
//! FLAGS] section of the design document this crate was built against.

pub mod ast;
pub mod bitstate;
pub mod compile;
pub mod dfa;
pub mod error;
pub mod exec;
pub mod input;
pub mod literals;
pub mod nfa;
pub mod onepass;
pub mod parse;
pub mod prog;
pub mod simplify;
pub mod utf8ranges;

pub use crate::ast::Regexp;
pub use crate::compile::{Compiler, SetMember};
pub use crate::error::{CompileError, Error, ParseError, ParseErrorKind};
pub use crate::exec::{Executor, MatchEngine};
pub use crate::input::Input;
pub use crate::parse::{parse, quote_meta, ParseFlags};
pub use crate::prog::Prog;
pub use crate::simplify::simplify;

/// Default memory budget (bytes) for a compiled program, used whenever
/// a caller doesn't have a more specific limit in mind. 10 MiB matches
/// the ceiling the reference implementation picks for "this had better
/// not be a mistake in the pattern" without being so small that
/// ordinary patterns with large counted repeats fail to compile.
pub const DEFAULT_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Parse and compile `pattern` in one step, using [`DEFAULT_SIZE_LIMIT`]
/// and Perl-like parse flags. This is the common case for callers that
/// just want a `Prog` to search with.
pub fn compile(pattern: &str) -> Result<Prog, Error> {
    let ast = parse(pattern, ParseFlags::like_perl()).map_err(Error::Parse)?;
    let simplified = simplify(&ast);
    let cap_names = capture_names(&simplified);
    Compiler::new(false, DEFAULT_SIZE_LIMIT).compile(&simplified, cap_names).map_err(Error::Compile)
}

/// Compile a set of patterns for set-matching (`Prog::insts` carries
/// one `Match` id per member); see [`Executor::new_set`] for the
/// higher-level search surface built on top of this.
pub fn compile_set(patterns: &[&str]) -> Result<Prog, Error> {
    let mut asts = Vec::with_capacity(patterns.len());
    for p in patterns {
        let ast = parse(p, ParseFlags::like_perl()).map_err(Error::Parse)?;
        asts.push(simplify(&ast));
    }
    let members: Vec<SetMember> =
        asts.iter().enumerate().map(|(i, ast)| SetMember { ast, id: i as u32 }).collect();
    Compiler::new(false, DEFAULT_SIZE_LIMIT).compile_set(&members).map_err(Error::Compile)
}

/// Run the Thompson NFA simulation directly against `prog`. The only
/// engine among the four that is always correct regardless of program
/// size, input size, or whether the program is one-pass.
pub fn search_nfa(prog: &Prog, text: &[u8], start: usize, caps: &mut [Option<usize>]) -> bool {
    let anchored = prog.is_anchored_start();
    nfa::Nfa::search(prog, Input::new(text), start, anchored, caps)
}

/// Run the bounded backtracker directly against `prog`. Callers should
/// check [`bitstate::BitState::should_exec`] first; `exec::Executor`
/// does this automatically.
pub fn search_bit_state(prog: &Prog, text: &[u8], start: usize, caps: &mut [Option<usize>]) -> bool {
    bitstate::BitState::search(prog, Input::new(text), start, caps)
}

/// Build and run the one-pass engine directly against `prog`, if it
/// qualifies. Returns `None` immediately if the program isn't one-pass.
pub fn search_one_pass(prog: &Prog, text: &[u8], start: usize, caps: &mut [Option<usize>]) -> Option<bool> {
    let one = onepass::OnePass::compile(prog)?;
    Some(one.search(Input::new(text), start, caps))
}

/// Run the lazy DFA directly against `prog`/`reverse_prog` (the same
/// pattern compiled with `Compiler::new(true, ..)`). Reports only the
/// overall match span, never submatches.
pub fn search_dfa(
    prog: &Prog,
    reverse_prog: &Prog,
    text: &[u8],
    start: usize,
) -> Result<Option<(usize, usize)>, dfa::DfaBailed> {
    let anchored = prog.is_anchored_start();
    dfa::Dfa::search(prog, reverse_prog, Input::new(text), start, anchored)
}

fn capture_names(re: &Regexp) -> Vec<Option<String>> {
    use crate::ast::Op;
    fn walk(re: &Regexp, names: &mut Vec<Option<String>>) {
        match re.op() {
            Op::Capture { info, sub } => {
                let idx = info.index as usize;
                while names.len() <= idx {
                    names.push(None);
                }
                names[idx] = info.name.as_ref().map(|n| n.to_string());
                walk(sub, names);
            }
            Op::Concat(subs) | Op::Alternate(subs) => {
                for s in subs {
                    walk(s, names);
                }
            }
            Op::Star(s) | Op::Plus(s) | Op::Quest(s) => walk(s, names),
            Op::Repeat { sub, .. } => walk(sub, names),
            _ => {}
        }
    }
    let mut names = vec![None];
    walk(re, &mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_search_nfa_round_trip() {
        let prog = compile(r"(\w+):(\d+)").unwrap();
        let mut caps = vec![None; prog.num_captures * 2];
        assert!(search_nfa(&prog, b"port:8080", 0, &mut caps));
        assert_eq!(caps[0], Some(0));
        assert_eq!(caps[1], Some(9));
    }

    #[test]
    fn compile_set_reports_member_programs() {
        let prog = compile_set(&["cat", "dog"]).unwrap();
        assert!(prog.len() > 1);
    }

    #[test]
    fn quote_meta_escapes_special_characters() {
        assert_eq!(quote_meta("a.b*c"), r"a\.b\*c");
    }
}
