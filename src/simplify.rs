//! Rewrites a parsed `Regexp` into the minimal operator subset the
//! compiler accepts: `star` / `plus` / `quest` / `concat` / `alternate` /
//! `literal` / `literal_string` / `class` / empty-width / `capture` /
//! `any_char` / `any_byte` / `no_match` / `empty_match` / `have_match`.
//!
//! The only operator this module exists to eliminate is `Repeat { min,
//! max, sub }` (counted repetition). Everything else already belongs to
//! the core subset and is walked through unchanged (but still rebuilt,
//! since `Regexp` has no in-place mutation).

use crate::ast::{Flags, Op, Regexp, REPEAT_INFINITE};

/// Simplify `re`, expanding counted repeats per the rules in §4.2.
/// Idempotent: `simplify(simplify(re))` produces a tree equal in shape
/// to `simplify(re)`, and `simplify(re).is_simple()` is always true.
pub fn simplify(re: &Regexp) -> Regexp {
    let flags = re.flags();
    match re.op() {
        Op::Concat(subs) => Regexp::concat(subs.iter().map(simplify).collect(), flags),
        Op::Alternate(subs) => Regexp::alternate(subs.iter().map(simplify).collect(), flags),
        Op::Star(s) => Regexp::star(simplify(s), flags),
        Op::Plus(s) => Regexp::plus(simplify(s), flags),
        Op::Quest(s) => Regexp::quest(simplify(s), flags),
        Op::Capture { info, sub } => Regexp::capture(info.clone(), simplify(sub), flags),
        Op::Repeat { min, max, sub } => simplify_repeat(*min, *max, sub, flags),
        _ => re.clone(),
    }
}

fn simplify_repeat(min: u32, max: u32, sub: &Regexp, flags: Flags) -> Regexp {
    let sub = simplify(sub);

    // A repeat of an always-empty subexpression collapses to that
    // subexpression: repeating "nothing" any number of times is still
    // "nothing".
    if sub.matches_empty_exactly() {
        return sub;
    }

    if max != REPEAT_INFINITE && min > max {
        // Not expected to occur post-parse (the parser rejects n > m),
        // but keep simplification total rather than panicking on it.
        return Regexp::no_match(flags);
    }

    match (min, max) {
        (0, 0) => Regexp::empty_match(flags),
        (1, 1) => sub,
        (0, REPEAT_INFINITE) => Regexp::star(sub, flags),
        (1, REPEAT_INFINITE) => Regexp::plus(sub, flags),
        (n, REPEAT_INFINITE) => {
            // x{n,} -> x^(n-1) . x+
            let mut subs: Vec<Regexp> = (0..n - 1).map(|_| sub.clone()).collect();
            subs.push(Regexp::plus(sub, flags));
            Regexp::concat(subs, flags)
        }
        (0, m) => optional_chain(sub, m, flags),
        (n, m) => {
            // x{n,m}, m>n -> x^n . (optional chain of depth m-n)
            let mut subs: Vec<Regexp> = (0..n).map(|_| sub.clone()).collect();
            if m > n {
                subs.push(optional_chain(sub.clone(), m - n, flags));
            }
            Regexp::concat(subs, flags)
        }
    }
}

/// Build `x(x(...x?)?)?` nested `m` deep: a right-nested chain of quests
/// is shorter to compile than `m` flat `x?` copies chained by concat,
/// because each inner `quest` shares its "leave the loop" edge with all
/// of its ancestors' dangling exits instead of each needing its own.
fn optional_chain(sub: Regexp, depth: u32, flags: Flags) -> Regexp {
    debug_assert!(depth >= 1);
    let mut chain = sub.clone();
    for _ in 1..depth {
        chain = Regexp::concat(vec![sub.clone(), Regexp::quest(chain, flags)], flags);
    }
    Regexp::quest(chain, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CaptureInfo;
    use crate::parse::{parse, ParseFlags};
    use std::rc::Rc;

    fn lit(c: char) -> Regexp {
        Regexp::literal(c, Flags::default())
    }

    #[test]
    fn zero_zero_is_empty_match() {
        let re = Regexp::repeat(0, 0, lit('a'), Flags::default());
        assert!(matches!(simplify(&re).op(), Op::EmptyMatch));
    }

    #[test]
    fn one_one_is_identity() {
        let re = Regexp::repeat(1, 1, lit('a'), Flags::default());
        assert!(matches!(simplify(&re).op(), Op::Literal('a')));
    }

    #[test]
    fn zero_inf_is_star() {
        let re = Regexp::repeat(0, REPEAT_INFINITE, lit('a'), Flags::default());
        assert!(matches!(simplify(&re).op(), Op::Star(_)));
    }

    #[test]
    fn one_inf_is_plus() {
        let re = Regexp::repeat(1, REPEAT_INFINITE, lit('a'), Flags::default());
        assert!(matches!(simplify(&re).op(), Op::Plus(_)));
    }

    #[test]
    fn n_inf_expands_to_prefix_then_plus() {
        let re = Regexp::repeat(3, REPEAT_INFINITE, lit('a'), Flags::default());
        match simplify(&re).op() {
            Op::Concat(subs) => {
                assert_eq!(subs.len(), 3);
                assert!(matches!(subs[0].op(), Op::Literal('a')));
                assert!(matches!(subs[1].op(), Op::Literal('a')));
                assert!(matches!(subs[2].op(), Op::Plus(_)));
            }
            other => panic!("expected concat, got {:?}", other),
        }
    }

    #[test]
    fn idempotent_on_already_simple_tree() {
        let re = Regexp::repeat(2, 4, lit('a'), Flags::default());
        let once = simplify(&re);
        let twice = simplify(&once);
        assert!(once.is_simple());
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn degenerate_repeat_of_empty_collapses() {
        let re = Regexp::repeat(0, REPEAT_INFINITE, Regexp::empty_match(Flags::default()), Flags::default());
        assert!(matches!(simplify(&re).op(), Op::EmptyMatch));
    }

    #[test]
    fn simplify_recurses_into_capture() {
        let info = CaptureInfo { index: 1, name: None };
        let re = Regexp::capture(info, Regexp::repeat(0, 0, lit('a'), Flags::default()), Flags::default());
        match simplify(&re).op() {
            Op::Capture { sub, .. } => assert!(matches!(sub.op(), Op::EmptyMatch)),
            other => panic!("expected capture, got {:?}", other),
        }
    }

    #[test]
    fn end_to_end_counted_repeat_parses_and_simplifies() {
        let ast = parse("a{2,4}", ParseFlags::default()).unwrap();
        let simplified = simplify(&ast);
        assert!(simplified.is_simple());
        let _ = Rc::new(());
    }
}
