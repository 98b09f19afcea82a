//! The parse surface: `parse(pattern, flags) -> Regexp | ParseError`.
//!
//! Per the system's scope, lexing/Unicode-table work is an external
//! collaborator's job; we lean on `regex-syntax` for that (tokenising,
//! Unicode property tables, UTF-8 validation) and do the work that is
//! ours: translate its `Hir` into our own `Regexp` tree (§3.1) without
//! pre-simplifying counted repeats or POSIX classes -- that is
//! `simplify`'s job, not the parser's.

use std::rc::Rc;

use regex_syntax::hir::{self, Hir, HirKind};
use regex_syntax::ParserBuilder;

use crate::ast::{CaptureInfo, CharClass, Flags, Regexp};
use crate::error::{ParseError, ParseErrorKind};

/// Parse-time extension flags, named after the surface syntax toggles a
/// regexp engine in this family supports.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseFlags {
    pub fold_case: bool,
    pub literal: bool,
    pub class_nl: bool,
    pub dot_nl: bool,
    pub one_line: bool,
    pub latin1: bool,
    pub non_greedy: bool,
    pub perl_classes: bool,
    pub perl_b: bool,
    pub perl_x: bool,
    pub unicode_groups: bool,
    pub never_nl: bool,
    pub never_capture: bool,
}

impl ParseFlags {
    /// `match_nl = class_nl | dot_nl`.
    pub fn match_nl(&self) -> bool {
        self.class_nl || self.dot_nl
    }

    /// The `like_perl` alias: Perl classes, Perl `\b`, Unicode groups,
    /// non-greedy quantifiers, and extended whitespace all on.
    pub fn like_perl() -> ParseFlags {
        ParseFlags {
            perl_classes: true,
            perl_b: true,
            perl_x: true,
            unicode_groups: true,
            non_greedy: true,
            ..ParseFlags::default()
        }
    }
}

/// Parse `pattern` under `flags`, producing an AST or a standardised
/// parse error pointing at the offending byte range.
pub fn parse(pattern: &str, flags: ParseFlags) -> Result<Regexp, ParseError> {
    if flags.literal {
        return Ok(literal_to_ast(pattern, flags));
    }

    let mut builder = ParserBuilder::new();
    builder
        .case_insensitive(flags.fold_case)
        .multi_line(!flags.one_line)
        .dot_matches_new_line(flags.match_nl())
        .swap_greed(flags.non_greedy)
        .ignore_whitespace(flags.perl_x)
        .unicode(flags.unicode_groups)
        .utf8(!flags.latin1);

    let hir = builder
        .build()
        .parse(pattern)
        .map_err(|e| translate_error(pattern, &e))?;

    let mut ctx = LowerCtx { pattern, next_capture: 1, never_capture: flags.never_capture };
    let mut ast = ctx.lower(&hir, Flags { fold_case: flags.fold_case, multi_line: !flags.one_line, dot_nl: flags.match_nl(), swap_greed: flags.non_greedy });
    if flags.never_nl {
        ast = strip_newline(&ast);
    }
    Ok(ast)
}

/// Escape every metacharacter in `s` so the result matches `s` literally.
/// Mirrors `regex_syntax::escape`, kept here so the core's external
/// surface (§4.1) does not require callers to reach into the parser
/// crate directly.
pub fn quote_meta(s: &str) -> String {
    regex_syntax::escape(s)
}

fn literal_to_ast(pattern: &str, flags: ParseFlags) -> Regexp {
    let f = Flags { fold_case: flags.fold_case, multi_line: false, dot_nl: false, swap_greed: false };
    Regexp::literal_string(Rc::from(pattern), f)
}

struct LowerCtx<'p> {
    pattern: &'p str,
    next_capture: u32,
    never_capture: bool,
}

impl<'p> LowerCtx<'p> {
    fn lower(&mut self, hir: &Hir, flags: Flags) -> Regexp {
        match hir.kind() {
            HirKind::Empty => Regexp::empty_match(flags),
            HirKind::Literal(lit) => self.lower_literal(lit, flags),
            HirKind::Class(class) => Regexp::class(lower_class(class), flags),
            HirKind::Look(look) => self.lower_look(*look, flags),
            HirKind::Repetition(rep) => {
                let sub = self.lower(&rep.sub, flags);
                match (rep.min, rep.max) {
                    (0, Some(1)) if rep.greedy => Regexp::quest(sub, flags),
                    (0, None) if rep.greedy => Regexp::star(sub, flags),
                    (1, None) if rep.greedy => Regexp::plus(sub, flags),
                    (min, max) => {
                        Regexp::repeat(min, max.unwrap_or(crate::ast::REPEAT_INFINITE), sub, flags)
                    }
                }
            }
            HirKind::Capture(cap) => {
                let sub = self.lower(&cap.sub, flags);
                if self.never_capture {
                    return sub;
                }
                let index = self.next_capture;
                self.next_capture += 1;
                let info = CaptureInfo {
                    index,
                    name: cap.name.as_ref().map(|n| Rc::from(n.as_str())),
                };
                Regexp::capture(info, sub, flags)
            }
            HirKind::Concat(subs) => {
                let subs = subs.iter().map(|h| self.lower(h, flags)).collect();
                Regexp::concat(subs, flags)
            }
            HirKind::Alternation(subs) => {
                let subs = subs.iter().map(|h| self.lower(h, flags)).collect();
                Regexp::alternate(subs, flags)
            }
        }
    }

    fn lower_literal(&mut self, lit: &hir::Literal, flags: Flags) -> Regexp {
        let s = String::from_utf8_lossy(&lit.0).into_owned();
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Regexp::literal(c, flags),
            _ => Regexp::literal_string(Rc::from(s.as_str()), flags),
        }
    }

    fn lower_look(&mut self, look: hir::Look, flags: Flags) -> Regexp {
        use crate::ast::EmptyWidth::*;
        let look = match look {
            hir::Look::Start => BeginText,
            hir::Look::End => EndText,
            hir::Look::StartLF | hir::Look::StartCRLF => BeginLine,
            hir::Look::EndLF | hir::Look::EndCRLF => EndLine,
            hir::Look::WordAscii | hir::Look::WordUnicode => WordBoundary,
            hir::Look::WordAsciiNegate | hir::Look::WordUnicodeNegate => {
                NotWordBoundary
            }
            _ => BeginText,
        };
        Regexp::empty_width(look, flags)
    }
}

fn lower_class(class: &hir::Class) -> CharClass {
    match class {
        hir::Class::Unicode(u) => {
            let ranges = u
                .iter()
                .map(|r| (r.start(), r.end()))
                .collect();
            CharClass::from_ranges(ranges)
        }
        hir::Class::Bytes(b) => {
            let ranges = b
                .iter()
                .map(|r| (r.start() as char, r.end() as char))
                .collect();
            CharClass::from_ranges(ranges)
        }
    }
}

/// `never_nl`: strip `\n` out of every class and turn `AnyChar`/`AnyByte`
/// into their newline-excluding forms, regardless of what `(?s)` or
/// `class_nl` asked for locally. This walks the tree once after lowering
/// rather than threading a flag through every constructor.
fn strip_newline(re: &Regexp) -> Regexp {
    use crate::ast::Op;
    let flags = re.flags();
    match re.op() {
        Op::Class(cc) => {
            let nl = CharClass::from_ranges(vec![('\n', '\n')]);
            let stripped = subtract(cc, &nl);
            Regexp::class(stripped, flags)
        }
        Op::AnyChar => {
            let nl = CharClass::from_ranges(vec![('\n', '\n')]);
            let full = CharClass::from_ranges(vec![('\u{0}', char::MAX)]);
            Regexp::class(subtract(&full, &nl), flags)
        }
        Op::Concat(subs) => Regexp::concat(subs.iter().map(strip_newline).collect(), flags),
        Op::Alternate(subs) => {
            Regexp::alternate(subs.iter().map(strip_newline).collect(), flags)
        }
        Op::Star(s) => Regexp::star(strip_newline(s), flags),
        Op::Plus(s) => Regexp::plus(strip_newline(s), flags),
        Op::Quest(s) => Regexp::quest(strip_newline(s), flags),
        Op::Repeat { min, max, sub } => {
            Regexp::repeat(*min, *max, strip_newline(sub), flags)
        }
        Op::Capture { info, sub } => {
            Regexp::capture(info.clone(), strip_newline(sub), flags)
        }
        _ => re.clone(),
    }
}

fn subtract(a: &CharClass, b: &CharClass) -> CharClass {
    a.ranges()
        .iter()
        .flat_map(|&(lo, hi)| subtract_range(lo, hi, b))
        .fold(CharClass::empty(), |acc, r| acc.union(&CharClass::from_ranges(vec![r])))
}

fn subtract_range(lo: char, hi: char, b: &CharClass) -> Vec<(char, char)> {
    let mut out = Vec::new();
    let mut cur = lo as u32;
    let hi = hi as u32;
    while cur <= hi {
        let c = match char::from_u32(cur) {
            Some(c) => c,
            None => {
                cur += 1;
                continue;
            }
        };
        if b.contains(c) {
            cur += 1;
            continue;
        }
        let start = cur;
        while cur <= hi {
            match char::from_u32(cur) {
                Some(c) if !b.contains(c) => cur += 1,
                _ => break,
            }
        }
        out.push((
            char::from_u32(start).unwrap(),
            char::from_u32(cur - 1).unwrap(),
        ));
    }
    out
}

fn translate_error(pattern: &str, err: &regex_syntax::Error) -> ParseError {
    match err {
        regex_syntax::Error::Parse(e) => {
            let kind = translate_ast_error_kind(e.kind());
            ParseError::new(kind, pattern, e.span().start.offset)
        }
        regex_syntax::Error::Translate(e) => {
            let kind = translate_hir_error_kind(e.kind());
            ParseError::new(kind, pattern, e.span().start.offset)
        }
        // `regex_syntax::Error` is `#[non_exhaustive]`; any future variant
        // carries no span we know how to read, so point at the start of
        // the pattern rather than guess.
        _ => ParseError::new(ParseErrorKind::Internal(err.to_string()), pattern, 0),
    }
}

/// Map `regex-syntax`'s AST-stage error kinds onto this surface's
/// standardised kinds. `ast::ErrorKind` is `#[non_exhaustive]`, so
/// unrecognised variants fall back to `Internal` carrying the original
/// message rather than silently picking the wrong bucket.
fn translate_ast_error_kind(kind: &regex_syntax::ast::ErrorKind) -> ParseErrorKind {
    use regex_syntax::ast::ErrorKind::*;
    match kind {
        EscapeHexEmpty
        | EscapeHexInvalid
        | EscapeHexInvalidDigit
        | EscapeUnexpectedEof
        | EscapeUnrecognized => ParseErrorKind::BadEscape,
        ClassEscapeInvalid | ClassRangeLiteral | ClassUnclosed => {
            ParseErrorKind::BadCharClass
        }
        ClassRangeInvalid => ParseErrorKind::BadCharRange,
        GroupUnclosed | GroupUnopened => ParseErrorKind::MissingParen,
        GroupNameDuplicate { .. }
        | GroupNameEmpty
        | GroupNameInvalid
        | GroupNameUnexpectedEof => ParseErrorKind::BadNamedCapture,
        RepetitionMissing => ParseErrorKind::RepeatArgument,
        RepetitionCountInvalid | RepetitionCountDecimalEmpty | RepetitionCountUnclosed => {
            ParseErrorKind::RepeatSize
        }
        FlagDanglingNegation
        | FlagDuplicate { .. }
        | FlagRepeatedNegation { .. }
        | FlagUnknown
        | FlagUnrecognized => ParseErrorKind::BadPerlOp,
        other => ParseErrorKind::Internal(format!("{:?}", other)),
    }
}

/// Same mapping for the HIR-translation stage's error kinds (mostly
/// Unicode-table lookups, since the AST stage already caught syntax
/// errors by the time translation runs).
fn translate_hir_error_kind(kind: &regex_syntax::hir::ErrorKind) -> ParseErrorKind {
    use regex_syntax::hir::ErrorKind::*;
    match kind {
        UnicodeNotAllowed
        | UnicodePropertyNotFound
        | UnicodePropertyValueNotFound
        | UnicodePerlClassNotFound
        | UnicodeCaseUnavailable => ParseErrorKind::BadUtf8,
        other => ParseErrorKind::Internal(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_concat() {
        let ast = parse("ab", ParseFlags::default()).unwrap();
        match ast.op() {
            crate::ast::Op::Concat(_) => {}
            other => panic!("expected concat, got {:?}", other),
        }
    }

    #[test]
    fn literal_flag_disables_metacharacters() {
        let ast = parse("a.b", ParseFlags { literal: true, ..Default::default() }).unwrap();
        match ast.op() {
            crate::ast::Op::LiteralString(s) => assert_eq!(&**s, "a.b"),
            other => panic!("expected literal string, got {:?}", other),
        }
    }

    #[test]
    fn quote_meta_escapes_dots() {
        assert_eq!(quote_meta("a.b"), "a\\.b");
    }

    #[test]
    fn bad_pattern_reports_parse_error() {
        let err = parse("a(", ParseFlags::default()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingParen);
    }
}
