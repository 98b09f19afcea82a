//! Error types surfaced by the parse and compile stages.
//!
//! Runtime engine failures (DFA bail-out, BitState too large) are not
//! modelled as `Error` values: they are out-of-band signals that tell the
//! caller to fall back to a different engine, not user-visible failures.
//! See `exec::Executor` for how those signals are consumed.

/// The kind of parse error, mirroring the standardised error codes a
/// regexp parser must be able to name so that callers can report a
/// specific, pattern-pointer-addressable diagnostic.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("invalid escape sequence")]
    BadEscape,
    #[error("invalid character class")]
    BadCharClass,
    #[error("invalid character class range")]
    BadCharRange,
    #[error("missing closing bracket")]
    MissingBracket,
    #[error("missing closing paren")]
    MissingParen,
    #[error("trailing backslash at end of pattern")]
    TrailingBackslash,
    #[error("invalid repeat argument")]
    RepeatArgument,
    #[error("invalid repeat size")]
    RepeatSize,
    #[error("invalid repetition operator")]
    RepeatOp,
    #[error("invalid perl operator")]
    BadPerlOp,
    #[error("pattern is not valid UTF-8")]
    BadUtf8,
    #[error("invalid named capture group")]
    BadNamedCapture,
    #[error("internal parser error: {0}")]
    Internal(String),
}

/// A parse error, carrying a byte-offset pointer into the original
/// pattern that identifies the offending region.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind} near byte offset {pos} in pattern {pattern:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pattern: String,
    pub pos: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, pattern: &str, pos: usize) -> ParseError {
        ParseError { kind, pattern: pattern.to_string(), pos }
    }
}

/// Compile errors are deliberately collapsed into a single kind: the
/// particular cause (program too large for the memory budget) is the
/// only one a well-formed AST can hit. Which direction (forward or
/// reverse) failed is reported by the caller, not by this type.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(
        "pattern too large: compiled program would need {needed} bytes, \
         budget is {budget} bytes"
    )]
    TooBig { needed: usize, budget: usize },
}

/// The union of errors that can flow out of the parse/compile surface.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}
