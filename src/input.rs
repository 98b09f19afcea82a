//! Shared byte-cursor and empty-width-assertion logic used by all four
//! matching engines.
//!
//! `Input` distinguishes the searched `text` from its surrounding
//! `context`: a caller may search a substring of a larger buffer while
//! still wanting `^`/`$`/`\b` to see the characters just outside that
//! substring (see the `Context` glossary entry in the spec). When
//! `context` and `text` are the same slice, this degenerates to
//! ordinary boundary handling.

use crate::ast::EmptyWidth;

/// A text to search, plus the (possibly larger) context it sits inside.
#[derive(Clone, Copy, Debug)]
pub struct Input<'t> {
    text: &'t [u8],
    context: &'t [u8],
    /// Byte offset of `text[0]` within `context`.
    offset: usize,
}

impl<'t> Input<'t> {
    pub fn new(text: &'t [u8]) -> Input<'t> {
        Input { text, context: text, offset: 0 }
    }

    pub fn with_context(text: &'t [u8], context: &'t [u8], offset: usize) -> Input<'t> {
        Input { text, context, offset }
    }

    pub fn text(&self) -> &'t [u8] {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn byte_at(&self, pos: usize) -> Option<u8> {
        self.text.get(pos).copied()
    }

    /// The byte immediately before position `pos` (in the context, not
    /// just `text`), or `None` at the very start of context.
    #[inline]
    pub fn context_before(&self, pos: usize) -> Option<u8> {
        let cpos = self.offset + pos;
        if cpos == 0 {
            None
        } else {
            self.context.get(cpos - 1).copied()
        }
    }

    /// The byte at position `pos` (in the context, not just `text`), or
    /// `None` at the very end of context.
    #[inline]
    pub fn context_after(&self, pos: usize) -> Option<u8> {
        self.context.get(self.offset + pos).copied()
    }

    pub fn is_context_start(&self, pos: usize) -> bool {
        self.offset + pos == 0
    }

    pub fn is_context_end(&self, pos: usize) -> bool {
        self.offset + pos == self.context.len()
    }
}

#[inline]
fn is_word_byte(b: Option<u8>) -> bool {
    matches!(b, Some(b) if b == b'_' || (b as char).is_ascii_alphanumeric())
}

/// Does the zero-width assertion `look` hold given the byte just before
/// and just after the current position? Shared by NFA, DFA, OnePass and
/// BitState so the four engines can never silently disagree about
/// boundary semantics.
#[inline]
pub fn satisfied(look: EmptyWidth, before: Option<u8>, after: Option<u8>) -> bool {
    match look {
        EmptyWidth::BeginLine => before.is_none() || before == Some(b'\n'),
        EmptyWidth::EndLine => after.is_none() || after == Some(b'\n'),
        EmptyWidth::BeginText => before.is_none(),
        EmptyWidth::EndText => after.is_none(),
        EmptyWidth::WordBoundary => is_word_byte(before) != is_word_byte(after),
        EmptyWidth::NotWordBoundary => is_word_byte(before) == is_word_byte(after),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_text_only_at_context_start() {
        let input = Input::new(b"abc");
        assert!(satisfied(EmptyWidth::BeginText, input.context_before(0), input.context_after(0)));
        assert!(!satisfied(EmptyWidth::BeginText, input.context_before(1), input.context_after(1)));
    }

    #[test]
    fn word_boundary_at_edges() {
        let input = Input::new(b"ab cd");
        // boundary between 'b' (pos1->2) and ' '
        assert!(satisfied(
            EmptyWidth::WordBoundary,
            input.context_before(2),
            input.context_after(2)
        ));
        assert!(!satisfied(
            EmptyWidth::WordBoundary,
            input.context_before(1),
            input.context_after(1)
        ));
    }

    #[test]
    fn context_distinguishes_from_text() {
        let context = b"xxabcxx";
        let input = Input::with_context(&context[2..5], context, 2);
        assert!(!input.is_context_start(0));
        assert_eq!(input.context_before(0), Some(b'x'));
    }
}
