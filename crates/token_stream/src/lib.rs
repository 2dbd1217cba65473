#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Splits source text into identifiers, numbers and single character
//! punctuation.
//!
//! Numbers hold at most one decimal point. A `-` directly followed by a
//! digit starts a signed number, any other `-` is [`Punctuation::Minus`].
//! Integers without a sign are [`Token::Unsigned`], anything with a decimal
//! point is [`Token::Float`].

#[cfg(test)]
extern crate std;

mod fmt;

pub mod token;

use core::iter::FusedIterator;

use thiserror_no_std::Error;

pub use token::{Punctuation, Span, Spanned, Token};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TokenizeError {
    #[error("malformed number at bytes {start}..{end}")]
    BadNumber { start: usize, end: usize },
    #[error("unknown character {character:?} at byte {offset}")]
    UnknownCharacter { character: char, offset: usize },
}

impl TokenizeError {
    /// Byte offset where the offending text starts.
    pub fn offset(&self) -> usize {
        match self {
            Self::BadNumber { start, .. } => *start,
            Self::UnknownCharacter { offset, .. } => *offset,
        }
    }
}

/// A lazy token iterator over `source`.
///
/// The iterator ends after the first error. [`Tokenizer::reset`] starts
/// over from the beginning of the source.
#[derive(Debug, Clone)]
pub struct Tokenizer<'s> {
    source: &'s str,
    position: usize,
    failed: bool,
}

impl<'s> Tokenizer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            position: 0,
            failed: false,
        }
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.failed = false;
    }

    fn rest(&self) -> &'s str {
        self.source.get(self.position..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self, c: char) {
        self.position = self.position.saturating_add(c.len_utf8());
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
    }

    fn next_token(&mut self) -> Option<Result<Spanned<Token<'s>>, TokenizeError>> {
        self.skip_whitespace();
        let start = self.position;
        let c = self.peek()?;

        if c.is_ascii_digit() {
            return Some(self.number(start));
        }
        if c == '-' && self.peek_second().is_some_and(|next| next.is_ascii_digit()) {
            self.bump(c);
            return Some(self.number(start));
        }
        if is_identifier_start(c) {
            return Some(Ok(self.identifier(start)));
        }
        if let Some(punct) = Punctuation::from_char(c) {
            self.bump(c);
            return Some(Ok(Spanned {
                value: Token::Punct(punct),
                span: Span::new(start, self.position),
            }));
        }
        Some(Err(TokenizeError::UnknownCharacter {
            character: c,
            offset: start,
        }))
    }

    fn identifier(&mut self, start: usize) -> Spanned<Token<'s>> {
        while let Some(c) = self.peek() {
            if !is_identifier_continue(c) {
                break;
            }
            self.bump(c);
        }
        let name = self.source.get(start..self.position).unwrap_or_default();
        Spanned {
            value: Token::Identifier(name),
            span: Span::new(start, self.position),
        }
    }

    /// Scan a number whose optional `-` was already consumed.
    fn number(&mut self, start: usize) -> Result<Spanned<Token<'s>>, TokenizeError> {
        let mut decimal_points = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' => decimal_points = decimal_points.saturating_add(1),
                _ => break,
            }
            self.bump(c);
        }
        // A number running straight into a name, as in `12ab`, is malformed.
        let mut trailing_name = false;
        while let Some(c) = self.peek() {
            if !is_identifier_continue(c) {
                break;
            }
            trailing_name = true;
            self.bump(c);
        }

        let span = Span::new(start, self.position);
        let bad_number = TokenizeError::BadNumber {
            start: span.start,
            end: span.end,
        };
        if decimal_points > 1 || trailing_name {
            return Err(bad_number);
        }

        let text = self.source.get(span.start..span.end).unwrap_or_default();
        let value = if decimal_points == 1 {
            text.parse().ok().map(Token::Float)
        } else if text.starts_with('-') {
            text.parse().ok().map(Token::Signed)
        } else {
            text.parse().ok().map(Token::Unsigned)
        };
        let value = value.ok_or(bad_number)?;
        trace!("number token at {}..{}", span.start, span.end);
        Ok(Spanned { value, span })
    }
}

impl<'s> Iterator for Tokenizer<'s> {
    type Item = Result<Spanned<Token<'s>>, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_token();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl FusedIterator for Tokenizer<'_> {}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
