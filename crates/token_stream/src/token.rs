use core::fmt;

/// Byte range of a token in its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Token<'s> {
    Identifier(&'s str),
    /// An integer written with a leading `-`.
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Punct(Punctuation),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => f.write_str(name),
            Token::Signed(value) => write!(f, "{value}"),
            Token::Unsigned(value) => write!(f, "{value}"),
            Token::Float(value) => write!(f, "{value}"),
            Token::Punct(punct) => write!(f, "{}", punct.as_char()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Punctuation {
    Semicolon,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Less,
    Greater,
    Equal,
    Plus,
    Minus,
    Star,
    Slash,
}

impl Punctuation {
    pub fn from_char(c: char) -> Option<Self> {
        let punct = match c {
            ';' => Self::Semicolon,
            '(' => Self::OpenParen,
            ')' => Self::CloseParen,
            '{' => Self::OpenBrace,
            '}' => Self::CloseBrace,
            '[' => Self::OpenBracket,
            ']' => Self::CloseBracket,
            '<' => Self::Less,
            '>' => Self::Greater,
            '=' => Self::Equal,
            '+' => Self::Plus,
            '-' => Self::Minus,
            '*' => Self::Star,
            '/' => Self::Slash,
            _ => return None,
        };
        Some(punct)
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Semicolon => ';',
            Self::OpenParen => '(',
            Self::CloseParen => ')',
            Self::OpenBrace => '{',
            Self::CloseBrace => '}',
            Self::OpenBracket => '[',
            Self::CloseBracket => ']',
            Self::Less => '<',
            Self::Greater => '>',
            Self::Equal => '=',
            Self::Plus => '+',
            Self::Minus => '-',
            Self::Star => '*',
            Self::Slash => '/',
        }
    }
}
