use logos::{Logos, SpannedIter};
use std::fmt;
use thiserror::Error;

use crate::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")] // Skip whitespace
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    // A maximal run of digits and points; "1.2.3" is rejected rather than split.
    #[regex(r"[0-9.]+", |lex| {
        let slice = lex.slice();
        slice
            .parse::<f64>()
            .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
    }, priority = 3)]
    Number(f64),
    // Anything else up to whitespace or a paren. The parser decides whether
    // it is an operator, a keyword or a valid identifier.
    #[regex(r"[^ \t\n\r\f()]+", |lex| lex.slice().to_string())]
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Symbol(name) => f.write_str(name),
        }
    }
}

#[derive(Error, Default, Debug, Clone, PartialEq)]
pub enum LexerErrorKind {
    #[error("Invalid number format: '{0}'")]
    InvalidNumberFormat(String),
    #[default]
    #[error("Invalid Token")]
    InvalidToken,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

pub type LexResult<T> = Result<T, LexerError>;

/// Lazily scans tokens from the input. Nothing past the last token pulled
/// is ever looked at, which is what lets the parser ignore trailing text.
pub struct Tokens<'source> {
    inner: SpannedIter<'source, TokenKind>,
}

impl Iterator for Tokens<'_> {
    type Item = LexResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(result, range)| {
            let span = Span::from(range);
            match result {
                Ok(kind) => Ok(Token { kind, span }),
                Err(error) => Err(LexerError { error, span }),
            }
        })
    }
}

pub fn tokens(input: &str) -> Tokens<'_> {
    Tokens {
        inner: TokenKind::lexer(input).spanned(),
    }
}

/// Scans the whole input, stopping at the first bad token.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    tokens(input).collect()
}
