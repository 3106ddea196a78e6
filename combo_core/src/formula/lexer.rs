//! Formula tokenizer
//!
//! Splits formula text into numbers, words, operators and grouping tokens.
//! Whitespace is insignificant and never produces a token. Positions are
//! byte offsets into the original text, used in parse error messages.

/// Token kinds produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Run of ASCII digits and dots (validated later as a decimal literal)
    Number(&'a str),
    /// Run of ASCII letters (load type abbreviation or the `or` keyword)
    Word(&'a str),
    Plus,
    Minus,
    Star,
    LParen,
    RParen,
    /// Any other character
    Unexpected(char),
}

impl TokenKind<'_> {
    /// Whether this token separates terms
    pub fn is_operator(&self) -> bool {
        matches!(self, TokenKind::Plus | TokenKind::Minus)
    }
}

/// A token and the byte offset where it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub position: usize,
}

/// Tokenize formula text.
///
/// # Example
/// ```
/// use combo_core::formula::lexer::{tokenize, TokenKind};
///
/// let tokens = tokenize("1.2DL + 1.6*LL");
/// let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
/// assert_eq!(kinds, vec![
///     TokenKind::Number("1.2"),
///     TokenKind::Word("DL"),
///     TokenKind::Plus,
///     TokenKind::Number("1.6"),
///     TokenKind::Star,
///     TokenKind::Word("LL"),
/// ]);
/// ```
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_digit() || c == b'.' {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            TokenKind::Number(&input[start..i])
        } else if c.is_ascii_alphabetic() {
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            TokenKind::Word(&input[start..i])
        } else {
            let kind = match c {
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'*' => TokenKind::Star,
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                _ => {
                    // Non-ASCII characters span several bytes
                    let ch = input[start..].chars().next().unwrap_or('\u{FFFD}');
                    i += ch.len_utf8();
                    tokens.push(Token {
                        kind: TokenKind::Unexpected(ch),
                        position: start,
                    });
                    continue;
                }
            };
            i += 1;
            kind
        };

        tokens.push(Token { kind, position: start });
    }

    tokens
}

/// Whether text is a plain decimal literal: digits, optionally a dot
/// followed by digits. No sign, exponent, or bare dots.
pub fn is_decimal_literal(text: &str) -> bool {
    let mut parts = text.splitn(2, '.');
    let integer = parts.next().unwrap_or("");
    let fraction = parts.next();

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match fraction {
        None => digits(integer),
        Some(frac) => digits(integer) && digits(frac),
    }
}
