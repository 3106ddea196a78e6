//! Formula parser and validator
//!
//! Grammar (whitespace insignificant):
//!
//! ```text
//! formula  := [sign] term (op term)*
//! op       := '+' | '-'            ('-' only with alternating terms)
//! term     := factor ['*'] load
//! load     := ABBREV | '(' ABBREV ('or' ABBREV)* ')'
//! factor   := DIGITS ['.' DIGITS]
//! ```
//!
//! Parsing is a pure function of the text, the registry and the options:
//! a [`FormulaParser`] holds only shared references and `Copy` data, so it
//! can be used from any number of threads at once.

use serde::{Deserialize, Serialize};

use super::lexer::{is_decimal_literal, tokenize, Token, TokenKind};
use super::{Formula, Term};
use crate::errors::{CalcError, CalcResult, FormulaIssue};
use crate::loads::{LoadType, LoadTypeRegistry};

/// Largest factor accepted by default
pub const DEFAULT_MAX_FACTOR: f64 = 1000.0;

/// Options that change what the validator accepts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Accept `-` separators and a leading sign (signed factors)
    pub allow_alternating: bool,
    /// Factors above this magnitude are rejected
    pub max_factor: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            allow_alternating: false,
            max_factor: DEFAULT_MAX_FACTOR,
        }
    }
}

/// Parses and validates formula text against a load-type registry.
///
/// # Example
/// ```
/// use combo_core::formula::FormulaParser;
/// use combo_core::errors::FormulaIssue;
/// use combo_core::loads::LoadTypeRegistry;
///
/// let registry = LoadTypeRegistry::standard();
/// let parser = FormulaParser::new(&registry);
///
/// let (valid, reason) = parser.validate("1.2DL + 1.0DL");
/// assert!(!valid);
/// assert!(reason.contains("DL"));
///
/// let err = parser.parse("1.2DL +").unwrap_err();
/// assert_eq!(err.issue(), Some(FormulaIssue::TrailingOperator));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FormulaParser<'r> {
    registry: &'r LoadTypeRegistry,
    options: ParseOptions,
}

impl<'r> FormulaParser<'r> {
    /// Parser with default options (positive factors only)
    pub fn new(registry: &'r LoadTypeRegistry) -> Self {
        FormulaParser {
            registry,
            options: ParseOptions::default(),
        }
    }

    /// Replace the options (builder pattern)
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Same parser with alternating terms switched on or off
    pub fn with_alternating(mut self, allow: bool) -> Self {
        self.options.allow_alternating = allow;
        self
    }

    /// Same parser, also accepting signed terms when `allow` is set.
    ///
    /// Unlike [`FormulaParser::with_alternating`] this never switches off
    /// alternating terms the options already allow.
    pub fn allowing_alternating(self, allow: bool) -> Self {
        let allow = self.options.allow_alternating || allow;
        self.with_alternating(allow)
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn registry(&self) -> &'r LoadTypeRegistry {
        self.registry
    }

    /// Validate text, returning `(is_valid, reason)`
    pub fn validate(&self, text: &str) -> (bool, String) {
        match self.parse(text) {
            Ok(_) => (true, "Formula is valid".to_string()),
            Err(e) => (false, e.reason()),
        }
    }

    /// Parse text into a validated [`Formula`]
    pub fn parse(&self, text: &str) -> CalcResult<Formula> {
        if text.trim().is_empty() {
            return Err(CalcError::parse(text, 0, FormulaIssue::EmptyFormula, "Formula is empty"));
        }

        let tokens = tokenize(text);
        let mut state = ParseState {
            text,
            tokens: &tokens,
            cursor: 0,
            registry: self.registry,
            options: self.options,
            seen: Vec::new(),
        };
        state.formula()
    }
}

struct ParseState<'t, 'r> {
    text: &'t str,
    tokens: &'t [Token<'t>],
    cursor: usize,
    registry: &'r LoadTypeRegistry,
    options: ParseOptions,
    seen: Vec<LoadType>,
}

impl<'t> ParseState<'t, '_> {
    fn peek(&self) -> Option<Token<'t>> {
        self.tokens.get(self.cursor).copied()
    }

    fn end_position(&self) -> usize {
        self.text.len()
    }

    fn syntax(&self, position: usize, issue: FormulaIssue, reason: impl Into<String>) -> CalcError {
        CalcError::parse(self.text, position, issue, reason)
    }

    fn semantic(&self, issue: FormulaIssue, reason: impl Into<String>) -> CalcError {
        CalcError::validation(self.text, issue, reason)
    }

    fn formula(&mut self) -> CalcResult<Formula> {
        let mut terms = Vec::new();

        let mut sign = match self.peek() {
            Some(Token { kind: TokenKind::Plus, position }) => {
                if !self.options.allow_alternating {
                    return Err(self.syntax(position, FormulaIssue::LeadingOperator, "Formula starts with '+'"));
                }
                self.cursor += 1;
                self.check_operand_follows()?;
                1.0
            }
            Some(Token { kind: TokenKind::Minus, .. }) => {
                if !self.options.allow_alternating {
                    return Err(self.semantic(
                        FormulaIssue::NonPositiveFactor,
                        "Negative factors require alternating terms to be enabled",
                    ));
                }
                self.cursor += 1;
                self.check_operand_follows()?;
                -1.0
            }
            _ => 1.0,
        };

        loop {
            terms.push(self.term(sign)?);

            let Some(token) = self.peek() else {
                break;
            };

            sign = match token.kind {
                TokenKind::Plus => 1.0,
                TokenKind::Minus => {
                    if !self.options.allow_alternating {
                        return Err(self.semantic(
                            FormulaIssue::NonPositiveFactor,
                            format!(
                                "Subtracted term at position {} requires alternating terms to be enabled",
                                token.position
                            ),
                        ));
                    }
                    -1.0
                }
                TokenKind::RParen => {
                    return Err(self.syntax(token.position, FormulaIssue::UnbalancedGroup, "Unmatched ')'"));
                }
                TokenKind::Unexpected(c) => {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::UnexpectedCharacter,
                        format!("Unexpected character '{}'", c),
                    ));
                }
                TokenKind::Star => {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::UnexpectedCharacter,
                        "'*' must sit between a factor and its load type",
                    ));
                }
                TokenKind::Number(literal) if !is_decimal_literal(literal) => {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::MalformedFactor,
                        format!("'{}' is not a valid factor", literal),
                    ));
                }
                TokenKind::Number(_) | TokenKind::Word(_) | TokenKind::LParen => {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::MissingOperator,
                        "Missing '+' between terms",
                    ));
                }
            };
            self.cursor += 1;
            self.check_operand_follows()?;
        }

        Ok(Formula::from_validated_terms(terms))
    }

    /// After an operator the next token must start a term
    fn check_operand_follows(&self) -> CalcResult<()> {
        match self.peek() {
            None => Err(self.syntax(
                self.end_position(),
                FormulaIssue::TrailingOperator,
                "Formula ends with an operator",
            )),
            Some(token) if token.kind.is_operator() => Err(self.syntax(
                token.position,
                FormulaIssue::ConsecutiveOperators,
                "Two operators in a row",
            )),
            Some(_) => Ok(()),
        }
    }

    fn term(&mut self, sign: f64) -> CalcResult<Term> {
        let token = match self.peek() {
            Some(token) => token,
            None => {
                return Err(self.syntax(self.end_position(), FormulaIssue::MissingFactor, "Expected a term"));
            }
        };

        let literal = match token.kind {
            TokenKind::Number(literal) => literal,
            TokenKind::Word(word) => {
                return Err(self.syntax(
                    token.position,
                    FormulaIssue::MissingFactor,
                    format!("Load type '{}' has no factor", word),
                ));
            }
            TokenKind::LParen | TokenKind::Star => {
                return Err(self.syntax(token.position, FormulaIssue::MissingFactor, "Term has no factor"));
            }
            TokenKind::RParen => {
                return Err(self.syntax(token.position, FormulaIssue::UnbalancedGroup, "Unmatched ')'"));
            }
            TokenKind::Unexpected(c) => {
                return Err(self.syntax(
                    token.position,
                    FormulaIssue::UnexpectedCharacter,
                    format!("Unexpected character '{}'", c),
                ));
            }
            TokenKind::Plus | TokenKind::Minus => {
                return Err(self.syntax(token.position, FormulaIssue::ConsecutiveOperators, "Two operators in a row"));
            }
        };

        if !is_decimal_literal(literal) {
            return Err(self.syntax(
                token.position,
                FormulaIssue::MalformedFactor,
                format!("'{}' is not a valid factor", literal),
            ));
        }
        let magnitude: f64 = literal.parse().map_err(|_| {
            self.syntax(token.position, FormulaIssue::MalformedFactor, format!("'{}' is not a valid factor", literal))
        })?;
        if !magnitude.is_finite() {
            return Err(self.syntax(
                token.position,
                FormulaIssue::MalformedFactor,
                format!("'{}' is not a finite number", literal),
            ));
        }
        self.cursor += 1;

        if matches!(self.peek(), Some(Token { kind: TokenKind::Star, .. })) {
            self.cursor += 1;
        }

        let load_token = self.peek();
        let term = match load_token.map(|t| t.kind) {
            Some(TokenKind::Word(word)) => {
                if is_exponent_marker(word) {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::MalformedFactor,
                        format!("Scientific notation is not supported in factor '{}{}'", literal, word),
                    ));
                }
                let load_type = self.resolve(word)?;
                self.cursor += 1;
                Term::single(0.0, load_type)
            }
            Some(TokenKind::LParen) => {
                let position = load_token.map(|t| t.position).unwrap_or(0);
                self.cursor += 1;
                self.group(position)?
            }
            _ => {
                let position = load_token.map(|t| t.position).unwrap_or(self.end_position());
                return Err(self.syntax(
                    position,
                    FormulaIssue::MissingLoadType,
                    format!("Factor {} has no load type", literal),
                ));
            }
        };

        let factor = sign * magnitude;
        self.check_factor(factor, literal)?;

        Ok(Term { factor, ..term })
    }

    /// Parse `A or B ...)` after an opening parenthesis
    fn group(&mut self, open_position: usize) -> CalcResult<Term> {
        let mut alternatives = vec![self.group_member(open_position)?];

        loop {
            match self.peek() {
                Some(Token { kind: TokenKind::RParen, .. }) => {
                    self.cursor += 1;
                    break;
                }
                Some(Token { kind: TokenKind::Word("or"), .. }) => {
                    self.cursor += 1;
                    alternatives.push(self.group_member(open_position)?);
                }
                Some(Token { kind: TokenKind::Word(_), position }) => {
                    return Err(self.syntax(
                        position,
                        FormulaIssue::MissingOperator,
                        "Expected 'or' between alternatives",
                    ));
                }
                Some(token) => {
                    return Err(self.syntax(
                        token.position,
                        FormulaIssue::UnbalancedGroup,
                        "Expected ')' to close the group",
                    ));
                }
                None => {
                    return Err(self.syntax(open_position, FormulaIssue::UnbalancedGroup, "Unclosed '('"));
                }
            }
        }

        if alternatives.len() == 1 {
            Ok(Term::single(0.0, alternatives[0]))
        } else {
            Ok(Term::either(0.0, alternatives))
        }
    }

    fn group_member(&mut self, open_position: usize) -> CalcResult<LoadType> {
        match self.peek() {
            Some(Token { kind: TokenKind::Word(word), .. }) if word != "or" => {
                let load_type = self.resolve(word)?;
                self.cursor += 1;
                Ok(load_type)
            }
            Some(token) => Err(self.syntax(
                token.position,
                FormulaIssue::MissingLoadType,
                "Expected a load type inside the group",
            )),
            None => Err(self.syntax(open_position, FormulaIssue::UnbalancedGroup, "Unclosed '('")),
        }
    }

    fn resolve(&mut self, word: &str) -> CalcResult<LoadType> {
        let load_type = self.registry.lookup(word).ok_or_else(|| {
            self.semantic(
                FormulaIssue::UnknownLoadType,
                format!(
                    "Invalid load type: {} (expected one of {})",
                    word,
                    self.registry.abbreviations().join(", ")
                ),
            )
        })?;

        if self.seen.contains(&load_type) {
            return Err(self.semantic(
                FormulaIssue::DuplicateLoadType,
                format!("Load type {} appears more than once", load_type.code()),
            ));
        }
        self.seen.push(load_type);
        Ok(load_type)
    }

    fn check_factor(&self, factor: f64, literal: &str) -> CalcResult<()> {
        if factor == 0.0 {
            return Err(self.semantic(
                FormulaIssue::NonPositiveFactor,
                format!("Factor {} must be non-zero and positive", literal),
            ));
        }
        if factor < 0.0 && !self.options.allow_alternating {
            return Err(self.semantic(
                FormulaIssue::NonPositiveFactor,
                format!("Factor -{} must be positive", literal),
            ));
        }
        if factor.abs() > self.options.max_factor {
            return Err(self.semantic(
                FormulaIssue::FactorOutOfRange,
                format!("Factor {} exceeds the maximum of {}", literal, self.options.max_factor),
            ));
        }
        Ok(())
    }
}

/// `e2`, `E`, ... directly after a number: an exponent, not a load type
fn is_exponent_marker(word: &str) -> bool {
    word == "e" || word == "E"
}
