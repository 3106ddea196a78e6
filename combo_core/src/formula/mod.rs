//! # Combination Formulas
//!
//! A formula is an ordered list of weighted load terms such as
//! `1.2DL + 1.6LL + 0.5(SL or RL)`.
//!
//! - [`Term`] - one `(factor, load)` pair
//! - [`Formula`] - a validated, non-empty sequence of terms
//! - [`FormulaParser`] - text → [`Formula`], with distinct failure reasons
//! - [`FormulaBuilder`] - assemble a formula from `(LoadType, factor)` pairs
//!
//! Formulas are only ever constructed through the parser, so every
//! [`Formula`] value upholds the grammar and validation rules: finite
//! non-zero factors, positive unless alternating terms were enabled, and no
//! load type appearing twice.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::{LoadType, LoadTypeRegistry};
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//!
//! let formula = parser.parse("1.2DL + 1.6*LL").unwrap();
//! assert_eq!(formula.factor_for(LoadType::Live), Some(1.6));
//! assert_eq!(formula.to_string(), "1.2DL + 1.6LL");
//! ```

pub mod lexer;
pub mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult, FormulaIssue};
use crate::loads::{LoadType, LoadTypeRegistry};

pub use parser::{FormulaParser, ParseOptions, DEFAULT_MAX_FACTOR};

/// The load side of a term
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermLoad {
    /// A single load case, e.g. `DL`
    Single(LoadType),
    /// A compound term, e.g. `(LL or SL)`: one opaque term whose branch is
    /// chosen by the caller at evaluation time
    Either(Vec<LoadType>),
}

/// One weighted term of a formula
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    /// Signed load factor
    pub factor: f64,
    /// Load case(s) the factor applies to
    pub load: TermLoad,
}

impl Term {
    /// Term on a single load type
    pub fn single(factor: f64, load_type: LoadType) -> Self {
        Term {
            factor,
            load: TermLoad::Single(load_type),
        }
    }

    /// Compound term over alternative load types
    pub fn either(factor: f64, alternatives: Vec<LoadType>) -> Self {
        Term {
            factor,
            load: TermLoad::Either(alternatives),
        }
    }

    /// Every load type this term references
    pub fn load_types(&self) -> &[LoadType] {
        match &self.load {
            TermLoad::Single(lt) => std::slice::from_ref(lt),
            TermLoad::Either(alternatives) => alternatives,
        }
    }

    /// Whether this is a compound `(A or B)` term
    pub fn is_compound(&self) -> bool {
        matches!(self.load, TermLoad::Either(_))
    }

    /// Load type used when evaluating this term with the given branch index.
    ///
    /// Single terms ignore the branch. Returns `None` when the branch index
    /// is outside a compound term's alternatives.
    pub fn resolve(&self, branch: usize) -> Option<LoadType> {
        match &self.load {
            TermLoad::Single(lt) => Some(*lt),
            TermLoad::Either(alternatives) => alternatives.get(branch).copied(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_factor(self.factor.abs()))?;
        match &self.load {
            TermLoad::Single(lt) => write!(f, "{}", lt.code()),
            TermLoad::Either(alternatives) => {
                let codes: Vec<&str> = alternatives.iter().map(|lt| lt.code()).collect();
                write!(f, "({})", codes.join(" or "))
            }
        }
    }
}

/// A validated combination formula
///
/// Serializes as its canonical text. Deserializing re-parses the text
/// against the full load-type vocabulary with default [`ParseOptions`], so
/// signed formulas are refused there; read those through a parser that
/// allows them (see [`FormulaParser::allowing_alternating`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    terms: Vec<Term>,
}

impl Formula {
    /// Terms must already satisfy the validation rules (parser output).
    pub(crate) fn from_validated_terms(terms: Vec<Term>) -> Self {
        Formula { terms }
    }

    /// Terms in written order
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of terms (never zero)
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always false for a validated formula; present for API symmetry
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Every referenced load type, in written order
    pub fn load_types(&self) -> Vec<LoadType> {
        self.terms
            .iter()
            .flat_map(|term| term.load_types().iter().copied())
            .collect()
    }

    /// Whether the formula references a load type (including inside compound terms)
    pub fn contains(&self, load_type: LoadType) -> bool {
        self.terms.iter().any(|term| term.load_types().contains(&load_type))
    }

    /// Factor applied to a load type, if it appears in a single term
    pub fn factor_for(&self, load_type: LoadType) -> Option<f64> {
        self.terms.iter().find_map(|term| match term.load {
            TermLoad::Single(lt) if lt == load_type => Some(term.factor),
            _ => None,
        })
    }

    /// Whether any term is a compound `(A or B)` term
    /// Whether any term has a negative factor
    pub fn has_negative_factors(&self) -> bool {
        self.terms.iter().any(|term| term.factor < 0.0)
    }

    pub fn has_compound_terms(&self) -> bool {
        self.terms.iter().any(Term::is_compound)
    }

    /// Keep only terms whose load types are available.
    ///
    /// Compound terms keep their available alternatives (collapsing to a
    /// single term when one remains). Returns the surviving terms and the
    /// load types that were dropped, in written order.
    pub fn retain_available(&self, available: &[LoadType]) -> (Vec<Term>, Vec<LoadType>) {
        let mut kept = Vec::with_capacity(self.terms.len());
        let mut dropped = Vec::new();

        for term in &self.terms {
            match &term.load {
                TermLoad::Single(lt) => {
                    if available.contains(lt) {
                        kept.push(term.clone());
                    } else {
                        dropped.push(*lt);
                    }
                }
                TermLoad::Either(alternatives) => {
                    let (present, missing): (Vec<LoadType>, Vec<LoadType>) =
                        alternatives.iter().copied().partition(|lt| available.contains(lt));
                    dropped.extend(missing);
                    match present.len() {
                        0 => {}
                        1 => kept.push(Term::single(term.factor, present[0])),
                        _ => kept.push(Term::either(term.factor, present)),
                    }
                }
            }
        }

        (kept, dropped)
    }

    /// Fan compound terms out into concrete formulas, one per branch
    /// combination. A formula without compound terms expands to itself.
    pub fn expand_alternatives(&self) -> Vec<Formula> {
        let mut expanded: Vec<Vec<Term>> = vec![Vec::with_capacity(self.terms.len())];

        for term in &self.terms {
            match &term.load {
                TermLoad::Single(_) => {
                    for partial in &mut expanded {
                        partial.push(term.clone());
                    }
                }
                TermLoad::Either(alternatives) => {
                    let mut next = Vec::with_capacity(expanded.len() * alternatives.len());
                    for partial in &expanded {
                        for lt in alternatives {
                            let mut branch = partial.clone();
                            branch.push(Term::single(term.factor, *lt));
                            next.push(branch);
                        }
                    }
                    expanded = next;
                }
            }
        }

        expanded.into_iter().map(Formula::from_validated_terms).collect()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            let negative = term.factor < 0.0;
            match (i, negative) {
                (0, true) => write!(f, "-")?,
                (0, false) => {}
                (_, true) => write!(f, " - ")?,
                (_, false) => write!(f, " + ")?,
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Formula {
    type Error = CalcError;

    fn try_from(text: String) -> CalcResult<Self> {
        let registry = LoadTypeRegistry::standard();
        FormulaParser::new(&registry).parse(&text)
    }
}

impl From<Formula> for String {
    fn from(formula: Formula) -> String {
        formula.to_string()
    }
}

/// Render a factor in shortest round-trip form with at least one decimal
/// (`1.0`, `1.35`, `0.525`).
pub fn format_factor(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Assemble a formula from `(LoadType, factor)` pairs.
///
/// The result goes through the same parser as typed text, so a built
/// formula obeys exactly the same rules.
///
/// # Example
/// ```
/// use combo_core::formula::{FormulaBuilder, FormulaParser};
/// use combo_core::loads::{LoadType, LoadTypeRegistry};
///
/// let registry = LoadTypeRegistry::standard();
/// let parser = FormulaParser::new(&registry);
///
/// let formula = FormulaBuilder::new()
///     .term(LoadType::Dead, 1.2)
///     .term(LoadType::Live, 1.6)
///     .build(&parser)
///     .unwrap();
/// assert_eq!(formula.to_string(), "1.2DL + 1.6LL");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormulaBuilder {
    terms: Vec<Term>,
}

impl FormulaBuilder {
    pub fn new() -> Self {
        FormulaBuilder::default()
    }

    /// Add a single-load term (builder pattern)
    pub fn term(mut self, load_type: LoadType, factor: f64) -> Self {
        self.terms.push(Term::single(factor, load_type));
        self
    }

    /// Add a compound term (builder pattern)
    pub fn either(mut self, factor: f64, alternatives: &[LoadType]) -> Self {
        self.terms.push(Term::either(factor, alternatives.to_vec()));
        self
    }

    /// Formula text for the terms added so far
    pub fn text(&self) -> String {
        Formula::from_validated_terms(self.terms.clone()).to_string()
    }

    /// Validate through the parser and return the formula
    pub fn build(&self, parser: &FormulaParser<'_>) -> CalcResult<Formula> {
        for term in &self.terms {
            if !term.factor.is_finite() {
                return Err(CalcError::validation(
                    self.text(),
                    FormulaIssue::MalformedFactor,
                    format!("factor {} is not a finite number", term.factor),
                ));
            }
        }
        parser.parse(&self.text())
    }
}
