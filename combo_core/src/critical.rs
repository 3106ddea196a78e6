//! # Critical Combination Selection
//!
//! Finds the governing combination for a response quantity: the analyzed
//! combination with the largest stored maximum.
//!
//! Selection is a pure scan that returns a [`Selection`]. It never touches
//! the combinations themselves; persisting the result as `is_critical` flags
//! is a separate, explicit step ([`CombinationSet::apply_selection`] or
//! [`mark_critical`]).
//!
//! Ties are broken by name: the lexically smallest name wins, so repeated
//! runs always pick the same combination.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::critical::{find_critical, Criterion};
//! use combo_core::combination_set::CombinationSet;
//!
//! let set = CombinationSet::new("Empty");
//! let err = find_critical(&set, Criterion::Moment).unwrap_err();
//! assert_eq!(err.error_code(), "NO_ANALYZED_COMBINATIONS");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::combination::{AnalysisResult, LoadCombination};
use crate::combination_set::CombinationSet;
use crate::errors::{CalcError, CalcResult};

/// Response quantity a selection is made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Moment,
    Shear,
    Axial,
    Deflection,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Moment,
        Criterion::Shear,
        Criterion::Axial,
        Criterion::Deflection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Moment => "moment",
            Criterion::Shear => "shear",
            Criterion::Axial => "axial",
            Criterion::Deflection => "deflection",
        }
    }

    /// The stored maximum this criterion compares
    pub fn value_of(&self, result: &AnalysisResult) -> f64 {
        match self {
            Criterion::Moment => result.max_moment,
            Criterion::Shear => result.max_shear,
            Criterion::Axial => result.max_axial,
            Criterion::Deflection => result.max_deflection,
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Criterion {
    type Err = CalcError;

    fn from_str(s: &str) -> CalcResult<Self> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CalcError::invalid_input(
                    "criterion",
                    s,
                    "Expected one of: moment, shear, axial, deflection",
                )
            })
    }
}

/// Winner of one criterion evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub criterion: Criterion,
    /// Name of the governing combination
    pub winner: String,
    /// Winner's stored maximum for the criterion
    pub value: f64,
    /// Winner's stored critical member: the member with the largest
    /// absolute moment, whatever the criterion
    pub critical_member: String,
    /// Number of analyzed combinations that took part
    pub candidates: usize,
    pub message: String,
}

/// Find the governing combination for one criterion.
///
/// Only analyzed combinations take part. Equal values go to the
/// lexically smaller name.
///
/// # Errors
///
/// [`CalcError::NoAnalyzedCombinations`] when nothing has a result.
pub fn find_critical<'a, I>(combinations: I, criterion: Criterion) -> CalcResult<Selection>
where
    I: IntoIterator<Item = &'a LoadCombination>,
{
    let mut best: Option<(&LoadCombination, &AnalysisResult, f64)> = None;
    let mut candidates = 0;

    for combination in combinations {
        let Some(result) = combination.result() else {
            continue;
        };
        candidates += 1;
        let value = criterion.value_of(result);
        let better = match best {
            None => true,
            Some((current, _, best_value)) => {
                value > best_value || (value == best_value && combination.name() < current.name())
            }
        };
        if better {
            best = Some((combination, result, value));
        }
    }

    let (winner, result, value) = best.ok_or_else(|| CalcError::NoAnalyzedCombinations {
        criterion: criterion.name().to_string(),
    })?;

    let message = format!(
        "Critical combination for {}: {} ({:.3}, {} candidates)",
        criterion,
        winner.name(),
        value,
        candidates
    );
    info!(criterion = criterion.name(), winner = winner.name(), value, candidates, "Critical combination selected");

    Ok(Selection {
        criterion,
        winner: winner.name().to_string(),
        value,
        critical_member: result.critical_member.clone(),
        candidates,
        message,
    })
}

/// Independent winners for several criteria, in the order requested
pub fn find_all_critical<'a, I>(combinations: I, criteria: &[Criterion]) -> CalcResult<Vec<Selection>>
where
    I: IntoIterator<Item = &'a LoadCombination>,
    I::IntoIter: Clone,
{
    let combinations = combinations.into_iter();
    criteria
        .iter()
        .map(|&criterion| find_critical(combinations.clone(), criterion))
        .collect()
}

/// Select the winner for a criterion and persist it as flags on the set.
///
/// The winner is flagged critical and every other combination is cleared.
pub fn mark_critical(set: &mut CombinationSet, criterion: Criterion) -> CalcResult<Selection> {
    let selection = find_critical(set.iter(), criterion)?;
    set.apply_selection(&selection)?;
    Ok(selection)
}

/// Selections keyed by criterion name, as embedded in exported documents
pub fn selections_by_criterion(selections: &[Selection]) -> BTreeMap<String, &Selection> {
    selections
        .iter()
        .map(|selection| (selection.criterion.name().to_string(), selection))
        .collect()
}
