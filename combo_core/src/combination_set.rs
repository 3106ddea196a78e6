//! # Combination Sets
//!
//! A [`CombinationSet`] is the container that owns a group of load
//! combinations: it is what gets batch-analyzed, scanned for critical
//! combinations and exported.
//!
//! ## Structure
//!
//! ```text
//! CombinationSet
//! ├── meta: SetMetadata (label, timestamps)
//! └── combinations: Vec<LoadCombination> (insertion order, unique names)
//! ```
//!
//! Membership changes (`insert`, `remove`, `rename`) take `&mut self`, so
//! they cannot overlap a batch analysis of the same set.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::combination::LoadCombination;
//! use combo_core::combination_set::CombinationSet;
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::LoadTypeRegistry;
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//!
//! let mut set = CombinationSet::new("Level 2 framing");
//! set.insert(LoadCombination::custom("C1", "1.2DL + 1.6LL", &parser).unwrap()).unwrap();
//! assert!(set.insert(LoadCombination::draft("C1")).is_err());
//! assert_eq!(set.len(), 1);
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::combination::LoadCombination;
use crate::critical::Selection;
use crate::errors::{CalcError, CalcResult};

/// Set metadata carried into exported documents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetMetadata {
    /// Project label
    pub label: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Ordered, name-keyed collection of combinations.
#[derive(Debug, Clone, Serialize)]
pub struct CombinationSet {
    pub meta: SetMetadata,

    combinations: Vec<LoadCombination>,

    /// Name → position in `combinations`
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CombinationSet {
    /// Create an empty set
    pub fn new(label: impl Into<String>) -> Self {
        let now = Utc::now();
        CombinationSet {
            meta: SetMetadata {
                label: label.into(),
                created: now,
                modified: now,
            },
            combinations: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a combination; names must be unique within the set
    pub fn insert(&mut self, combination: LoadCombination) -> CalcResult<()> {
        if self.index.contains_key(combination.name()) {
            return Err(CalcError::DuplicateName {
                name: combination.name().to_string(),
            });
        }
        self.index.insert(combination.name().to_string(), self.combinations.len());
        self.combinations.push(combination);
        self.touch();
        Ok(())
    }

    /// Add every combination, stopping at the first duplicate name
    pub fn extend(&mut self, combinations: impl IntoIterator<Item = LoadCombination>) -> CalcResult<()> {
        for combination in combinations {
            self.insert(combination)?;
        }
        Ok(())
    }

    /// Remove a combination by name.
    ///
    /// Returns the removed combination if it existed.
    pub fn remove(&mut self, name: &str) -> Option<LoadCombination> {
        let position = self.index.remove(name)?;
        let removed = self.combinations.remove(position);
        self.reindex();
        self.touch();
        Some(removed)
    }

    /// Rename a combination, keeping its position
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> CalcResult<()> {
        let new = new.into();
        if old == new {
            return if self.contains(old) {
                Ok(())
            } else {
                Err(CalcError::CombinationNotFound { name: old.to_string() })
            };
        }
        if self.index.contains_key(&new) {
            return Err(CalcError::DuplicateName { name: new });
        }
        let position = self
            .index
            .remove(old)
            .ok_or_else(|| CalcError::CombinationNotFound { name: old.to_string() })?;

        self.combinations[position].set_name(new.clone());
        self.index.insert(new, position);
        self.touch();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LoadCombination> {
        self.index.get(name).map(|&i| &self.combinations[i])
    }

    /// Get a mutable reference to a combination.
    ///
    /// Note: This marks the set as modified when the combination exists.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut LoadCombination> {
        let position = *self.index.get(name)?;
        self.touch();
        self.combinations.get_mut(position)
    }

    pub(crate) fn get_index_mut(&mut self, position: usize) -> Option<&mut LoadCombination> {
        self.combinations.get_mut(position)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Combinations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &LoadCombination> {
        self.combinations.iter()
    }

    pub fn as_slice(&self) -> &[LoadCombination] {
        &self.combinations
    }

    pub fn names(&self) -> Vec<&str> {
        self.combinations.iter().map(LoadCombination::name).collect()
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Number of combinations holding a result
    pub fn analyzed_count(&self) -> usize {
        self.combinations.iter().filter(|c| c.is_analyzed()).count()
    }

    /// Names of combinations currently flagged critical
    pub fn critical_names(&self) -> Vec<&str> {
        self.combinations
            .iter()
            .filter(|c| c.is_critical())
            .map(LoadCombination::name)
            .collect()
    }

    /// Persist a selection as flags: the winner becomes critical, every
    /// other analyzed combination is cleared.
    pub fn apply_selection(&mut self, selection: &Selection) -> CalcResult<()> {
        if !self.contains(&selection.winner) {
            return Err(CalcError::CombinationNotFound {
                name: selection.winner.clone(),
            });
        }
        for combination in &mut self.combinations {
            let critical = combination.name() == selection.winner;
            combination.set_critical(critical);
        }
        self.touch();
        Ok(())
    }

    /// Clear every critical flag
    pub fn clear_critical(&mut self) {
        for combination in &mut self.combinations {
            combination.set_critical(false);
        }
        self.touch();
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.meta.modified = Utc::now();
    }

    fn reindex(&mut self) {
        self.index = self
            .combinations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_string(), i))
            .collect();
    }
}

impl Default for CombinationSet {
    fn default() -> Self {
        CombinationSet::new("")
    }
}

impl PartialEq for CombinationSet {
    /// Sets are equal when they hold equal combinations in the same order;
    /// metadata is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.combinations == other.combinations
    }
}

impl<'a> IntoIterator for &'a CombinationSet {
    type Item = &'a LoadCombination;
    type IntoIter = std::slice::Iter<'a, LoadCombination>;

    fn into_iter(self) -> Self::IntoIter {
        self.combinations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::AnalysisResult;
    use crate::critical::Criterion;
    use crate::formula::FormulaParser;
    use crate::loads::LoadTypeRegistry;

    fn sample_set() -> CombinationSet {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);
        let mut set = CombinationSet::new("Test");
        for (name, formula) in [("A", "1.4DL"), ("B", "1.2DL + 1.6LL"), ("C", "0.9DL + 1.0WL")] {
            set.insert(LoadCombination::custom(name, formula, &parser).unwrap()).unwrap();
        }
        set
    }

    fn result(moment: f64) -> AnalysisResult {
        AnalysisResult {
            max_moment: moment,
            max_shear: 0.0,
            max_axial: 0.0,
            max_deflection: 0.0,
            critical_member: "M1".to_string(),
            is_critical: false,
        }
    }

    #[test]
    fn test_insert_preserves_order() {
        let set = sample_set();
        assert_eq!(set.names(), vec!["A", "B", "C"]);
        assert_eq!(set.get("B").unwrap().formula_text(), "1.2DL + 1.6LL");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut set = sample_set();
        let err = set.insert(LoadCombination::draft("A")).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_NAME");
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_remove_reindexes() {
        let mut set = sample_set();
        let removed = set.remove("A").unwrap();
        assert_eq!(removed.name(), "A");
        assert!(set.remove("A").is_none());
        assert_eq!(set.get("C").unwrap().name(), "C");
        assert_eq!(set.names(), vec!["B", "C"]);
    }

    #[test]
    fn test_rename() {
        let mut set = sample_set();
        set.rename("B", "ULS-2").unwrap();
        assert_eq!(set.names(), vec!["A", "ULS-2", "C"]);
        assert!(set.get("B").is_none());
        assert!(set.rename("A", "C").is_err());
        assert!(set.rename("missing", "D").is_err());
        assert!(set.rename("A", "A").is_ok());
    }

    #[test]
    fn test_apply_selection_is_exclusive() {
        let mut set = sample_set();
        set.get_index_mut(0).unwrap().set_result(result(10.0));
        set.get_index_mut(1).unwrap().set_result(result(20.0));
        set.get_index_mut(0).unwrap().set_critical(true);

        let selection = Selection {
            criterion: Criterion::Moment,
            winner: "B".to_string(),
            value: 20.0,
            critical_member: "M1".to_string(),
            candidates: 2,
            message: String::new(),
        };
        set.apply_selection(&selection).unwrap();
        assert_eq!(set.critical_names(), vec!["B"]);
        assert_eq!(set.analyzed_count(), 2);

        set.clear_critical();
        assert!(set.critical_names().is_empty());
    }

    #[test]
    fn test_apply_selection_unknown_winner() {
        let mut set = sample_set();
        let selection = Selection {
            criterion: Criterion::Shear,
            winner: "Z".to_string(),
            value: 0.0,
            critical_member: String::new(),
            candidates: 0,
            message: String::new(),
        };
        assert_eq!(set.apply_selection(&selection).unwrap_err().error_code(), "COMBINATION_NOT_FOUND");
    }
}
