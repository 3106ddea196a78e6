//! # Load Combination Entity
//!
//! A [`LoadCombination`] is a named formula plus the maxima of its last
//! successful analysis. Its lifecycle state is derived from the data it
//! holds, so a stale result can never be observed as valid:
//!
//! ```text
//! Draft ──set_formula──▶ Formulated ──analysis──▶ Analyzed ──selection──▶ Critical
//!                            ▲                        │
//!                            └──── set_formula ───────┘  (result discarded)
//! ```
//!
//! Combinations generated from a design standard are born `Formulated` and
//! their formula is read-only.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::combination::{CombinationState, LoadCombination};
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::LoadTypeRegistry;
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//!
//! let mut combo = LoadCombination::draft("Roof-1");
//! assert_eq!(combo.state(), CombinationState::Draft);
//!
//! combo.set_formula("1.2DL + 1.6LL + 0.5RL", &parser).unwrap();
//! assert_eq!(combo.state(), CombinationState::Formulated);
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::formula::{Formula, FormulaParser};
use crate::standards::StandardType;

/// Lifecycle state of a combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationState {
    /// No validated formula yet
    Draft,
    /// Formula validated, not analyzed
    Formulated,
    /// Result present
    Analyzed,
    /// Result present and marked governing by a selection
    Critical,
}

impl std::fmt::Display for CombinationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CombinationState::Draft => "draft",
            CombinationState::Formulated => "formulated",
            CombinationState::Analyzed => "analyzed",
            CombinationState::Critical => "critical",
        };
        write!(f, "{}", label)
    }
}

/// Envelope of one analysis run: absolute maxima over all members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub max_moment: f64,
    pub max_shear: f64,
    pub max_axial: f64,
    pub max_deflection: f64,
    /// Member attaining the maximum absolute moment
    pub critical_member: String,
    /// Set by an explicit selection update step
    #[serde(default)]
    pub is_critical: bool,
}

/// A named load combination.
///
/// Fields are private so that every formula change goes through
/// [`LoadCombination::set_formula`], which re-validates and discards stale
/// results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadCombination {
    name: String,
    standard: StandardType,
    description: String,
    formula: Option<Formula>,
    include_in_analysis: bool,
    allow_alternating: bool,
    result: Option<AnalysisResult>,
}

impl LoadCombination {
    /// Custom combination without a formula
    pub fn draft(name: impl Into<String>) -> Self {
        LoadCombination {
            name: name.into(),
            standard: StandardType::Custom,
            description: String::new(),
            formula: None,
            include_in_analysis: true,
            allow_alternating: false,
            result: None,
        }
    }

    /// Custom combination with a validated formula
    ///
    /// # Example
    /// ```
    /// use combo_core::combination::LoadCombination;
    /// use combo_core::formula::FormulaParser;
    /// use combo_core::loads::LoadTypeRegistry;
    ///
    /// let registry = LoadTypeRegistry::standard();
    /// let parser = FormulaParser::new(&registry);
    ///
    /// let combo = LoadCombination::custom("C1", "1.2DL+1.6LL", &parser).unwrap();
    /// assert_eq!(combo.formula_text(), "1.2DL + 1.6LL");
    /// assert!(LoadCombination::custom("C2", "1.2DL + 1.0DL", &parser).is_err());
    /// ```
    pub fn custom(name: impl Into<String>, formula: &str, parser: &FormulaParser<'_>) -> CalcResult<Self> {
        let mut combo = LoadCombination::draft(name);
        combo.set_formula(formula, parser)?;
        Ok(combo)
    }

    /// Combination produced from a design-standard template
    pub(crate) fn from_template(
        name: impl Into<String>,
        standard: StandardType,
        formula: Formula,
        description: impl Into<String>,
    ) -> Self {
        LoadCombination {
            name: name.into(),
            standard,
            description: description.into(),
            formula: Some(formula),
            include_in_analysis: true,
            allow_alternating: false,
            result: None,
        }
    }

    /// Rebuild a combination from already validated parts
    pub(crate) fn from_parts(
        name: String,
        standard: StandardType,
        description: String,
        formula: Formula,
        include_in_analysis: bool,
        allow_alternating: bool,
        result: Option<AnalysisResult>,
    ) -> Self {
        LoadCombination {
            name,
            standard,
            description,
            formula: Some(formula),
            include_in_analysis,
            allow_alternating,
            result,
        }
    }

    /// Set the description (builder pattern)
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn standard(&self) -> StandardType {
        self.standard
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    /// Canonical formula text (empty for a draft)
    pub fn formula_text(&self) -> String {
        self.formula.as_ref().map(Formula::to_string).unwrap_or_default()
    }

    pub fn include_in_analysis(&self) -> bool {
        self.include_in_analysis
    }

    pub fn allow_alternating(&self) -> bool {
        self.allow_alternating
    }

    /// Result of the last successful analysis, if any
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Current lifecycle state
    pub fn state(&self) -> CombinationState {
        match (&self.formula, &self.result) {
            (None, _) => CombinationState::Draft,
            (Some(_), None) => CombinationState::Formulated,
            (Some(_), Some(result)) if result.is_critical => CombinationState::Critical,
            (Some(_), Some(_)) => CombinationState::Analyzed,
        }
    }

    /// Whether a result is present
    pub fn is_analyzed(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_critical(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_critical)
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_include_in_analysis(&mut self, include: bool) {
        self.include_in_analysis = include;
    }

    /// Allow or forbid signed terms.
    ///
    /// Forbidding them fails if the current formula already has a
    /// negative factor.
    pub fn set_allow_alternating(&mut self, allow: bool) -> CalcResult<()> {
        if !allow {
            if let Some(formula) = &self.formula {
                if formula.has_negative_factors() {
                    return Err(CalcError::invalid_input(
                        "allow_alternating",
                        "false",
                        format!("Formula '{}' has negative factors", formula),
                    ));
                }
            }
        }
        self.allow_alternating = allow;
        Ok(())
    }

    /// Replace the formula of a custom combination.
    ///
    /// The text is validated first; on failure the previous formula and
    /// result are untouched. On success any previous result is discarded.
    ///
    /// Signed terms are accepted when either this combination or the
    /// parser's options allow them. A formula with negative factors turns
    /// the combination's own flag on, so it stays valid under any parser.
    pub fn set_formula(&mut self, text: &str, parser: &FormulaParser<'_>) -> CalcResult<()> {
        if !self.standard.is_custom() {
            return Err(CalcError::ReadOnlyFormula {
                combination: self.name.clone(),
                standard: self.standard.display_name().to_string(),
            });
        }

        let formula = parser.allowing_alternating(self.allow_alternating).parse(text)?;
        if formula.has_negative_factors() {
            self.allow_alternating = true;
        }
        self.formula = Some(formula);
        self.result = None;
        Ok(())
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_result(&mut self, result: AnalysisResult) -> &AnalysisResult {
        self.result.insert(result)
    }

    pub(crate) fn clear_result(&mut self) {
        self.result = None;
    }

    /// Set the critical flag; no effect without a result
    pub(crate) fn set_critical(&mut self, critical: bool) {
        if let Some(result) = self.result.as_mut() {
            result.is_critical = critical;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FormulaIssue;
    use crate::formula::ParseOptions;
    use crate::loads::LoadTypeRegistry;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            max_moment: 120.0,
            max_shear: 40.0,
            max_axial: 10.0,
            max_deflection: 0.02,
            critical_member: "B1".to_string(),
            is_critical: false,
        }
    }

    #[test]
    fn test_lifecycle_states() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);

        let mut combo = LoadCombination::draft("C1");
        assert_eq!(combo.state(), CombinationState::Draft);
        assert_eq!(combo.formula_text(), "");

        combo.set_formula("1.2DL + 1.6LL", &parser).unwrap();
        assert_eq!(combo.state(), CombinationState::Formulated);

        combo.set_result(sample_result());
        assert_eq!(combo.state(), CombinationState::Analyzed);

        combo.set_critical(true);
        assert_eq!(combo.state(), CombinationState::Critical);
        assert!(combo.is_critical());
    }

    #[test]
    fn test_formula_edit_discards_result() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);

        let mut combo = LoadCombination::custom("C1", "1.2DL + 1.6LL", &parser).unwrap();
        combo.set_result(sample_result());

        combo.set_formula("1.4DL", &parser).unwrap();
        assert_eq!(combo.state(), CombinationState::Formulated);
        assert!(combo.result().is_none());
    }

    #[test]
    fn test_failed_edit_keeps_previous_formula() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);

        let mut combo = LoadCombination::custom("C1", "1.2DL + 1.6LL", &parser).unwrap();
        combo.set_result(sample_result());

        let err = combo.set_formula("1.2DL + 1.0DL", &parser).unwrap_err();
        assert_eq!(err.issue(), Some(FormulaIssue::DuplicateLoadType));
        assert_eq!(combo.formula_text(), "1.2DL + 1.6LL");
        assert_eq!(combo.state(), CombinationState::Analyzed);
    }

    #[test]
    fn test_standard_formula_is_read_only() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);
        let formula = parser.parse("1.4DL").unwrap();

        let mut combo = LoadCombination::from_template("ACI318-1", StandardType::Aci318, formula, "");
        assert_eq!(combo.state(), CombinationState::Formulated);

        let err = combo.set_formula("1.2DL", &parser).unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY_FORMULA");
        assert_eq!(combo.formula_text(), "1.4DL");
    }

    #[test]
    fn test_alternating_opt_in() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);

        let mut combo = LoadCombination::draft("Uplift");
        assert!(combo.set_formula("0.9DL - 1.0WL", &parser).is_err());

        combo.set_allow_alternating(true).unwrap();
        combo.set_formula("0.9DL - 1.0WL", &parser).unwrap();
        assert_eq!(combo.formula_text(), "0.9DL - 1.0WL");

        // Cannot switch back off while a negative factor is present
        assert!(combo.set_allow_alternating(false).is_err());
        assert!(combo.allow_alternating());
    }

    #[test]
    fn test_parser_option_enables_alternating() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry).with_options(ParseOptions {
            allow_alternating: true,
            ..ParseOptions::default()
        });
        assert!(parser.validate("1.0DL - 1.0WL").0);

        let combo = LoadCombination::custom("C1", "1.0DL - 1.0WL", &parser).unwrap();
        assert_eq!(combo.formula_text(), "1.0DL - 1.0WL");
        assert!(combo.allow_alternating());

        // A combination that opted in keeps accepting signed terms under a
        // parser that does not
        let mut combo = combo;
        combo.set_formula("0.9DL - 1.0EQ", &FormulaParser::new(&registry)).unwrap();

        // Positive formulas leave the flag alone
        let plain = LoadCombination::custom("C2", "1.2DL + 1.6LL", &parser).unwrap();
        assert!(!plain.allow_alternating());
    }

    #[test]
    fn test_critical_flag_needs_result() {
        let mut combo = LoadCombination::draft("C1");
        combo.set_critical(true);
        assert!(!combo.is_critical());
        assert_eq!(combo.state(), CombinationState::Draft);
    }

    #[test]
    fn test_serialization_uses_formula_text() {
        let registry = LoadTypeRegistry::standard();
        let parser = FormulaParser::new(&registry);
        let combo = LoadCombination::custom("C1", "1.2DL+1.6LL", &parser)
            .unwrap()
            .with_description("Strength");

        let json = serde_json::to_value(&combo).unwrap();
        assert_eq!(json["formula"], "1.2DL + 1.6LL");
        assert_eq!(json["standard"], "Custom");
        assert_eq!(json["description"], "Strength");
        assert!(json["result"].is_null());
    }
}
