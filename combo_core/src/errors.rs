//! # Error Types
//!
//! Structured error types for combo_core. Every failure carries enough
//! context to be shown to an engineer as-is and a stable machine code
//! ([`CalcError::error_code`]) for programmatic handling.
//!
//! Nothing in the core is fatal to the process: the worst outcome is that a
//! single combination or a single operation failed.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::errors::{CalcError, CalcResult};
//!
//! fn require_workers(workers: usize) -> CalcResult<()> {
//!     if workers == 0 {
//!         return Err(CalcError::invalid_input(
//!             "batch_workers",
//!             workers.to_string(),
//!             "At least one worker is required",
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(require_workers(0).unwrap_err().error_code(), "INVALID_INPUT");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for combo_core operations
pub type CalcResult<T> = Result<T, CalcError>;

/// Distinct reasons a formula can be rejected.
///
/// Syntax problems are reported through [`CalcError::Parse`] (with a byte
/// position), semantic ones through [`CalcError::Validation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaIssue {
    EmptyFormula,
    MalformedFactor,
    NonPositiveFactor,
    FactorOutOfRange,
    UnknownLoadType,
    DuplicateLoadType,
    MissingFactor,
    MissingLoadType,
    MissingOperator,
    ConsecutiveOperators,
    LeadingOperator,
    TrailingOperator,
    UnbalancedGroup,
    UnexpectedCharacter,
}

impl FormulaIssue {
    /// Short human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FormulaIssue::EmptyFormula => "formula is empty",
            FormulaIssue::MalformedFactor => "factor is not a valid number",
            FormulaIssue::NonPositiveFactor => "factor must be positive",
            FormulaIssue::FactorOutOfRange => "factor is out of range",
            FormulaIssue::UnknownLoadType => "unrecognized load type",
            FormulaIssue::DuplicateLoadType => "duplicate load type",
            FormulaIssue::MissingFactor => "term is missing its factor",
            FormulaIssue::MissingLoadType => "term is missing its load type",
            FormulaIssue::MissingOperator => "missing operator between terms",
            FormulaIssue::ConsecutiveOperators => "two operators in a row",
            FormulaIssue::LeadingOperator => "formula starts with an operator",
            FormulaIssue::TrailingOperator => "formula ends with an operator",
            FormulaIssue::UnbalancedGroup => "mismatched grouping",
            FormulaIssue::UnexpectedCharacter => "unexpected character",
        }
    }
}

impl std::fmt::Display for FormulaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Structured error type for combination operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling programmatic error handling by callers and tooling.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum CalcError {
    /// Formula text is syntactically malformed
    #[error("Parse error in '{formula}' at position {position}: {reason}")]
    Parse {
        formula: String,
        position: usize,
        issue: FormulaIssue,
        reason: String,
    },

    /// Formula is well-formed but semantically invalid
    #[error("Invalid formula '{formula}': {reason}")]
    Validation {
        formula: String,
        issue: FormulaIssue,
        reason: String,
    },

    /// Solver results do not contain a load case the formula needs
    #[error("Missing load case {load_type} for combination '{combination}'")]
    MissingLoadCase {
        combination: String,
        load_type: String,
    },

    /// Solver results contain non-finite values or are inconsistent
    #[error("Invalid solver data for combination '{combination}' ({load_type}, member '{member}'): {reason}")]
    InvalidSolverData {
        combination: String,
        load_type: String,
        member: String,
        reason: String,
    },

    /// Critical selection requested but nothing has been analyzed
    #[error("No analyzed combinations available for {criterion} selection")]
    NoAnalyzedCombinations { criterion: String },

    /// Combination has no validated formula yet
    #[error("Combination '{combination}' has no validated formula")]
    NotFormulated { combination: String },

    /// Attempt to edit the formula of a code-generated combination
    #[error("Combination '{combination}' is a {standard} combination; its formula is read-only")]
    ReadOnlyFormula {
        combination: String,
        standard: String,
    },

    /// Combination name already used within a set
    #[error("Duplicate combination name: {name}")]
    DuplicateName { name: String },

    /// Combination not found in a set
    #[error("Combination not found: {name}")]
    CombinationNotFound { name: String },

    /// A built-in template failed validation (library bug, not user error)
    #[error("Template error in {standard} template '{template}': {reason}")]
    Template {
        standard: String,
        template: String,
        reason: String,
    },

    /// An input value is invalid (out of range, wrong type, etc.)
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// A required field is missing from an interchange document
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// File is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl CalcError {
    /// Create a Parse error
    pub fn parse(formula: impl Into<String>, position: usize, issue: FormulaIssue, reason: impl Into<String>) -> Self {
        CalcError::Parse {
            formula: formula.into(),
            position,
            issue,
            reason: reason.into(),
        }
    }

    /// Create a Validation error
    pub fn validation(formula: impl Into<String>, issue: FormulaIssue, reason: impl Into<String>) -> Self {
        CalcError::Validation {
            formula: formula.into(),
            issue,
            reason: reason.into(),
        }
    }

    /// Create a MissingLoadCase error
    pub fn missing_load_case(combination: impl Into<String>, load_type: impl Into<String>) -> Self {
        CalcError::MissingLoadCase {
            combination: combination.into(),
            load_type: load_type.into(),
        }
    }

    /// Create an InvalidSolverData error
    pub fn invalid_solver_data(
        combination: impl Into<String>,
        load_type: impl Into<String>,
        member: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CalcError::InvalidSolverData {
            combination: combination.into(),
            load_type: load_type.into(),
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        CalcError::MissingField {
            field: field.into(),
        }
    }

    /// Create a Template error
    pub fn template(standard: impl Into<String>, template: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Template {
            standard: standard.into(),
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        CalcError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl Into<String>) -> Self {
        CalcError::SerializationError {
            reason: reason.into(),
        }
    }

    /// The formula issue behind a Parse or Validation error
    pub fn issue(&self) -> Option<FormulaIssue> {
        match self {
            CalcError::Parse { issue, .. } | CalcError::Validation { issue, .. } => Some(*issue),
            _ => None,
        }
    }

    /// Human-readable reason without the error-kind prefix
    pub fn reason(&self) -> String {
        match self {
            CalcError::Parse { reason, .. } | CalcError::Validation { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CalcError::FileLocked { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CalcError::Parse { .. } => "PARSE_ERROR",
            CalcError::Validation { .. } => "VALIDATION_ERROR",
            CalcError::MissingLoadCase { .. } => "MISSING_LOAD_CASE",
            CalcError::InvalidSolverData { .. } => "INVALID_SOLVER_DATA",
            CalcError::NoAnalyzedCombinations { .. } => "NO_ANALYZED_COMBINATIONS",
            CalcError::NotFormulated { .. } => "NOT_FORMULATED",
            CalcError::ReadOnlyFormula { .. } => "READ_ONLY_FORMULA",
            CalcError::DuplicateName { .. } => "DUPLICATE_NAME",
            CalcError::CombinationNotFound { .. } => "COMBINATION_NOT_FOUND",
            CalcError::Template { .. } => "TEMPLATE_ERROR",
            CalcError::InvalidInput { .. } => "INVALID_INPUT",
            CalcError::MissingField { .. } => "MISSING_FIELD",
            CalcError::FileError { .. } => "FILE_ERROR",
            CalcError::FileLocked { .. } => "FILE_LOCKED",
            CalcError::SerializationError { .. } => "SERIALIZATION_ERROR",
            CalcError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = CalcError::parse("1.2DL +", 6, FormulaIssue::TrailingOperator, "formula ends with an operator");
        let json = serde_json::to_string(&error).unwrap();
        let roundtrip: CalcError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
        assert!(json.contains("trailing_operator"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CalcError::missing_field("name").error_code(), "MISSING_FIELD");
        assert_eq!(CalcError::missing_load_case("C1", "LL").error_code(), "MISSING_LOAD_CASE");
        assert_eq!(
            CalcError::NoAnalyzedCombinations { criterion: "moment".into() }.error_code(),
            "NO_ANALYZED_COMBINATIONS"
        );
        assert_eq!(
            CalcError::template("ACI_318", "1.2DL", "bad table").error_code(),
            "TEMPLATE_ERROR"
        );
    }

    #[test]
    fn test_issue_accessor() {
        let error = CalcError::validation("1.2DL + 1.0DL", FormulaIssue::DuplicateLoadType, "DL appears twice");
        assert_eq!(error.issue(), Some(FormulaIssue::DuplicateLoadType));
        assert_eq!(error.reason(), "DL appears twice");
        assert_eq!(CalcError::missing_field("date").issue(), None);
    }

    #[test]
    fn test_missing_load_case_message_names_type() {
        let error = CalcError::missing_load_case("ULS-1", "LL");
        assert!(error.to_string().contains("LL"));
        assert!(!error.is_recoverable());
    }
}
