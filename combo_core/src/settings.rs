//! # Engine Settings
//!
//! Configuration shared by the parser, the standard library and the
//! analysis manager. Loaded from JSON by front ends; every field has a
//! default so partial files are accepted.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::settings::EngineSettings;
//!
//! let settings: EngineSettings = serde_json::from_str(r#"{ "batch_workers": 2 }"#).unwrap();
//! assert_eq!(settings.batch_workers, 2);
//! assert_eq!(settings.project_label, "StructureTools Analysis");
//! settings.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::formula::ParseOptions;
use crate::standards::StandardType;

/// Default project label written into exported documents
pub const DEFAULT_PROJECT_LABEL: &str = "StructureTools Analysis";

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Standard used when a front end does not name one
    pub default_standard: StandardType,

    /// Worker threads for batch analysis
    pub batch_workers: usize,

    /// Formula validation options
    pub parse: ParseOptions,

    /// Branch index used to evaluate compound `(A or B)` terms
    pub alternative_branch: usize,

    /// Project label for exported documents
    pub project_label: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            default_standard: StandardType::default(),
            batch_workers: default_workers(),
            parse: ParseOptions::default(),
            alternative_branch: 0,
            project_label: DEFAULT_PROJECT_LABEL.to_string(),
        }
    }
}

impl EngineSettings {
    /// Check value ranges
    pub fn validate(&self) -> CalcResult<()> {
        if self.batch_workers == 0 {
            return Err(CalcError::invalid_input(
                "batch_workers",
                "0",
                "At least one worker is required",
            ));
        }
        if !self.parse.max_factor.is_finite() || self.parse.max_factor <= 0.0 {
            return Err(CalcError::invalid_input(
                "parse.max_factor",
                self.parse.max_factor.to_string(),
                "Must be a positive finite number",
            ));
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.default_standard, StandardType::Aci318);
        assert!(settings.batch_workers >= 1);
        assert!(!settings.parse.allow_alternating);
        assert_eq!(settings.parse.max_factor, 1000.0);
        assert_eq!(settings.alternative_branch, 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{ "default_standard": "Eurocode", "parse": { "allow_alternating": true } }"#;
        let settings: EngineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.default_standard, StandardType::Eurocode);
        assert!(settings.parse.allow_alternating);
        assert_eq!(settings.parse.max_factor, 1000.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = EngineSettings {
            batch_workers: 0,
            ..EngineSettings::default()
        };
        assert_eq!(settings.validate().unwrap_err().error_code(), "INVALID_INPUT");

        let mut settings = EngineSettings::default();
        settings.parse.max_factor = f64::NAN;
        assert!(settings.validate().is_err());
    }
}
