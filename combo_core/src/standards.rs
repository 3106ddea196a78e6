//! Design-code load combinations
//!
//! This module holds the fixed template tables for ACI 318, AISC 360,
//! Eurocode and IBC 2018, and generates named [`LoadCombination`]s from them
//! for the load cases a project actually defines.
//!
//! ## Filtering
//!
//! Template terms whose load type is not available are dropped. A template
//! is never dropped while at least one term survives (in every built-in
//! table that is the dead-load term). A template reduced to zero terms is
//! excluded and reported with a reason in the [`GenerationReport`].
//!
//! ## Custom templates
//!
//! Each standard can also hold user templates. They are listed after the
//! built-in ones, never expanded by generation, and persist through
//! [`StandardLibrary::save_templates`] / [`StandardLibrary::load_templates`].
//!
//! ## Example
//!
//! ```rust
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::{LoadType, LoadTypeRegistry};
//! use combo_core::standards::{StandardLibrary, StandardType};
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//! let library = StandardLibrary::builtin();
//!
//! let available = [LoadType::Dead, LoadType::Live, LoadType::Wind, LoadType::Seismic];
//! let report = library.generate(&parser, StandardType::Aci318, &available).unwrap();
//! assert_eq!(report.combinations.len(), 6);
//! assert_eq!(report.combinations[1].name(), "ACI318-2");
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::combination::LoadCombination;
use crate::errors::{CalcError, CalcResult};
use crate::file_io;
use crate::formula::{Formula, FormulaParser};
use crate::loads::{LoadType, LoadTypeRegistry};
use crate::serializer::{validate_version, SCHEMA_VERSION};

/// Design standard a combination belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardType {
    /// ACI 318 (concrete)
    #[default]
    #[serde(rename = "ACI_318")]
    Aci318,
    /// AISC 360 (steel)
    #[serde(rename = "AISC_360")]
    Aisc360,
    /// Eurocode (EN 1990)
    #[serde(rename = "Eurocode")]
    Eurocode,
    /// IBC 2018
    #[serde(rename = "IBC_2018")]
    Ibc2018,
    /// User-authored formula
    #[serde(rename = "Custom")]
    Custom,
}

impl StandardType {
    /// Standards with built-in template tables
    pub const BUILTIN: [StandardType; 4] = [
        StandardType::Aci318,
        StandardType::Aisc360,
        StandardType::Eurocode,
        StandardType::Ibc2018,
    ];

    /// Interchange code (`ACI_318`, `AISC_360`, `Eurocode`, `IBC_2018`, `Custom`)
    pub fn code(&self) -> &'static str {
        match self {
            StandardType::Aci318 => "ACI_318",
            StandardType::Aisc360 => "AISC_360",
            StandardType::Eurocode => "Eurocode",
            StandardType::Ibc2018 => "IBC_2018",
            StandardType::Custom => "Custom",
        }
    }

    /// Display name (`ACI 318`, ...)
    pub fn display_name(&self) -> &'static str {
        match self {
            StandardType::Aci318 => "ACI 318",
            StandardType::Aisc360 => "AISC 360",
            StandardType::Eurocode => "Eurocode",
            StandardType::Ibc2018 => "IBC 2018",
            StandardType::Custom => "Custom",
        }
    }

    /// Prefix of generated combination names
    pub fn name_prefix(&self) -> &'static str {
        match self {
            StandardType::Aci318 => "ACI318",
            StandardType::Aisc360 => "AISC360",
            StandardType::Eurocode => "EN1990",
            StandardType::Ibc2018 => "IBC2018",
            StandardType::Custom => "CUSTOM",
        }
    }

    /// Parse a standard from its code or display name.
    ///
    /// Accepts `ACI_318`, `ACI 318` and `ACI318` spellings (case-insensitive).
    ///
    /// # Example
    /// ```
    /// use combo_core::standards::StandardType;
    ///
    /// assert_eq!(StandardType::from_code("ACI 318"), Some(StandardType::Aci318));
    /// assert_eq!(StandardType::from_code("ibc_2018"), Some(StandardType::Ibc2018));
    /// assert_eq!(StandardType::from_code("ASCE 7"), None);
    /// ```
    pub fn from_code(code: &str) -> Option<StandardType> {
        let normalized: String = code
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "ACI318" => Some(StandardType::Aci318),
            "AISC360" => Some(StandardType::Aisc360),
            "EUROCODE" | "EN1990" => Some(StandardType::Eurocode),
            "IBC2018" => Some(StandardType::Ibc2018),
            "CUSTOM" => Some(StandardType::Custom),
            _ => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, StandardType::Custom)
    }

    /// Built-in template formulas, in code order
    pub fn templates(&self) -> &'static [&'static str] {
        match self {
            StandardType::Aci318 => ACI_318_TEMPLATES,
            StandardType::Aisc360 => AISC_360_TEMPLATES,
            StandardType::Eurocode => EUROCODE_TEMPLATES,
            StandardType::Ibc2018 => IBC_2018_TEMPLATES,
            StandardType::Custom => &[],
        }
    }
}

impl std::fmt::Display for StandardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for StandardType {
    type Err = CalcError;

    fn from_str(s: &str) -> CalcResult<Self> {
        StandardType::from_code(s)
            .ok_or_else(|| CalcError::invalid_input("standard", s, "Unrecognized design standard"))
    }
}

const ACI_318_TEMPLATES: &[&str] = &[
    "1.0DL + 1.0LL",
    "1.2DL + 1.6LL",
    "1.2DL + 1.0LL + 1.0WL",
    "1.2DL + 1.0LL + 1.0EQ",
    "0.9DL + 1.0WL",
    "0.9DL + 1.0EQ",
];

const AISC_360_TEMPLATES: &[&str] = &[
    "1.4DL",
    "1.2DL + 1.6LL + 0.5SL",
    "1.2DL + 1.6SL + 1.0LL",
    "1.2DL + 1.0LL + 1.0WL + 0.5SL",
    "1.2DL + 1.0LL + 1.0EQ + 0.2SL",
    "0.9DL + 1.0WL",
    "0.9DL + 1.0EQ",
];

const EUROCODE_TEMPLATES: &[&str] = &[
    "1.35DL",
    "1.35DL + 1.5LL",
    "1.35DL + 1.5LL + 0.9WL",
    "1.0DL + 1.5WL",
    "1.0DL + 1.0EQ",
];

const IBC_2018_TEMPLATES: &[&str] = &[
    "1.4DL",
    "1.2DL + 1.6LL + 0.5SL",
    "1.2DL + 1.6SL + 1.0LL",
    "1.2DL + 1.0LL + 1.0WL",
    "1.2DL + 1.0LL + 1.0EQ",
    "0.9DL + 1.0WL",
    "0.9DL + 1.0EQ",
];

/// A user template stored alongside a standard's built-in table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTemplate {
    /// Canonical formula text (validated when added)
    pub formula: String,
    pub description: String,
}

/// One row of [`StandardLibrary::all_templates`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Position in the combined list (built-in first)
    #[serde(default)]
    pub index: usize,
    pub formula: String,
    #[serde(default)]
    pub description: String,
    pub is_custom: bool,
}

/// Template file written by [`StandardLibrary::save_templates`]
///
/// Holds the full list for one standard; only custom entries are read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub schema_version: String,
    pub standard: StandardType,
    pub templates: Vec<TemplateEntry>,
}

/// A custom template refused by [`StandardLibrary::load_templates`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTemplate {
    pub formula: String,
    pub reason: String,
}

/// Outcome of [`StandardLibrary::load_templates`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateImport {
    pub standard: StandardType,
    pub imported: usize,
    pub rejected: Vec<RejectedTemplate>,
}

/// A template that lost some terms during filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedTemplate {
    pub name: String,
    pub template: String,
    pub dropped: Vec<LoadType>,
}

/// A template with no surviving terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedTemplate {
    pub name: String,
    pub template: String,
    pub reason: String,
}

/// Output of [`StandardLibrary::generate`]
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub standard: StandardType,
    /// Generated combinations in template order
    pub combinations: Vec<LoadCombination>,
    pub reduced: Vec<ReducedTemplate>,
    pub excluded: Vec<ExcludedTemplate>,
}

/// Template tables for every supported standard plus per-standard custom
/// templates.
///
/// Constructed once and passed by reference to whatever generates
/// combinations; the built-in tables are static data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardLibrary {
    #[serde(default)]
    custom: BTreeMap<StandardType, Vec<CustomTemplate>>,
}

impl StandardLibrary {
    /// Library with the built-in tables and no custom templates
    pub fn builtin() -> Self {
        StandardLibrary::default()
    }

    /// Generate the combinations of a standard for the available load cases.
    ///
    /// Load types outside the parser's registry are treated as unavailable.
    /// Factors come from the code tables, so the parser's `max_factor` and
    /// sign options do not apply to them. Every generated formula is
    /// re-validated against the full vocabulary; a failure there is a
    /// template bug and is reported as [`CalcError::Template`].
    pub fn generate(
        &self,
        parser: &FormulaParser<'_>,
        standard: StandardType,
        available: &[LoadType],
    ) -> CalcResult<GenerationReport> {
        if standard.is_custom() {
            return Err(CalcError::invalid_input(
                "standard",
                standard.code(),
                "Custom combinations have no built-in table to generate from",
            ));
        }

        let usable: Vec<LoadType> = available
            .iter()
            .copied()
            .filter(|lt| parser.registry().contains(*lt))
            .collect();

        // Templates are checked against the full vocabulary first so that a
        // restricted registry only filters terms, it never breaks a template
        let full_registry = LoadTypeRegistry::standard();
        let template_parser = FormulaParser::new(&full_registry);

        let mut report = GenerationReport {
            standard,
            combinations: Vec::new(),
            reduced: Vec::new(),
            excluded: Vec::new(),
        };

        for (i, template) in standard.templates().iter().enumerate() {
            let name = format!("{}-{}", standard.name_prefix(), i + 1);
            let parsed = template_parser
                .parse(template)
                .map_err(|e| CalcError::template(standard.code(), *template, e.reason()))?;

            let (kept, dropped) = parsed.retain_available(&usable);
            if kept.is_empty() {
                let reason = format!(
                    "No load cases available for any term (missing {})",
                    codes(&dropped)
                );
                warn!(standard = standard.code(), template = *template, %reason, "Template excluded");
                report.excluded.push(ExcludedTemplate {
                    name,
                    template: template.to_string(),
                    reason,
                });
                continue;
            }

            // Kept terms are already limited to the caller's registry
            let text = Formula::from_validated_terms(kept).to_string();
            let formula = template_parser
                .parse(&text)
                .map_err(|e| CalcError::template(standard.code(), *template, e.reason()))?;

            if !dropped.is_empty() {
                debug!(
                    standard = standard.code(),
                    template = *template,
                    dropped = %codes(&dropped),
                    "Template reduced"
                );
                report.reduced.push(ReducedTemplate {
                    name: name.clone(),
                    template: template.to_string(),
                    dropped,
                });
            }

            let description = format!("{} combination {}", standard.display_name(), i + 1);
            report
                .combinations
                .push(LoadCombination::from_template(name, standard, formula, description));
        }

        info!(
            standard = standard.code(),
            generated = report.combinations.len(),
            reduced = report.reduced.len(),
            excluded = report.excluded.len(),
            "Generated standard combinations"
        );

        Ok(report)
    }

    /// Add a validated custom template to a standard.
    ///
    /// Returns the template's index within that standard's custom list.
    pub fn add_custom_template(
        &mut self,
        parser: &FormulaParser<'_>,
        standard: StandardType,
        formula: &str,
        description: impl Into<String>,
    ) -> CalcResult<usize> {
        let formula = parser.parse(formula)?;
        let templates = self.custom.entry(standard).or_default();
        templates.push(CustomTemplate {
            formula: formula.to_string(),
            description: description.into(),
        });
        Ok(templates.len() - 1)
    }

    /// Remove a custom template by its index within the standard's custom list
    pub fn remove_custom_template(&mut self, standard: StandardType, index: usize) -> CalcResult<CustomTemplate> {
        match self.custom.get_mut(&standard) {
            Some(templates) if index < templates.len() => Ok(templates.remove(index)),
            _ => Err(CalcError::invalid_input(
                "index",
                index.to_string(),
                format!("No custom template at this index for {}", standard.display_name()),
            )),
        }
    }

    /// Custom templates of a standard
    pub fn custom_templates(&self, standard: StandardType) -> &[CustomTemplate] {
        self.custom.get(&standard).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Built-in templates followed by custom templates
    pub fn all_templates(&self, standard: StandardType) -> Vec<TemplateEntry> {
        let builtin = standard.templates().iter().enumerate().map(|(i, formula)| TemplateEntry {
            index: i,
            formula: formula.to_string(),
            description: format!("{} combination {}", standard.display_name(), i + 1),
            is_custom: false,
        });

        let offset = standard.templates().len();
        let custom = self
            .custom_templates(standard)
            .iter()
            .enumerate()
            .map(|(i, template)| TemplateEntry {
                index: offset + i,
                formula: template.formula.clone(),
                description: template.description.clone(),
                is_custom: true,
            });

        builtin.chain(custom).collect()
    }

    /// Write a standard's built-in and custom templates to a JSON file
    pub fn save_templates(&self, standard: StandardType, path: &Path) -> CalcResult<()> {
        let file = TemplateFile {
            schema_version: SCHEMA_VERSION.to_string(),
            standard,
            templates: self.all_templates(standard),
        };
        file_io::save_json(&file, path)?;
        info!(
            standard = standard.code(),
            custom = self.custom_templates(standard).len(),
            path = %path.display(),
            "Saved templates"
        );
        Ok(())
    }

    /// Append the custom templates of a template file to its standard.
    ///
    /// Built-in entries in the file are ignored. Each custom entry is
    /// validated with `parser` like [`StandardLibrary::add_custom_template`];
    /// invalid entries are skipped and listed in the returned report.
    ///
    /// # Errors
    ///
    /// File and JSON errors, and [`CalcError::VersionMismatch`] for a file
    /// written by an incompatible version.
    pub fn load_templates(&mut self, parser: &FormulaParser<'_>, path: &Path) -> CalcResult<TemplateImport> {
        let file: TemplateFile = file_io::load_json(path)?;
        validate_version(&file.schema_version)?;

        let mut import = TemplateImport {
            standard: file.standard,
            imported: 0,
            rejected: Vec::new(),
        };

        for entry in file.templates.into_iter().filter(|entry| entry.is_custom) {
            match self.add_custom_template(parser, file.standard, &entry.formula, entry.description) {
                Ok(_) => import.imported += 1,
                Err(e) => {
                    warn!(standard = file.standard.code(), formula = %entry.formula, error = %e, "Template rejected");
                    import.rejected.push(RejectedTemplate {
                        formula: entry.formula,
                        reason: e.reason(),
                    });
                }
            }
        }

        info!(
            standard = file.standard.code(),
            imported = import.imported,
            rejected = import.rejected.len(),
            "Loaded templates"
        );
        Ok(import)
    }
}

fn codes(load_types: &[LoadType]) -> String {
    load_types.iter().map(|lt| lt.code()).collect::<Vec<_>>().join(", ")
}
