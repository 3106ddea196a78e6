//! # Interchange Documents
//!
//! Export and import of combination sets as JSON documents:
//!
//! ```json
//! {
//!   "project": "StructureTools Analysis",
//!   "date": "2026-03-01T12:00:00+00:00",
//!   "schema_version": "0.1.0",
//!   "analysis_summary": { "total_combinations": 1, "analyzed_combinations": 1 },
//!   "combinations": [
//!     {
//!       "name": "ACI318-2",
//!       "type": "ACI_318",
//!       "formula": "1.2DL + 1.6LL",
//!       "results": { "max_moment": 44.0, "max_shear": 9.2, "max_deflection": 0.044, "critical_member": "B1" }
//!     }
//!   ]
//! }
//! ```
//!
//! Imported documents are untrusted: every field is checked by path
//! (`combinations[3].results.max_moment`), unknown fields are ignored and
//! every formula is re-validated through the caller's parser.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::combination::LoadCombination;
//! use combo_core::combination_set::CombinationSet;
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::LoadTypeRegistry;
//! use combo_core::serializer;
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//!
//! let mut set = CombinationSet::new("Warehouse");
//! set.insert(LoadCombination::custom("C1", "1.2DL + 1.6LL", &parser).unwrap()).unwrap();
//!
//! let json = serializer::to_json(&serializer::export(&set, true, &[])).unwrap();
//! let imported = serializer::import(&json, &parser).unwrap();
//! assert_eq!(imported.set, set);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::combination::{AnalysisResult, LoadCombination};
use crate::combination_set::CombinationSet;
use crate::critical::Selection;
use crate::errors::{CalcError, CalcResult};
use crate::formula::FormulaParser;
use crate::standards::StandardType;

/// Current interchange schema version
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Summary counts of an exported set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_combinations: usize,
    /// Combinations holding a result at export time
    pub analyzed_combinations: usize,
}

/// One combination in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub standard: StandardType,
    /// Canonical formula text, empty for a draft
    pub formula: String,
    pub description: String,
    pub include_in_analysis: bool,
    pub allow_alternating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AnalysisResult>,
}

/// Winner of one criterion, as embedded in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalRecord {
    pub combination: String,
    pub value: f64,
    /// Max-moment member of the winner, for every criterion
    pub critical_member: String,
}

/// Exported document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub project: String,
    /// RFC 3339 generation timestamp
    pub date: String,
    pub schema_version: String,
    pub analysis_summary: AnalysisSummary,
    pub combinations: Vec<CombinationRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub critical_analysis: BTreeMap<String, CriticalRecord>,
}

/// Result of [`import`]
#[derive(Debug, Clone)]
pub struct ImportedDocument {
    pub project: String,
    pub date: DateTime<Utc>,
    pub schema_version: Option<String>,
    /// Combinations in document order, labelled with the project
    pub set: CombinationSet,
}

/// Build a document from a set.
///
/// Results are written only when `include_results` is set; the summary
/// always counts the analyzed combinations. `critical` selections are
/// embedded under `critical_analysis` keyed by criterion.
pub fn export(set: &CombinationSet, include_results: bool, critical: &[Selection]) -> ExportDocument {
    let combinations: Vec<CombinationRecord> = set
        .iter()
        .map(|combination| CombinationRecord {
            name: combination.name().to_string(),
            standard: combination.standard(),
            formula: combination.formula_text(),
            description: combination.description().to_string(),
            include_in_analysis: combination.include_in_analysis(),
            allow_alternating: combination.allow_alternating(),
            results: if include_results {
                combination.result().cloned()
            } else {
                None
            },
        })
        .collect();

    let critical_analysis = critical
        .iter()
        .map(|selection| {
            (
                selection.criterion.name().to_string(),
                CriticalRecord {
                    combination: selection.winner.clone(),
                    value: selection.value,
                    critical_member: selection.critical_member.clone(),
                },
            )
        })
        .collect();

    debug!(combinations = combinations.len(), include_results, "Exporting combination set");

    ExportDocument {
        project: set.meta.label.clone(),
        date: Utc::now().to_rfc3339(),
        schema_version: SCHEMA_VERSION.to_string(),
        analysis_summary: AnalysisSummary {
            total_combinations: set.len(),
            analyzed_combinations: set.analyzed_count(),
        },
        combinations,
        critical_analysis,
    }
}

/// Pretty-printed JSON text of a document
pub fn to_json(document: &ExportDocument) -> CalcResult<String> {
    serde_json::to_string_pretty(document).map_err(|e| CalcError::serialization(e.to_string()))
}

/// Parse and validate a document from JSON text.
///
/// # Errors
///
/// - [`CalcError::SerializationError`] for text that is not JSON
/// - [`CalcError::MissingField`] naming the path of a missing field
/// - [`CalcError::InvalidInput`] for a field of the wrong type or value
/// - [`CalcError::Parse`] / [`CalcError::Validation`] for a bad formula
/// - [`CalcError::DuplicateName`] for repeated combination names
/// - [`CalcError::VersionMismatch`] for an incompatible `schema_version`
pub fn import(text: &str, parser: &FormulaParser<'_>) -> CalcResult<ImportedDocument> {
    let value: Value = serde_json::from_str(text).map_err(|e| CalcError::serialization(e.to_string()))?;
    import_value(&value, parser)
}

/// Validate an already parsed JSON document
pub fn import_value(value: &Value, parser: &FormulaParser<'_>) -> CalcResult<ImportedDocument> {
    let root = value
        .as_object()
        .ok_or_else(|| CalcError::serialization("Document root must be a JSON object"))?;

    let schema_version = optional_str(root, "", "schema_version")?.map(str::to_string);
    if let Some(version) = &schema_version {
        validate_version(version)?;
    }

    let project = required_str(root, "", "project")?.to_string();
    let date_text = required_str(root, "", "date")?;
    let date = parse_date(date_text).ok_or_else(|| {
        CalcError::invalid_input("date", date_text, "Expected an RFC 3339 or ISO 8601 timestamp")
    })?;

    let summary = required_object(root, "", "analysis_summary")?;
    let total = required_usize(summary, "analysis_summary", "total_combinations")?;
    required_usize(summary, "analysis_summary", "analyzed_combinations")?;

    let records = required_field(root, "", "combinations")?
        .as_array()
        .ok_or_else(|| wrong_type("combinations", root.get("combinations"), "an array"))?;

    if total != records.len() {
        return Err(CalcError::invalid_input(
            "analysis_summary.total_combinations",
            total.to_string(),
            format!("Document holds {} combination records", records.len()),
        ));
    }

    let mut set = CombinationSet::new(project.clone());
    for (i, record) in records.iter().enumerate() {
        let path = format!("combinations[{}]", i);
        let record = record.as_object().ok_or_else(|| wrong_type(&path, Some(record), "an object"))?;
        set.insert(import_record(record, &path, parser)?)?;
    }

    info!(project = %project, combinations = set.len(), analyzed = set.analyzed_count(), "Imported combination document");

    Ok(ImportedDocument {
        project,
        date,
        schema_version,
        set,
    })
}

fn import_record(record: &Map<String, Value>, path: &str, parser: &FormulaParser<'_>) -> CalcResult<LoadCombination> {
    let name = required_str(record, path, "name")?;
    if name.trim().is_empty() {
        return Err(CalcError::invalid_input(join(path, "name"), name, "Combination name must not be empty"));
    }

    let type_code = required_str(record, path, "type")?;
    let standard = StandardType::from_code(type_code)
        .ok_or_else(|| CalcError::invalid_input(join(path, "type"), type_code, "Unrecognized design standard"))?;

    let formula_text = required_str(record, path, "formula")?;
    let description = optional_str(record, path, "description")?.unwrap_or_default();
    let include = optional_bool(record, path, "include_in_analysis")?.unwrap_or(true);
    let allow_alternating = optional_bool(record, path, "allow_alternating")?.unwrap_or(false);

    let results_path = join(path, "results");
    let result = match record.get("results") {
        None | Some(Value::Null) => None,
        Some(Value::Object(results)) => Some(import_result(results, &results_path)?),
        Some(other) => return Err(wrong_type(&results_path, Some(other), "an object")),
    };

    if formula_text.trim().is_empty() {
        if !standard.is_custom() {
            return Err(CalcError::invalid_input(
                join(path, "formula"),
                formula_text,
                format!("{} combinations require a formula", standard.display_name()),
            ));
        }
        if result.is_some() {
            return Err(CalcError::invalid_input(
                results_path,
                "object",
                "A combination without a formula cannot carry results",
            ));
        }
        let mut draft = LoadCombination::draft(name).with_description(description);
        draft.set_include_in_analysis(include);
        draft.set_allow_alternating(allow_alternating)?;
        return Ok(draft);
    }

    let formula = parser.allowing_alternating(allow_alternating).parse(formula_text)?;
    let allow_alternating = allow_alternating || formula.has_negative_factors();

    Ok(LoadCombination::from_parts(
        name.to_string(),
        standard,
        description.to_string(),
        formula,
        include,
        allow_alternating,
        result,
    ))
}

fn import_result(results: &Map<String, Value>, path: &str) -> CalcResult<AnalysisResult> {
    Ok(AnalysisResult {
        max_moment: required_f64(results, path, "max_moment")?,
        max_shear: required_f64(results, path, "max_shear")?,
        max_axial: optional_f64(results, path, "max_axial")?.unwrap_or(0.0),
        max_deflection: required_f64(results, path, "max_deflection")?,
        critical_member: required_str(results, path, "critical_member")?.to_string(),
        is_critical: optional_bool(results, path, "is_critical")?.unwrap_or(false),
    })
}

/// Validate that a document version is compatible with [`SCHEMA_VERSION`].
///
/// Major versions must match; within 0.x the file's minor version must not
/// be newer than ours.
pub fn validate_version(file_version: &str) -> CalcResult<()> {
    let mismatch = || CalcError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let file_parts: Vec<u32> = file_version.split('.').filter_map(|p| p.parse().ok()).collect();
    let current_parts: Vec<u32> = SCHEMA_VERSION.split('.').filter_map(|p| p.parse().ok()).collect();

    let (Some(file_major), Some(current_major)) = (file_parts.first(), current_parts.first()) else {
        return Err(mismatch());
    };
    if file_major != current_major {
        return Err(mismatch());
    }

    if *current_major == 0 {
        if let (Some(file_minor), Some(current_minor)) = (file_parts.get(1), current_parts.get(1)) {
            if file_minor > current_minor {
                return Err(mismatch());
            }
        }
    }

    Ok(())
}

/// RFC 3339, or a naive ISO 8601 timestamp taken as UTC
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| text.parse::<NaiveDateTime>().ok().map(|n| Utc.from_utc_datetime(&n)))
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn wrong_type(path: &str, value: Option<&Value>, expected: &str) -> CalcError {
    let shown = value.map(Value::to_string).unwrap_or_else(|| "null".to_string());
    CalcError::invalid_input(path, shown, format!("Expected {}", expected))
}

fn required_field<'v>(obj: &'v Map<String, Value>, path: &str, key: &str) -> CalcResult<&'v Value> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(CalcError::missing_field(join(path, key))),
        Some(value) => Ok(value),
    }
}

fn required_object<'v>(obj: &'v Map<String, Value>, path: &str, key: &str) -> CalcResult<&'v Map<String, Value>> {
    let value = required_field(obj, path, key)?;
    value.as_object().ok_or_else(|| wrong_type(&join(path, key), Some(value), "an object"))
}

fn required_str<'v>(obj: &'v Map<String, Value>, path: &str, key: &str) -> CalcResult<&'v str> {
    let value = required_field(obj, path, key)?;
    value.as_str().ok_or_else(|| wrong_type(&join(path, key), Some(value), "a string"))
}

fn required_usize(obj: &Map<String, Value>, path: &str, key: &str) -> CalcResult<usize> {
    let value = required_field(obj, path, key)?;
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| wrong_type(&join(path, key), Some(value), "a non-negative integer"))
}

fn required_f64(obj: &Map<String, Value>, path: &str, key: &str) -> CalcResult<f64> {
    let value = required_field(obj, path, key)?;
    value.as_f64().ok_or_else(|| wrong_type(&join(path, key), Some(value), "a number"))
}

fn optional_str<'v>(obj: &'v Map<String, Value>, path: &str, key: &str) -> CalcResult<Option<&'v str>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| wrong_type(&join(path, key), Some(value), "a string")),
    }
}

fn optional_bool(obj: &Map<String, Value>, path: &str, key: &str) -> CalcResult<Option<bool>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| wrong_type(&join(path, key), Some(value), "a boolean")),
    }
}

fn optional_f64(obj: &Map<String, Value>, path: &str, key: &str) -> CalcResult<Option<f64>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| wrong_type(&join(path, key), Some(value), "a number")),
    }
}
