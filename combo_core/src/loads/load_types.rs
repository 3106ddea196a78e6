//! Load type vocabulary
//!
//! This module defines the closed set of load categories that may appear in a
//! combination formula, and the [`LoadTypeRegistry`] the formula parser
//! resolves abbreviations against.

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};

/// Load categories recognized in combination formulas
///
/// Each load type has a two-letter abbreviation used in formula text
/// (`1.2DL + 1.6LL`). Abbreviations are case-sensitive.
///
/// # Example
/// ```
/// use combo_core::loads::LoadType;
///
/// let dead = LoadType::Dead;
/// assert_eq!(dead.code(), "DL");
/// assert_eq!(dead.description(), "Dead load");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadType {
    /// DL - Dead load (self-weight of structure and permanent attachments)
    #[serde(rename = "DL")]
    Dead,
    /// LL - Live load (floor live load, occupancy)
    #[serde(rename = "LL")]
    Live,
    /// WL - Wind load
    #[serde(rename = "WL")]
    Wind,
    /// EQ - Seismic (earthquake) load
    #[serde(rename = "EQ")]
    Seismic,
    /// SL - Snow load
    #[serde(rename = "SL")]
    Snow,
    /// RL - Rain / roof live load
    #[serde(rename = "RL")]
    Rain,
    /// CL - Construction load
    #[serde(rename = "CL")]
    Construction,
    /// TL - Temperature and other self-straining effects
    #[serde(rename = "TL")]
    Temperature,
}

impl LoadType {
    /// All load types in standard order
    pub const ALL: [LoadType; 8] = [
        LoadType::Dead,
        LoadType::Live,
        LoadType::Wind,
        LoadType::Seismic,
        LoadType::Snow,
        LoadType::Rain,
        LoadType::Construction,
        LoadType::Temperature,
    ];

    /// Standard abbreviation code (DL, LL, WL, EQ, SL, RL, CL, TL)
    ///
    /// # Example
    /// ```
    /// use combo_core::loads::LoadType;
    /// assert_eq!(LoadType::Seismic.code(), "EQ");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            LoadType::Dead => "DL",
            LoadType::Live => "LL",
            LoadType::Wind => "WL",
            LoadType::Seismic => "EQ",
            LoadType::Snow => "SL",
            LoadType::Rain => "RL",
            LoadType::Construction => "CL",
            LoadType::Temperature => "TL",
        }
    }

    /// Look up a load type by its exact abbreviation
    pub fn from_code(code: &str) -> Option<LoadType> {
        LoadType::ALL.iter().copied().find(|lt| lt.code() == code)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            LoadType::Dead => "Dead load",
            LoadType::Live => "Live load",
            LoadType::Wind => "Wind load",
            LoadType::Seismic => "Seismic load",
            LoadType::Snow => "Snow load",
            LoadType::Rain => "Rain load",
            LoadType::Construction => "Construction load",
            LoadType::Temperature => "Temperature load",
        }
    }

    /// Whether this load type can act in multiple directions (requires +/- consideration)
    pub fn is_directional(&self) -> bool {
        matches!(self, LoadType::Wind | LoadType::Seismic)
    }

    /// Whether this load type is a gravity load (acts downward)
    pub fn is_gravity(&self) -> bool {
        matches!(
            self,
            LoadType::Dead | LoadType::Live | LoadType::Snow | LoadType::Rain | LoadType::Construction
        )
    }

    /// Whether this load type is a lateral load
    pub fn is_lateral(&self) -> bool {
        matches!(self, LoadType::Wind | LoadType::Seismic)
    }
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for LoadType {
    type Err = CalcError;

    fn from_str(s: &str) -> CalcResult<Self> {
        LoadType::from_code(s.trim()).ok_or_else(|| {
            CalcError::invalid_input("load_type", s, "Unrecognized load type abbreviation")
        })
    }
}

/// The vocabulary of load types a parser accepts.
///
/// Constructed once and passed by shared reference into the components that
/// need it. A restricted registry can be built for isolated tests or for
/// projects that only define some load cases.
///
/// # Example
/// ```
/// use combo_core::loads::{LoadType, LoadTypeRegistry};
///
/// let registry = LoadTypeRegistry::standard();
/// assert_eq!(registry.lookup("WL"), Some(LoadType::Wind));
/// assert_eq!(registry.lookup("wl"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTypeRegistry {
    types: Vec<LoadType>,
}

impl LoadTypeRegistry {
    /// Registry containing every load type
    pub fn standard() -> Self {
        LoadTypeRegistry {
            types: LoadType::ALL.to_vec(),
        }
    }

    /// Registry restricted to the given load types (duplicates ignored)
    pub fn with_types(types: &[LoadType]) -> Self {
        let mut unique: Vec<LoadType> = Vec::with_capacity(types.len());
        for lt in types {
            if !unique.contains(lt) {
                unique.push(*lt);
            }
        }
        LoadTypeRegistry { types: unique }
    }

    /// Resolve an abbreviation (case-sensitive)
    pub fn lookup(&self, abbreviation: &str) -> Option<LoadType> {
        self.types.iter().copied().find(|lt| lt.code() == abbreviation)
    }

    /// Whether a load type is part of this vocabulary
    pub fn contains(&self, load_type: LoadType) -> bool {
        self.types.contains(&load_type)
    }

    /// Load types in registry order
    pub fn types(&self) -> &[LoadType] {
        &self.types
    }

    /// Abbreviations in registry order, for help text and error messages
    pub fn abbreviations(&self) -> Vec<&'static str> {
        self.types.iter().map(|lt| lt.code()).collect()
    }
}

impl Default for LoadTypeRegistry {
    fn default() -> Self {
        LoadTypeRegistry::standard()
    }
}
