//! # Solver Results
//!
//! Read-only view of an external linear-elastic solver's output: for each
//! load case, the response of every member to that load case alone.
//!
//! The analysis manager only ever borrows these results. A batch holds a
//! shared reference for its whole duration, so the data cannot change
//! while combinations are being evaluated.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::loads::LoadType;
//! use combo_core::solver::{InMemorySolverResults, LoadCaseResults, MemberResponse, SolverResults};
//!
//! let results = InMemorySolverResults::new()
//!     .with_case(
//!         LoadType::Dead,
//!         LoadCaseResults::new().with_member("B1", MemberResponse::new(10.0, 4.0, 0.0, 0.002)),
//!     );
//!
//! assert!(results.load_case(LoadType::Dead).is_some());
//! assert!(results.load_case(LoadType::Live).is_none());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::loads::LoadType;

/// Response quantities of one member under one load case
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberResponse {
    pub moment: f64,
    pub shear: f64,
    pub axial: f64,
    pub deflection: f64,
}

impl MemberResponse {
    pub fn new(moment: f64, shear: f64, axial: f64, deflection: f64) -> Self {
        MemberResponse {
            moment,
            shear,
            axial,
            deflection,
        }
    }

    /// Every quantity multiplied by a factor
    pub fn scaled(&self, factor: f64) -> Self {
        MemberResponse {
            moment: self.moment * factor,
            shear: self.shear * factor,
            axial: self.axial * factor,
            deflection: self.deflection * factor,
        }
    }

    /// Component-wise sum
    pub fn plus(&self, other: &MemberResponse) -> Self {
        MemberResponse {
            moment: self.moment + other.moment,
            shear: self.shear + other.shear,
            axial: self.axial + other.axial,
            deflection: self.deflection + other.deflection,
        }
    }

    /// Name of the first non-finite quantity, if any
    pub fn non_finite_quantity(&self) -> Option<&'static str> {
        [
            ("moment", self.moment),
            ("shear", self.shear),
            ("axial", self.axial),
            ("deflection", self.deflection),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }
}

/// Member responses of one load case, keyed by member id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadCaseResults {
    members: BTreeMap<String, MemberResponse>,
}

impl LoadCaseResults {
    pub fn new() -> Self {
        LoadCaseResults::default()
    }

    /// Add a member response (builder pattern)
    pub fn with_member(mut self, member: impl Into<String>, response: MemberResponse) -> Self {
        self.members.insert(member.into(), response);
        self
    }

    pub fn insert(&mut self, member: impl Into<String>, response: MemberResponse) {
        self.members.insert(member.into(), response);
    }

    pub fn get(&self, member: &str) -> Option<&MemberResponse> {
        self.members.get(member)
    }

    /// Members in id order
    pub fn members(&self) -> impl Iterator<Item = (&str, &MemberResponse)> {
        self.members.iter().map(|(id, response)| (id.as_str(), response))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Lookup of per-load-case results produced by an external solver.
///
/// Implementations must be shareable across the worker threads of a batch
/// analysis, hence the `Sync` bound.
pub trait SolverResults: Sync {
    /// Results of a single load case, or `None` if the solver did not run it
    fn load_case(&self, load_type: LoadType) -> Option<&LoadCaseResults>;
}

/// Solver results held in memory, e.g. loaded from a JSON file.
///
/// Serializes as an object keyed by load-type abbreviation:
///
/// ```json
/// { "DL": { "B1": { "moment": 10.0, "shear": 4.0, "axial": 0.0, "deflection": 0.002 } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemorySolverResults {
    cases: BTreeMap<LoadType, LoadCaseResults>,
}

impl InMemorySolverResults {
    pub fn new() -> Self {
        InMemorySolverResults::default()
    }

    /// Add a load case (builder pattern)
    pub fn with_case(mut self, load_type: LoadType, results: LoadCaseResults) -> Self {
        self.cases.insert(load_type, results);
        self
    }

    /// Add or replace a load case
    pub fn insert(&mut self, load_type: LoadType, results: LoadCaseResults) {
        self.cases.insert(load_type, results);
    }

    /// Load types with results, in standard order
    pub fn load_types(&self) -> Vec<LoadType> {
        self.cases.keys().copied().collect()
    }
}

impl SolverResults for InMemorySolverResults {
    fn load_case(&self, load_type: LoadType) -> Option<&LoadCaseResults> {
        self.cases.get(&load_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_and_add() {
        let a = MemberResponse::new(10.0, 2.0, -1.0, 0.01);
        let b = MemberResponse::new(5.0, 1.0, 1.0, 0.02);
        let combined = a.scaled(1.2).plus(&b.scaled(1.6));
        assert!((combined.moment - 20.0).abs() < 1e-12);
        assert!((combined.shear - 4.0).abs() < 1e-12);
        assert!((combined.axial - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_quantity() {
        assert_eq!(MemberResponse::new(1.0, 1.0, 1.0, 1.0).non_finite_quantity(), None);
        assert_eq!(
            MemberResponse::new(1.0, f64::NAN, 1.0, 1.0).non_finite_quantity(),
            Some("shear")
        );
        assert_eq!(
            MemberResponse::new(1.0, 1.0, 1.0, f64::INFINITY).non_finite_quantity(),
            Some("deflection")
        );
    }

    #[test]
    fn test_members_in_id_order() {
        let case = LoadCaseResults::new()
            .with_member("C2", MemberResponse::default())
            .with_member("B1", MemberResponse::default());
        let ids: Vec<&str> = case.members().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["B1", "C2"]);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "DL": { "B1": { "moment": 10.0, "shear": 4.0, "axial": 0.0, "deflection": 0.002 } },
            "LL": { "B1": { "moment": 5.0, "shear": 2.0, "axial": 0.0, "deflection": 0.001 } }
        }"#;
        let results: InMemorySolverResults = serde_json::from_str(json).unwrap();
        assert_eq!(results.load_types(), vec![LoadType::Dead, LoadType::Live]);
        let live = results.load_case(LoadType::Live).unwrap();
        assert_eq!(live.get("B1").unwrap().moment, 5.0);
        assert!(results.load_case(LoadType::Wind).is_none());
    }
}
