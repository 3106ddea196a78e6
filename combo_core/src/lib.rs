//! # combo_core - Structural Load Combination Engine
//!
//! `combo_core` computes, validates and evaluates structural load
//! combinations: weighted sums of load cases (dead, live, wind, seismic,
//! snow, rain, construction) applied to the per-load-case results of an
//! external linear-elastic solver.
//!
//! ## Design Philosophy
//!
//! - **Explicit dependencies**: registries and template tables are built once and passed by reference
//! - **JSON-First**: data types implement Serialize, documents are plain JSON
//! - **Rich Errors**: one structured error type with machine-readable codes
//! - **Untrusted input**: imported formulas are always re-validated
//!
//! ## Quick Start
//!
//! ```rust
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::{LoadType, LoadTypeRegistry};
//! use combo_core::standards::{StandardLibrary, StandardType};
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//!
//! // Validate a user formula
//! let (ok, reason) = parser.validate("1.2DL + 1.6LL");
//! assert!(ok, "{}", reason);
//!
//! // Generate code combinations for the load cases the model defines
//! let report = StandardLibrary::builtin()
//!     .generate(&parser, StandardType::Aci318, &[LoadType::Dead, LoadType::Live])
//!     .unwrap();
//! assert_eq!(report.combinations.len(), 6);
//! ```
//!
//! ## Modules
//!
//! - [`loads`] - Load types and the load-type registry
//! - [`formula`] - Formula grammar, parser/validator and builder
//! - [`standards`] - ACI 318, AISC 360, Eurocode and IBC 2018 templates
//! - [`combination`] - The load combination entity and its lifecycle
//! - [`combination_set`] - Named, ordered collections of combinations
//! - [`solver`] - Interface to external per-load-case solver results
//! - [`analysis`] - Superposition and batch analysis
//! - [`critical`] - Critical combination selection
//! - [`serializer`] - Interchange document export/import
//! - [`file_io`] - Atomic saves and file locking
//! - [`settings`] - Engine configuration
//! - [`errors`] - Structured error types

pub mod analysis;
pub mod combination;
pub mod combination_set;
pub mod critical;
pub mod errors;
pub mod file_io;
pub mod formula;
pub mod loads;
pub mod serializer;
pub mod settings;
pub mod solver;
pub mod standards;

// Re-export commonly used types at crate root for convenience
pub use analysis::{BatchOutcome, BatchReport, CancelToken, CombinationAnalysisManager};
pub use combination::{AnalysisResult, CombinationState, LoadCombination};
pub use combination_set::CombinationSet;
pub use critical::{find_critical, Criterion, Selection};
pub use errors::{CalcError, CalcResult, FormulaIssue};
pub use formula::{Formula, FormulaParser};
pub use loads::{LoadType, LoadTypeRegistry};
pub use settings::EngineSettings;
pub use solver::{InMemorySolverResults, SolverResults};
pub use standards::{StandardLibrary, StandardType};
