//! # Combination Analysis
//!
//! Evaluates combinations against per-load-case solver results by linear
//! superposition:
//!
//! ```text
//! response(member) = Σ factor_i × response_i(member)
//! ```
//!
//! Superposition is only valid because the external solver is
//! linear-elastic. This module assumes that precondition; it does not check
//! it and cannot detect a nonlinear solver.
//!
//! The envelope stored on a combination is the maximum absolute value of
//! each quantity over all members, plus the member with the largest
//! absolute moment.
//!
//! ## Batches
//!
//! [`CombinationAnalysisManager::run_batch`] evaluates every included
//! combination of a set on a bounded pool of scoped worker threads. Workers
//! only see cloned formulas and the shared, read-only solver results.
//! Outcomes are sent back to the calling thread, which alone writes results
//! into the set, so a reader can never observe a half-written result. One
//! combination failing never aborts the others.
//!
//! ## Example
//!
//! ```rust
//! use combo_core::analysis::CombinationAnalysisManager;
//! use combo_core::combination::LoadCombination;
//! use combo_core::formula::FormulaParser;
//! use combo_core::loads::{LoadType, LoadTypeRegistry};
//! use combo_core::solver::{InMemorySolverResults, LoadCaseResults, MemberResponse};
//!
//! let registry = LoadTypeRegistry::standard();
//! let parser = FormulaParser::new(&registry);
//! let mut combo = LoadCombination::custom("C1", "1.2DL + 1.6LL", &parser).unwrap();
//!
//! let solver = InMemorySolverResults::new()
//!     .with_case(LoadType::Dead, LoadCaseResults::new().with_member("B1", MemberResponse::new(10.0, 0.0, 0.0, 0.0)))
//!     .with_case(LoadType::Live, LoadCaseResults::new().with_member("B1", MemberResponse::new(5.0, 0.0, 0.0, 0.0)));
//!
//! let manager = CombinationAnalysisManager::default();
//! let (ok, message) = manager.run_combination_analysis(&mut combo, &solver);
//! assert!(ok, "{}", message);
//! assert!((combo.result().unwrap().max_moment - 20.0).abs() < 1e-9);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::combination::{AnalysisResult, LoadCombination};
use crate::combination_set::CombinationSet;
use crate::errors::{CalcError, CalcResult};
use crate::formula::Formula;
use crate::loads::LoadType;
use crate::settings::EngineSettings;
use crate::solver::{LoadCaseResults, MemberResponse, SolverResults};

/// Cooperative stop signal for a batch.
///
/// Cancelling stops workers from picking up new combinations; analyses
/// already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one combination in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BatchOutcome {
    Analyzed(AnalysisResult),
    Failed(CalcError),
    /// Not started because the batch was cancelled
    Cancelled,
}

/// Per-combination entry of a [`BatchReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub name: String,
    pub outcome: BatchOutcome,
}

/// Result of [`CombinationAnalysisManager::run_batch`]
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Correlates the report with the batch's log span
    pub run_id: Uuid,
    /// Included combinations, in set order
    pub items: Vec<BatchItem>,
    /// Combinations with `include_in_analysis == false`
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn analyzed_count(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Analyzed(_)))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed(_)))
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Cancelled))
    }

    /// Failed combinations and their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &CalcError)> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchOutcome::Failed(e) => Some((item.name.as_str(), e)),
            _ => None,
        })
    }

    pub fn outcome(&self, name: &str) -> Option<&BatchOutcome> {
        self.items.iter().find(|item| item.name == name).map(|item| &item.outcome)
    }

    fn count(&self, predicate: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| predicate(&item.outcome)).count()
    }
}

/// Snapshot of one combination handed to a worker
struct Job {
    position: usize,
    name: String,
    formula: Option<Formula>,
}

/// Runs combinations against solver results.
#[derive(Debug, Clone)]
pub struct CombinationAnalysisManager {
    alternative_branch: usize,
    batch_workers: usize,
}

impl Default for CombinationAnalysisManager {
    fn default() -> Self {
        CombinationAnalysisManager::new(&EngineSettings::default())
    }
}

impl CombinationAnalysisManager {
    pub fn new(settings: &EngineSettings) -> Self {
        CombinationAnalysisManager {
            alternative_branch: settings.alternative_branch,
            batch_workers: settings.batch_workers.max(1),
        }
    }

    /// Set the worker count (builder pattern, minimum 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.batch_workers = workers.max(1);
        self
    }

    /// Set the compound-term branch (builder pattern)
    pub fn with_alternative_branch(mut self, branch: usize) -> Self {
        self.alternative_branch = branch;
        self
    }

    pub fn batch_workers(&self) -> usize {
        self.batch_workers
    }

    /// Analyze one combination, returning `(success, message)`.
    ///
    /// On failure the combination holds no result.
    pub fn run_combination_analysis<S>(&self, combination: &mut LoadCombination, solver: &S) -> (bool, String)
    where
        S: SolverResults + ?Sized,
    {
        match self.analyze(combination, solver) {
            Ok(result) => (
                true,
                format!(
                    "Analysis completed: max moment {:.3} at member {}",
                    result.max_moment, result.critical_member
                ),
            ),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Analyze one combination and store the result on it.
    ///
    /// A failure clears any previous result, leaving the combination
    /// `Formulated`.
    pub fn analyze<'c, S>(&self, combination: &'c mut LoadCombination, solver: &S) -> CalcResult<&'c AnalysisResult>
    where
        S: SolverResults + ?Sized,
    {
        let outcome = match combination.formula() {
            Some(formula) => self.superpose(combination.name(), formula, solver),
            None => Err(CalcError::NotFormulated {
                combination: combination.name().to_string(),
            }),
        };

        match outcome {
            Ok(result) => {
                debug!(combination = combination.name(), max_moment = result.max_moment, "Combination analyzed");
                Ok(combination.set_result(result))
            }
            Err(e) => {
                warn!(combination = combination.name(), error = %e, "Combination analysis failed");
                combination.clear_result();
                Err(e)
            }
        }
    }

    /// Superpose the formula's load cases and compute the envelope.
    ///
    /// Pure: reads only the formula and the solver results.
    pub fn superpose<S>(&self, name: &str, formula: &Formula, solver: &S) -> CalcResult<AnalysisResult>
    where
        S: SolverResults + ?Sized,
    {
        // Resolve every term before touching numbers so a missing case is
        // reported regardless of member data
        let mut cases: Vec<(f64, LoadType, &LoadCaseResults)> = Vec::with_capacity(formula.len());
        for term in formula.terms() {
            let load_type = term.resolve(self.alternative_branch).ok_or_else(|| {
                CalcError::invalid_input(
                    "alternative_branch",
                    self.alternative_branch.to_string(),
                    format!("Term '{}' of combination '{}' has fewer alternatives", term, name),
                )
            })?;
            let case = solver
                .load_case(load_type)
                .ok_or_else(|| CalcError::missing_load_case(name, load_type.code()))?;
            if case.is_empty() {
                return Err(CalcError::invalid_solver_data(
                    name,
                    load_type.code(),
                    "",
                    "Load case has no member results",
                ));
            }
            cases.push((term.factor, load_type, case));
        }

        let Some(&(_, reference_type, reference)) = cases.first() else {
            return Err(CalcError::NotFormulated {
                combination: name.to_string(),
            });
        };

        for &(_, load_type, case) in &cases[1..] {
            check_same_members(name, (reference_type, reference), (load_type, case))?;
        }

        let mut envelope = Envelope::default();
        for (member, _) in reference.members() {
            let mut combined = MemberResponse::default();
            for &(factor, load_type, case) in &cases {
                let response = case.get(member).ok_or_else(|| {
                    CalcError::invalid_solver_data(name, load_type.code(), member, "Member missing from load case")
                })?;
                if let Some(quantity) = response.non_finite_quantity() {
                    return Err(CalcError::invalid_solver_data(
                        name,
                        load_type.code(),
                        member,
                        format!("Non-finite {} value", quantity),
                    ));
                }
                combined = combined.plus(&response.scaled(factor));
            }
            if let Some(quantity) = combined.non_finite_quantity() {
                return Err(CalcError::invalid_solver_data(
                    name,
                    reference_type.code(),
                    member,
                    format!("Superposed {} overflowed", quantity),
                ));
            }
            envelope.include(member, &combined);
        }

        Ok(envelope.into_result())
    }

    /// Analyze every included combination of a set.
    ///
    /// Never fails as a whole: each combination's outcome is reported
    /// individually. Combinations that fail lose any previous result;
    /// cancelled ones are left untouched.
    pub fn run_batch<S>(&self, set: &mut CombinationSet, solver: &S, cancel: &CancelToken) -> BatchReport
    where
        S: SolverResults + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch_analysis", %run_id);
        let _entered = span.enter();

        let mut skipped = Vec::new();
        let mut jobs = Vec::new();
        for (position, combination) in set.iter().enumerate() {
            if combination.include_in_analysis() {
                jobs.push(Job {
                    position,
                    name: combination.name().to_string(),
                    formula: combination.formula().cloned(),
                });
            } else {
                skipped.push(combination.name().to_string());
            }
        }

        let workers = self.batch_workers.min(jobs.len()).max(1);
        info!(combinations = jobs.len(), skipped = skipped.len(), workers, "Starting batch analysis");

        let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; jobs.len()];
        let next_job = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, CalcResult<AnalysisResult>)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let jobs = &jobs;
                let next_job = &next_job;
                let span = span.clone();
                scope.spawn(move || {
                    let _entered = span.enter();
                    while !cancel.is_cancelled() {
                        let slot = next_job.fetch_add(1, Ordering::SeqCst);
                        let Some(job) = jobs.get(slot) else {
                            break;
                        };
                        let outcome = match &job.formula {
                            Some(formula) => self.superpose(&job.name, formula, solver),
                            None => Err(CalcError::NotFormulated {
                                combination: job.name.clone(),
                            }),
                        };
                        if tx.send((slot, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            // Results are written here, on the calling thread only
            for (slot, outcome) in rx {
                let job = &jobs[slot];
                let Some(combination) = set.get_index_mut(job.position) else {
                    continue;
                };
                outcomes[slot] = Some(match outcome {
                    Ok(result) => {
                        debug!(combination = %job.name, max_moment = result.max_moment, "Combination analyzed");
                        combination.set_result(result.clone());
                        BatchOutcome::Analyzed(result)
                    }
                    Err(e) => {
                        warn!(combination = %job.name, error = %e, "Combination analysis failed");
                        combination.clear_result();
                        BatchOutcome::Failed(e)
                    }
                });
            }
        });

        if !jobs.is_empty() {
            set.touch();
        }

        let items: Vec<BatchItem> = jobs
            .into_iter()
            .zip(outcomes)
            .map(|(job, outcome)| BatchItem {
                name: job.name,
                outcome: outcome.unwrap_or(BatchOutcome::Cancelled),
            })
            .collect();

        let report = BatchReport { run_id, items, skipped };
        info!(
            analyzed = report.analyzed_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            "Batch analysis finished"
        );
        report
    }
}

fn check_same_members(
    combination: &str,
    (reference_type, reference): (LoadType, &LoadCaseResults),
    (load_type, case): (LoadType, &LoadCaseResults),
) -> CalcResult<()> {
    if let Some((member, _)) = reference.members().find(|(member, _)| case.get(member).is_none()) {
        return Err(CalcError::invalid_solver_data(
            combination,
            load_type.code(),
            member,
            format!("Member present in {} but missing from this load case", reference_type.code()),
        ));
    }
    if let Some((member, _)) = case.members().find(|(member, _)| reference.get(member).is_none()) {
        return Err(CalcError::invalid_solver_data(
            combination,
            reference_type.code(),
            member,
            format!("Member present in {} but missing from this load case", load_type.code()),
        ));
    }
    Ok(())
}

/// Running absolute maxima over members
#[derive(Default)]
struct Envelope {
    max_moment: f64,
    max_shear: f64,
    max_axial: f64,
    max_deflection: f64,
    critical_member: Option<String>,
}

impl Envelope {
    fn include(&mut self, member: &str, response: &MemberResponse) {
        let moment = response.moment.abs();
        // Members arrive in id order; strict comparison keeps the first id on ties
        if self.critical_member.is_none() || moment > self.max_moment {
            self.max_moment = moment;
            self.critical_member = Some(member.to_string());
        }
        self.max_shear = self.max_shear.max(response.shear.abs());
        self.max_axial = self.max_axial.max(response.axial.abs());
        self.max_deflection = self.max_deflection.max(response.deflection.abs());
    }

    fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            max_moment: self.max_moment,
            max_shear: self.max_shear,
            max_axial: self.max_axial,
            max_deflection: self.max_deflection,
            critical_member: self.critical_member.unwrap_or_default(),
            is_critical: false,
        }
    }
}
