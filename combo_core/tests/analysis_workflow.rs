//! End-to-end analysis: generation, superposition, batches and selection

use approx::assert_relative_eq;
use combo_core::analysis::{BatchOutcome, CancelToken, CombinationAnalysisManager};
use combo_core::combination::{CombinationState, LoadCombination};
use combo_core::combination_set::CombinationSet;
use combo_core::critical::{find_critical, mark_critical, Criterion};
use combo_core::errors::CalcError;
use combo_core::formula::FormulaParser;
use combo_core::loads::{LoadType, LoadTypeRegistry};
use combo_core::solver::{InMemorySolverResults, LoadCaseResults, MemberResponse};
use combo_core::standards::{StandardLibrary, StandardType};

fn single_member_case(moment: f64, shear: f64, axial: f64, deflection: f64) -> LoadCaseResults {
    LoadCaseResults::new().with_member("M1", MemberResponse::new(moment, shear, axial, deflection))
}

fn frame_results() -> InMemorySolverResults {
    let case = |scale: f64| {
        LoadCaseResults::new()
            .with_member("B1", MemberResponse::new(12.0 * scale, 4.0 * scale, 1.5 * scale, 0.003 * scale))
            .with_member("B2", MemberResponse::new(-18.0 * scale, 6.0 * scale, -2.0 * scale, 0.001 * scale))
            .with_member("C1", MemberResponse::new(3.0 * scale, 1.0 * scale, 40.0 * scale, 0.0005 * scale))
    };
    InMemorySolverResults::new()
        .with_case(LoadType::Dead, case(1.0))
        .with_case(LoadType::Live, case(0.8))
        .with_case(LoadType::Wind, case(0.35))
        .with_case(LoadType::Seismic, case(0.5))
}

#[test]
fn test_superposition_is_linear() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let manager = CombinationAnalysisManager::default();

    for (dl, ll) in [(12.5, 7.25), (-3.0, 10.0), (0.0, 1.0e6), (1.0e-3, -4.5)] {
        let solver = InMemorySolverResults::new()
            .with_case(LoadType::Dead, single_member_case(dl, dl / 2.0, dl * 3.0, dl / 100.0))
            .with_case(LoadType::Live, single_member_case(ll, ll / 2.0, ll * 3.0, ll / 100.0));

        let mut combo = LoadCombination::custom("ULS", "1.2DL + 1.6LL", &parser).unwrap();
        let result = manager.analyze(&mut combo, &solver).unwrap();

        let expected = 1.2 * dl + 1.6 * ll;
        assert_relative_eq!(result.max_moment, expected.abs(), epsilon = 1e-9, max_relative = 1e-12);
        assert_relative_eq!(result.max_shear, (expected / 2.0).abs(), epsilon = 1e-9, max_relative = 1e-12);
        assert_relative_eq!(result.max_axial, (expected * 3.0).abs(), epsilon = 1e-9, max_relative = 1e-12);
        assert_relative_eq!(result.max_deflection, (expected / 100.0).abs(), epsilon = 1e-9, max_relative = 1e-12);
        assert_eq!(result.critical_member, "M1");
    }
}

#[test]
fn test_missing_load_case_keeps_combination_formulated() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let solver = InMemorySolverResults::new().with_case(LoadType::Dead, single_member_case(10.0, 1.0, 1.0, 0.01));

    let mut combo = LoadCombination::custom("ULS", "1.2DL + 1.6LL", &parser).unwrap();
    let err = CombinationAnalysisManager::default()
        .analyze(&mut combo, &solver)
        .unwrap_err();

    match err {
        CalcError::MissingLoadCase { load_type, combination } => {
            assert_eq!(load_type, "LL");
            assert_eq!(combination, "ULS");
        }
        other => panic!("expected missing load case, got {:?}", other),
    }
    assert_eq!(combo.state(), CombinationState::Formulated);
    assert!(combo.result().is_none());
}

#[test]
fn test_batch_isolates_one_failure_among_three() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let solver = InMemorySolverResults::new()
        .with_case(LoadType::Dead, single_member_case(10.0, 2.0, 1.0, 0.01))
        .with_case(LoadType::Live, single_member_case(5.0, 1.0, 0.5, 0.02));

    let mut set = CombinationSet::new("Isolation");
    set.insert(LoadCombination::custom("A", "1.4DL", &parser).unwrap()).unwrap();
    set.insert(LoadCombination::custom("B", "1.2DL + 1.6SL", &parser).unwrap()).unwrap();
    set.insert(LoadCombination::custom("C", "1.2DL + 1.6LL", &parser).unwrap()).unwrap();

    let report = CombinationAnalysisManager::default()
        .with_workers(2)
        .run_batch(&mut set, &solver, &CancelToken::new());

    assert_eq!(report.analyzed_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert!(matches!(
        report.outcome("B"),
        Some(BatchOutcome::Failed(CalcError::MissingLoadCase { .. }))
    ));
    assert_relative_eq!(set.get("A").unwrap().result().unwrap().max_moment, 14.0, epsilon = 1e-9);
    assert_relative_eq!(set.get("C").unwrap().result().unwrap().max_moment, 20.0, epsilon = 1e-9);
    assert_eq!(set.get("B").unwrap().state(), CombinationState::Formulated);
}

#[test]
fn test_tie_broken_by_smaller_name() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let solver = frame_results();

    let mut set = CombinationSet::new("Ties");
    // Identical formulas give bit-identical maxima
    set.insert(LoadCombination::custom("Beta", "1.2DL + 1.6LL", &parser).unwrap()).unwrap();
    set.insert(LoadCombination::custom("Alpha", "1.2DL + 1.6LL", &parser).unwrap()).unwrap();
    set.insert(LoadCombination::custom("Gamma", "0.9DL", &parser).unwrap()).unwrap();

    CombinationAnalysisManager::default().run_batch(&mut set, &solver, &CancelToken::new());
    assert_eq!(
        set.get("Alpha").unwrap().result().unwrap().max_moment,
        set.get("Beta").unwrap().result().unwrap().max_moment
    );

    let selection = find_critical(&set, Criterion::Moment).unwrap();
    assert_eq!(selection.winner, "Alpha");
    assert_eq!(selection.candidates, 3);

    mark_critical(&mut set, Criterion::Moment).unwrap();
    assert_eq!(set.critical_names(), vec!["Alpha"]);
    assert_eq!(set.get("Alpha").unwrap().state(), CombinationState::Critical);
    assert_eq!(set.get("Beta").unwrap().state(), CombinationState::Analyzed);
}

#[test]
fn test_aci_318_generation_and_analysis() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let available = [LoadType::Dead, LoadType::Live, LoadType::Wind, LoadType::Seismic];

    let report = StandardLibrary::builtin()
        .generate(&parser, StandardType::Aci318, &available)
        .unwrap();
    let expected = [
        "1.0DL + 1.0LL",
        "1.2DL + 1.6LL",
        "1.2DL + 1.0LL + 1.0WL",
        "1.2DL + 1.0LL + 1.0EQ",
        "0.9DL + 1.0WL",
        "0.9DL + 1.0EQ",
    ];
    assert_eq!(report.combinations.len(), expected.len());
    for (combo, formula) in report.combinations.iter().zip(expected) {
        assert_eq!(combo.formula_text(), formula);
        assert!(parser.validate(&combo.formula_text()).0);
    }

    let mut set = CombinationSet::new("ACI");
    set.extend(report.combinations).unwrap();
    let report = CombinationAnalysisManager::default().run_batch(&mut set, &frame_results(), &CancelToken::new());
    assert_eq!(report.analyzed_count(), 6);

    // Load cases scale together, so the largest factor sum governs:
    // ACI318-4 = 1.2 + 1.0*0.8 + 1.0*0.5 = 2.5
    let moment = find_critical(&set, Criterion::Moment).unwrap();
    assert_eq!(moment.winner, "ACI318-4");
    assert_relative_eq!(moment.value, 45.0, epsilon = 1e-9);
    assert_eq!(moment.critical_member, "B2");

    let axial = find_critical(&set, Criterion::Axial).unwrap();
    assert_eq!(axial.winner, "ACI318-4");
    assert_relative_eq!(axial.value, 100.0, epsilon = 1e-9);

    // Standard formulas are read-only
    let err = set
        .get_mut("ACI318-1")
        .unwrap()
        .set_formula("1.4DL", &parser)
        .unwrap_err();
    assert_eq!(err.error_code(), "READ_ONLY_FORMULA");
}

#[test]
fn test_excluded_combinations_are_skipped() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);

    let mut set = CombinationSet::new("Skip");
    set.insert(LoadCombination::custom("On", "1.4DL", &parser).unwrap()).unwrap();
    let mut off = LoadCombination::custom("Off", "1.2DL + 1.6LL", &parser).unwrap();
    off.set_include_in_analysis(false);
    set.insert(off).unwrap();

    let report = CombinationAnalysisManager::default().run_batch(&mut set, &frame_results(), &CancelToken::new());
    assert_eq!(report.skipped, vec!["Off".to_string()]);
    assert_eq!(report.items.len(), 1);
    assert!(set.get("Off").unwrap().result().is_none());
}
