//! Export/import of a mixed, partially analyzed set

use approx::assert_relative_eq;
use combo_core::analysis::{CancelToken, CombinationAnalysisManager};
use combo_core::combination::LoadCombination;
use combo_core::combination_set::CombinationSet;
use combo_core::critical::{find_all_critical, Criterion};
use combo_core::file_io::{load_document, save_document};
use combo_core::formula::FormulaParser;
use combo_core::loads::{LoadType, LoadTypeRegistry};
use combo_core::serializer;
use combo_core::solver::{InMemorySolverResults, LoadCaseResults, MemberResponse};
use combo_core::standards::{StandardLibrary, StandardType};
use tempfile::tempdir;

fn solver_results() -> InMemorySolverResults {
    let mut results = InMemorySolverResults::new();
    for (i, load_type) in LoadType::ALL.into_iter().enumerate() {
        let k = i as f64 + 1.0;
        let case = LoadCaseResults::new()
            .with_member("B1", MemberResponse::new(k / 3.0, k / 7.0, k.sqrt(), k / 1.1e4))
            .with_member("B2", MemberResponse::new(-k * 0.913, k / 9.0, -k / 11.0, k / 3.3e3))
            .with_member("C1", MemberResponse::new(k * 0.1, k * 1.7, k * 13.0, k / 9.7e4));
        results.insert(load_type, case);
    }
    results
}

/// 25 standard, 23 custom and 2 draft combinations
fn mixed_set(parser: &FormulaParser<'_>) -> CombinationSet {
    let library = StandardLibrary::builtin();
    let mut set = CombinationSet::new("Round trip");

    for standard in StandardType::BUILTIN {
        let report = library.generate(parser, standard, &LoadType::ALL).unwrap();
        set.extend(report.combinations).unwrap();
    }

    for i in 0..23 {
        let formula = match i % 3 {
            0 => format!("1.{}DL + 0.{}LL", i % 10, i % 9 + 1),
            1 => format!("0.9DL + 1.{}WL + 0.5(SL or RL)", i % 10),
            _ => format!("1.2*DL + 0.{}*EQ + 0.25CL", i % 9 + 1),
        };
        let mut combo = LoadCombination::custom(format!("USER-{:02}", i), &formula, parser)
            .unwrap()
            .with_description(format!("User combination {}", i));
        if i % 4 == 0 {
            combo.set_include_in_analysis(false);
        }
        set.insert(combo).unwrap();
    }

    set.insert(LoadCombination::draft("DRAFT-A")).unwrap();
    set.insert(LoadCombination::draft("DRAFT-B").with_description("Waiting on roof loads")).unwrap();
    set
}

#[test]
fn test_fifty_combinations_round_trip() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let mut set = mixed_set(&parser);
    assert_eq!(set.len(), 50);

    let report = CombinationAnalysisManager::default()
        .with_workers(4)
        .run_batch(&mut set, &solver_results(), &CancelToken::new());
    assert_eq!(report.failed_count(), 2, "only the drafts fail");
    assert!(set.analyzed_count() > 0);
    assert!(set.analyzed_count() < set.len());

    let selections = find_all_critical(&set, &Criterion::ALL).unwrap();
    set.apply_selection(&selections[0]).unwrap();

    let document = serializer::export(&set, true, &selections);
    assert_eq!(document.critical_analysis.len(), 4);
    let text = serializer::to_json(&document).unwrap();
    let imported = serializer::import(&text, &parser).unwrap();

    assert_eq!(imported.set.names(), set.names());
    for (original, restored) in set.iter().zip(imported.set.iter()) {
        assert_eq!(original.name(), restored.name());
        assert_eq!(original.standard(), restored.standard());
        assert_eq!(original.formula_text(), restored.formula_text());
        assert_eq!(original.formula(), restored.formula());
        assert_eq!(original.description(), restored.description());
        assert_eq!(original.include_in_analysis(), restored.include_in_analysis());
        assert_eq!(original.state(), restored.state());

        match (original.result(), restored.result()) {
            (Some(a), Some(b)) => {
                assert_relative_eq!(a.max_moment, b.max_moment, epsilon = 1e-9);
                assert_relative_eq!(a.max_shear, b.max_shear, epsilon = 1e-9);
                assert_relative_eq!(a.max_axial, b.max_axial, epsilon = 1e-9);
                assert_relative_eq!(a.max_deflection, b.max_deflection, epsilon = 1e-9);
                assert_eq!(a.critical_member, b.critical_member);
                assert_eq!(a.is_critical, b.is_critical);
            }
            (None, None) => {}
            (a, b) => panic!("result presence differs for {}: {:?} vs {:?}", original.name(), a, b),
        }
    }

    // Exporting the imported set again gives the same records
    let again = serializer::export(&imported.set, true, &selections);
    assert_eq!(again.combinations, document.combinations);
    assert_eq!(again.analysis_summary, document.analysis_summary);
}

#[test]
fn test_round_trip_through_file() {
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry);
    let mut set = mixed_set(&parser);
    CombinationAnalysisManager::default().run_batch(&mut set, &solver_results(), &CancelToken::new());

    let dir = tempdir().unwrap();
    let path = dir.path().join("combinations.json");
    save_document(&serializer::export(&set, true, &[]), &path).unwrap();

    let loaded = load_document(&path, &parser).unwrap();
    assert_eq!(loaded.project, "Round trip");
    assert_eq!(loaded.set, set);
}

#[test]
fn test_restricted_registry_rejects_foreign_formulas() {
    let full = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&full);
    let set = mixed_set(&parser);
    let text = serializer::to_json(&serializer::export(&set, false, &[])).unwrap();

    let gravity_only = LoadTypeRegistry::with_types(&[LoadType::Dead, LoadType::Live]);
    let restricted = FormulaParser::new(&gravity_only);
    let err = serializer::import(&text, &restricted).unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}
