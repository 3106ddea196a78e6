//! End-to-end tests of the `combo` binary.
//!
//! Each test runs the built binary as a subprocess inside its own temporary
//! directory and checks exit status, printed output and the files written.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use combo_core::formula::FormulaParser;
use combo_core::loads::{LoadType, LoadTypeRegistry};
use combo_core::serializer;
use combo_core::solver::{InMemorySolverResults, LoadCaseResults, MemberResponse};

fn combo_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_combo"))
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(combo_bin())
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run combo")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_solver_results(path: &Path) {
    let results = InMemorySolverResults::new()
        .with_case(
            LoadType::Dead,
            LoadCaseResults::new()
                .with_member("B1", MemberResponse::new(10.0, 4.0, 20.0, 0.002))
                .with_member("B2", MemberResponse::new(-6.0, 3.0, 10.0, 0.001)),
        )
        .with_case(
            LoadType::Live,
            LoadCaseResults::new()
                .with_member("B1", MemberResponse::new(5.0, 8.0, 10.0, 0.004))
                .with_member("B2", MemberResponse::new(-2.0, 1.0, 5.0, 0.001)),
        );
    std::fs::write(path, serde_json::to_string_pretty(&results).unwrap()).unwrap();
}

#[test]
fn test_validate_reports_canonical_formula() {
    let dir = tempfile::tempdir().unwrap();

    let ok = run(dir.path(), &["validate", "1.2*DL+1.6LL"]);
    assert!(ok.status.success(), "stderr: {}", stderr(&ok));
    assert!(stdout(&ok).contains("valid: 1.2DL + 1.6LL"));

    let bad = run(dir.path(), &["validate", "1.2DL + 1.0DL"]);
    assert!(!bad.status.success());
    assert!(stderr(&bad).contains("invalid formula"));
}

#[test]
fn test_config_enables_alternating_terms() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("settings.json"), r#"{ "parse": { "allow_alternating": true } }"#).unwrap();

    let without = run(dir.path(), &["validate", "1.0DL - 1.0WL"]);
    assert!(!without.status.success());

    let with = run(dir.path(), &["--config", "settings.json", "validate", "1.0DL - 1.0WL"]);
    assert!(with.status.success(), "stderr: {}", stderr(&with));
    assert!(stdout(&with).contains("valid: 1.0DL - 1.0WL"));
}

#[test]
fn test_generate_then_analyze() {
    let dir = tempfile::tempdir().unwrap();
    write_solver_results(&dir.path().join("solver.json"));

    let generate = run(
        dir.path(),
        &["generate", "--standard", "ACI_318", "--cases", "DL,LL", "--out", "loads.json"],
    );
    assert!(generate.status.success(), "stderr: {}", stderr(&generate));
    assert!(stdout(&generate).contains("ACI 318 combinations (6 generated)"));

    let analyze = run(
        dir.path(),
        &[
            "analyze",
            "--combinations",
            "loads.json",
            "--solver",
            "solver.json",
            "--criterion",
            "shear,moment",
            "--out",
            "analyzed.json",
        ],
    );
    assert!(analyze.status.success(), "stderr: {}", stderr(&analyze));
    let printed = stdout(&analyze);
    assert!(printed.contains("6 analyzed, 0 failed"));
    assert!(printed.contains("critical flag: ACI318-2 (from the shear selection)"));
    assert!(!dir.path().join("analyzed.json.lock").exists());

    let text = std::fs::read_to_string(dir.path().join("analyzed.json")).unwrap();
    let registry = LoadTypeRegistry::standard();
    let imported = serializer::import(&text, &FormulaParser::new(&registry)).unwrap();
    assert_eq!(imported.set.analyzed_count(), 6);
    assert_eq!(imported.set.critical_names(), vec!["ACI318-2"]);

    let document: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(document["critical_analysis"]["moment"]["combination"], "ACI318-2");
    assert_eq!(document["critical_analysis"]["shear"]["critical_member"], "B1");
}

#[test]
fn test_analyze_reports_missing_load_case() {
    let dir = tempfile::tempdir().unwrap();
    write_solver_results(&dir.path().join("solver.json"));

    let generate = run(
        dir.path(),
        &["generate", "--standard", "ACI_318", "--cases", "DL,LL,WL", "--out", "loads.json"],
    );
    assert!(generate.status.success(), "stderr: {}", stderr(&generate));

    let analyze = run(dir.path(), &["analyze", "--combinations", "loads.json", "--solver", "solver.json"]);
    assert!(analyze.status.success(), "stderr: {}", stderr(&analyze));
    let printed = stdout(&analyze);
    assert!(printed.contains("4 analyzed, 2 failed"));
    assert!(printed.contains("MISSING_LOAD_CASE"));
}

#[test]
fn test_custom_templates_persist_between_runs() {
    let dir = tempfile::tempdir().unwrap();

    let add = run(
        dir.path(),
        &[
            "templates",
            "--standard",
            "ACI_318",
            "--file",
            "aci.json",
            "--add",
            "1.2DL+0.5RL",
            "--description",
            "Roof ponding",
        ],
    );
    assert!(add.status.success(), "stderr: {}", stderr(&add));
    assert!(stdout(&add).contains("wrote aci.json"));

    let list = run(dir.path(), &["templates", "--standard", "ACI_318", "--file", "aci.json"]);
    assert!(list.status.success(), "stderr: {}", stderr(&list));
    let printed = stdout(&list);
    assert!(printed.contains("1.2DL + 0.5RL"));
    assert!(printed.contains("Roof ponding"));
    assert!(printed.contains("custom"));

    let invalid = run(
        dir.path(),
        &["templates", "--standard", "ACI_318", "--file", "aci.json", "--add", "1.2DL + 1.0DL"],
    );
    assert!(!invalid.status.success());

    let wrong_standard = run(dir.path(), &["templates", "--standard", "Eurocode", "--file", "aci.json"]);
    assert!(!wrong_standard.status.success());
    assert!(stderr(&wrong_standard).contains("holds"));
}

#[test]
fn test_inspect_rejects_invalid_document() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.json"), r#"{ "project": "P" }"#).unwrap();

    let inspect = run(dir.path(), &["inspect", "bad.json"]);
    assert!(!inspect.status.success());
    assert!(stderr(&inspect).contains("failed to load bad.json"));
}
