//! # combo - Load Combination CLI
//!
//! Command line front end for `combo_core`: validate formulas, generate
//! design-code combinations, manage custom templates, run batch analyses
//! against solver output and inspect interchange documents.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use combo_core::analysis::{BatchOutcome, BatchReport, CancelToken, CombinationAnalysisManager};
use combo_core::combination_set::CombinationSet;
use combo_core::critical::{find_all_critical, Criterion, Selection};
use combo_core::file_io::{self, FileLock};
use combo_core::formula::FormulaParser;
use combo_core::loads::{LoadType, LoadTypeRegistry};
use combo_core::serializer;
use combo_core::settings::EngineSettings;
use combo_core::solver::InMemorySolverResults;
use combo_core::standards::{StandardLibrary, StandardType};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// combo - structural load combinations
#[derive(Parser, Debug)]
#[command(name = "combo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine settings file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a combination formula
    Validate {
        /// Formula text, e.g. "1.2DL + 1.6LL"
        formula: String,

        /// Allow signed (alternating) terms
        #[arg(long)]
        alternating: bool,
    },

    /// Generate the combinations of a design standard
    Generate {
        /// Standard code (ACI_318, AISC_360, Eurocode, IBC_2018)
        #[arg(short, long)]
        standard: Option<StandardType>,

        /// Load cases defined in the model
        #[arg(long, value_delimiter = ',', required = true, value_parser = parse_load_type)]
        cases: Vec<LoadType>,

        /// Write the combinations as an interchange document
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Analyze a combination document against solver results
    Analyze {
        /// Interchange document with the combinations
        #[arg(long)]
        combinations: PathBuf,

        /// Solver results (JSON keyed by load case, then member)
        #[arg(long)]
        solver: PathBuf,

        /// Criteria for critical selection (default: all)
        #[arg(long, value_delimiter = ',')]
        criterion: Vec<Criterion>,

        /// Write the analyzed document here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a document and print its summary
    Inspect {
        /// Interchange document
        file: PathBuf,
    },

    /// List a standard's templates, including custom ones from a template file
    Templates {
        /// Standard code (ACI_318, AISC_360, Eurocode, IBC_2018)
        #[arg(short, long)]
        standard: Option<StandardType>,

        /// Template file holding custom templates
        #[arg(long)]
        file: Option<PathBuf>,

        /// Validate a custom template and save it to the template file
        #[arg(long, requires = "file")]
        add: Option<String>,

        /// Description of the added template
        #[arg(long, requires = "add")]
        description: Option<String>,
    },
}

fn parse_load_type(s: &str) -> Result<LoadType, String> {
    LoadType::from_code(s.trim()).ok_or_else(|| {
        format!(
            "unknown load case '{}' (expected one of {})",
            s,
            LoadTypeRegistry::standard().abbreviations().join(", ")
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let settings = load_settings(cli.config.as_deref())?;
    let registry = LoadTypeRegistry::standard();
    let parser = FormulaParser::new(&registry).with_options(settings.parse);

    match cli.command {
        Commands::Validate { formula, alternating } => validate(&parser, &formula, alternating),
        Commands::Generate { standard, cases, out } => generate(
            &parser,
            &settings,
            standard.unwrap_or(settings.default_standard),
            &cases,
            out.as_deref(),
        ),
        Commands::Analyze {
            combinations,
            solver,
            criterion,
            out,
        } => analyze(&parser, &settings, &combinations, &solver, &criterion, out.as_deref()),
        Commands::Inspect { file } => inspect(&parser, &file),
        Commands::Templates {
            standard,
            file,
            add,
            description,
        } => templates(
            &parser,
            standard.unwrap_or(settings.default_standard),
            file.as_deref(),
            add.as_deref(),
            description.unwrap_or_default(),
        ),
    }
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let settings = match path {
        Some(path) => file_io::load_json::<EngineSettings>(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => EngineSettings::default(),
    };
    settings.validate().context("invalid engine settings")?;
    Ok(settings)
}

fn validate(parser: &FormulaParser<'_>, formula: &str, alternating: bool) -> Result<()> {
    let parser = if alternating { parser.with_alternating(true) } else { *parser };
    match parser.parse(formula) {
        Ok(parsed) => {
            println!("valid: {}", parsed);
            for term in parsed.terms() {
                let loads: Vec<&str> = term.load_types().iter().map(|lt| lt.code()).collect();
                println!("  {:>8}  {}", term.factor, loads.join(" or "));
            }
            Ok(())
        }
        Err(e) => bail!("invalid formula: {}", e.reason()),
    }
}

fn generate(
    parser: &FormulaParser<'_>,
    settings: &EngineSettings,
    standard: StandardType,
    cases: &[LoadType],
    out: Option<&Path>,
) -> Result<()> {
    let report = StandardLibrary::builtin()
        .generate(parser, standard, cases)
        .with_context(|| format!("failed to generate {} combinations", standard))?;

    println!("{} combinations ({} generated)", standard, report.combinations.len());
    for combo in &report.combinations {
        println!("  {:<12} {}", combo.name(), combo.formula_text());
    }
    for reduced in &report.reduced {
        let dropped: Vec<&str> = reduced.dropped.iter().map(|lt| lt.code()).collect();
        println!("  reduced  {:<12} dropped {}", reduced.name, dropped.join(", "));
    }
    for excluded in &report.excluded {
        println!("  excluded {:<12} {}", excluded.name, excluded.reason);
    }

    if let Some(out) = out {
        let mut set = CombinationSet::new(settings.project_label.clone());
        set.extend(report.combinations)?;
        write_document(&set, false, &[], out)?;
    }
    Ok(())
}

fn analyze(
    parser: &FormulaParser<'_>,
    settings: &EngineSettings,
    combinations: &Path,
    solver: &Path,
    criteria: &[Criterion],
    out: Option<&Path>,
) -> Result<()> {
    let (document, lock) = file_io::load_document_with_lock_check(combinations, parser)
        .with_context(|| format!("failed to load {}", combinations.display()))?;
    if let Some(lock) = lock {
        warn!(user = %lock.user_id, machine = %lock.machine, "Combination document is locked by another user");
    }
    let solver_results: InMemorySolverResults = file_io::load_json(solver)
        .with_context(|| format!("failed to load solver results from {}", solver.display()))?;

    let mut set = document.set;
    let manager = CombinationAnalysisManager::new(settings);
    let report = manager.run_batch(&mut set, &solver_results, &CancelToken::new());
    print_batch(&report);

    let criteria = if criteria.is_empty() { &Criterion::ALL[..] } else { criteria };
    let selections = match find_all_critical(&set, criteria) {
        Ok(selections) => selections,
        Err(e) => {
            warn!(error = %e, "Critical selection skipped");
            Vec::new()
        }
    };
    for selection in &selections {
        println!("{}", selection.message);
    }
    if let Some(first) = selections.first() {
        set.apply_selection(first)?;
        println!("critical flag: {} (from the {} selection)", first.winner, first.criterion);
    }

    if let Some(out) = out {
        write_document(&set, true, &selections, out)?;
    }
    Ok(())
}

fn inspect(parser: &FormulaParser<'_>, file: &Path) -> Result<()> {
    let (document, lock) = file_io::load_document_with_lock_check(file, parser)
        .with_context(|| format!("failed to load {}", file.display()))?;

    println!("project:  {}", document.project);
    println!("date:     {}", document.date.to_rfc3339());
    if let Some(version) = &document.schema_version {
        println!("schema:   {}", version);
    }
    if let Some(lock) = lock {
        println!("locked:   {} ({}) since {}", lock.user_id, lock.machine, lock.locked_at.to_rfc3339());
    }
    println!(
        "combinations: {} ({} analyzed)",
        document.set.len(),
        document.set.analyzed_count()
    );
    for combo in &document.set {
        let moment = combo
            .result()
            .map(|r| format!("{:.3}", r.max_moment))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<10} {:<11} M={:<12} {}",
            combo.name(),
            combo.standard().code(),
            combo.state(),
            moment,
            combo.formula_text()
        );
    }
    Ok(())
}

fn templates(
    parser: &FormulaParser<'_>,
    standard: StandardType,
    file: Option<&Path>,
    add: Option<&str>,
    description: String,
) -> Result<()> {
    let mut library = StandardLibrary::builtin();

    if let Some(file) = file.filter(|file| file.exists()) {
        let import = library
            .load_templates(parser, file)
            .with_context(|| format!("failed to load templates from {}", file.display()))?;
        if import.standard != standard {
            bail!("{} holds {} templates, not {}", file.display(), import.standard, standard);
        }
        for rejected in &import.rejected {
            println!("rejected {}: {}", rejected.formula, rejected.reason);
        }
    }

    if let Some(formula) = add {
        let file = file.context("--add needs a template file")?;
        library
            .add_custom_template(parser, standard, formula, description)
            .with_context(|| format!("invalid template '{}'", formula))?;
        let _lock = FileLock::acquire(file, current_user()).with_context(|| format!("cannot lock {}", file.display()))?;
        library
            .save_templates(standard, file)
            .with_context(|| format!("failed to write {}", file.display()))?;
        println!("wrote {}", file.display());
    }

    println!("{} templates", standard);
    for entry in library.all_templates(standard) {
        let kind = if entry.is_custom { "custom" } else { "built-in" };
        println!("  {:>3}  {:<8}  {:<32} {}", entry.index + 1, kind, entry.formula, entry.description);
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    println!(
        "batch {}: {} analyzed, {} failed, {} skipped",
        report.run_id,
        report.analyzed_count(),
        report.failed_count(),
        report.skipped.len()
    );
    for item in &report.items {
        match &item.outcome {
            BatchOutcome::Analyzed(result) => println!(
                "  {:<12} M={:.3} V={:.3} P={:.3} d={:.5} at {}",
                item.name, result.max_moment, result.max_shear, result.max_axial, result.max_deflection, result.critical_member
            ),
            BatchOutcome::Failed(e) => println!("  {:<12} FAILED [{}] {}", item.name, e.error_code(), e),
            BatchOutcome::Cancelled => println!("  {:<12} cancelled", item.name),
        }
    }
}

fn write_document(set: &CombinationSet, include_results: bool, critical: &[Selection], out: &Path) -> Result<()> {
    let _lock = FileLock::acquire(out, current_user()).with_context(|| format!("cannot lock {}", out.display()))?;
    let document = serializer::export(set, include_results, critical);
    file_io::save_document(&document, out).with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), combinations = set.len(), "Wrote combination document");
    println!("wrote {}", out.display());
    Ok(())
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
