//! Curate CLI - Command-line interface for BIDS Curate
//!
//! Commands:
//! - classify: Route scan descriptors into BIDS categories (batch mode)
//! - sessions: Build the chronological session index
//! - tabulate: Flatten a project catalog into per-file rows
//! - validate: Check a descriptor export before classification
//! - keys: Print the category registry and field map dependencies
//! - doctor: Diagnose rule set health and configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use bids_curate::sessions::DEFAULT_SESSION_PREFIX;
use bids_curate::sources::{DescriptorAdapter, DescriptorSource, ProjectCatalog, SessionSource};
use bids_curate::types::{ScanRow, Subject};
use bids_curate::{
    tabulate, Curator, CurateError, SequenceClassifier, SessionIndex, CURATE_VERSION,
    PRODUCER_NAME,
};

const DEFAULT_LOG_FILTER: &str = "bids_curate=info,curate=info";

/// Curate - Deterministic BIDS routing for MRI acquisitions
#[derive(Parser)]
#[command(name = "curate")]
#[command(version = CURATE_VERSION)]
#[command(about = "Route MRI acquisitions into BIDS categories", long_about = None)]
struct Cli {
    /// Log routing decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route scan descriptors into BIDS categories
    Classify {
        /// Descriptor export, JSON array or NDJSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Subject label used to render output paths
        #[arg(long)]
        subject: Option<String>,

        /// Catalog session label used to render output paths
        #[arg(long)]
        session: Option<String>,

        /// Project catalog or subject list to build the session index from
        #[arg(long)]
        sessions: Option<PathBuf>,

        /// Previously saved session index
        #[arg(long, conflicts_with = "sessions")]
        load_index: Option<PathBuf>,

        /// Canonical session prefix
        #[arg(long, default_value = DEFAULT_SESSION_PREFIX)]
        prefix: String,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,

        /// Exit with an error if any series is left unrecognized
        #[arg(long)]
        strict: bool,
    },

    /// Build the chronological session index (loadable with `classify --load-index`)
    Sessions {
        /// Project catalog or JSON array of subjects (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Canonical session prefix
        #[arg(long, default_value = DEFAULT_SESSION_PREFIX)]
        prefix: String,
    },

    /// Flatten a project catalog into per-file rows
    Tabulate {
        /// Project catalog (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Check a descriptor export before classification
    Validate {
        /// Descriptor export (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the category registry and field map dependencies
    Keys {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose rule set health and configuration
    Doctor {
        /// Check a saved session index
        #[arg(long)]
        index: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("bids_curate=debug,curate=debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CurateCliError> {
    match cli.command {
        Commands::Classify {
            input,
            output,
            subject,
            session,
            sessions,
            load_index,
            prefix,
            pretty,
            strict,
        } => cmd_classify(
            &input,
            &output,
            subject.as_deref(),
            session.as_deref(),
            sessions.as_deref(),
            load_index.as_deref(),
            &prefix,
            pretty,
            strict,
        ),

        Commands::Sessions {
            input,
            output,
            prefix,
        } => cmd_sessions(&input, &output, &prefix),

        Commands::Tabulate {
            input,
            output,
            output_format,
        } => cmd_tabulate(&input, &output, &output_format),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Keys { json } => cmd_keys(json),

        Commands::Doctor { index, json } => cmd_doctor(index.as_deref(), json),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_classify(
    input: &Path,
    output: &Path,
    subject: Option<&str>,
    session: Option<&str>,
    sessions: Option<&Path>,
    load_index: Option<&Path>,
    prefix: &str,
    pretty: bool,
    strict: bool,
) -> Result<(), CurateCliError> {
    let input_data = read_input(input)?;
    let descriptors = input_data.as_str().descriptors()?;

    if descriptors.is_empty() {
        return Err(CurateCliError::NoDescriptors);
    }

    let mut curator = Curator::new()?.with_session_prefix(prefix);
    attach_session_index(&mut curator, sessions, load_index)?;

    let report = curator.report(descriptors, subject, session)?;
    let unrecognized = report.unrecognized.len();

    let output_data = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    write_output(output, &(output_data + "\n"))?;

    if strict && unrecognized > 0 {
        Err(CurateCliError::Unrecognized(unrecognized))
    } else {
        Ok(())
    }
}

fn cmd_sessions(input: &Path, output: &Path, prefix: &str) -> Result<(), CurateCliError> {
    let subjects = read_subjects(&read_input(input)?)?;
    let index = SessionIndex::build(prefix, &subjects);
    tracing::info!(subjects = subjects.len(), sessions = index.len(), "indexed sessions");

    write_output(output, &(serde_json::to_string_pretty(&index)? + "\n"))
}

fn cmd_tabulate(
    input: &Path,
    output: &Path,
    output_format: &OutputFormat,
) -> Result<(), CurateCliError> {
    let catalog = ProjectCatalog::from_json(&read_input(input)?)?;
    let rows = tabulate(&catalog);

    if rows.is_empty() {
        return Err(CurateCliError::NoRows);
    }

    write_output(output, &format_rows(&rows, output_format)?)
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), CurateCliError> {
    let input_data = read_input(input)?;
    let descriptors = input_data.as_str().descriptors()?;
    let issues = DescriptorAdapter::validate(&descriptors);

    let report = ValidationReport {
        total_descriptors: descriptors.len(),
        issues: issues.len(),
        errors: issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                series_id: issue.series_id.clone(),
                error: issue.message.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total descriptors: {}", report.total_descriptors);
        println!("Issues:            {}", report.issues);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Series {} (index {}): {}",
                    err.series_id, err.index, err.error
                );
            }
        }
    }

    if report.issues > 0 {
        Err(CurateCliError::ValidationFailed(report.issues))
    } else {
        Ok(())
    }
}

fn cmd_keys(json: bool) -> Result<(), CurateCliError> {
    let curator = Curator::new()?;

    if json {
        let value = serde_json::json!({
            "keys": curator.registry(),
            "dependencies": curator.dependencies(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Categories");
    println!("==========");
    for key in curator.registry().iter() {
        let formats: Vec<&str> = key.output_formats.iter().map(|f| f.extension()).collect();
        println!(
            "  {:<16} {} [{}]",
            key.category.as_str(),
            key.template.as_str(),
            formats.join(", ")
        );
    }

    println!();
    println!("IntendedFor");
    println!("===========");
    for auxiliary in curator.dependencies().auxiliaries() {
        println!("  {}:", auxiliary);
        for template in curator.dependencies().dependents_of(auxiliary) {
            println!("    - {}", template);
        }
    }

    Ok(())
}

fn cmd_doctor(index: Option<&Path>, json: bool) -> Result<(), CurateCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "curate_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Curate version {}", CURATE_VERSION),
    });

    match Curator::new() {
        Ok(curator) => {
            checks.push(DoctorCheck {
                name: "registry".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} categories registered", curator.registry().len()),
            });
            let rules = SequenceClassifier::new(curator.registry())
                .map(|_| bids_curate::classifier::RULES.len());
            checks.push(match rules {
                Ok(count) => DoctorCheck {
                    name: "rules".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("{} rules, all targets registered", count),
                },
                Err(e) => DoctorCheck {
                    name: "rules".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            });
            checks.push(DoctorCheck {
                name: "dependencies".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} field map categories with IntendedFor references",
                    curator.dependencies().auxiliaries().count()
                ),
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "registry".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    if let Some(index_path) = index {
        let check = if index_path.exists() {
            match fs::read_to_string(index_path) {
                Ok(content) => match SessionIndex::from_json(&content) {
                    Ok(index) => DoctorCheck {
                        name: "session_index".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Session index valid ({} sessions, prefix {})",
                            index.len(),
                            index.prefix()
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "session_index".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid session index JSON: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "session_index".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read session index: {}", e),
                },
            }
        } else {
            DoctorCheck {
                name: "session_index".to_string(),
                status: CheckStatus::Warning,
                message: "Session index file does not exist".to_string(),
            }
        };
        checks.push(check);
    }

    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (pass --input <file>)"
    } else {
        "stdin is a pipe (--input - ready)"
    };
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: stdin_message.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CURATE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Curate Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CurateCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, CurateCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), CurateCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

/// A subject array, or a project catalog otherwise
/// `--sessions` builds a fresh index, `--load-index` reuses a saved one; both accept "-"
fn attach_session_index(
    curator: &mut Curator,
    sessions: Option<&Path>,
    load_index: Option<&Path>,
) -> Result<(), CurateCliError> {
    if let Some(path) = sessions {
        let subjects = read_subjects(&read_input(path)?)?;
        let index = curator.index_sessions(subjects.as_slice())?;
        tracing::info!(sessions = index.len(), "indexed sessions");
    } else if let Some(path) = load_index {
        curator.load_session_index(&read_input(path)?)?;
    }
    Ok(())
}

fn read_subjects(data: &str) -> Result<Vec<Subject>, CurateCliError> {
    if data.trim_start().starts_with('[') {
        let subjects: Vec<Subject> = serde_json::from_str(data)?;
        Ok(subjects)
    } else {
        Ok(ProjectCatalog::from_json(data)?.subjects()?)
    }
}

fn format_rows(rows: &[ScanRow], format: &OutputFormat) -> Result<String, CurateCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for row in rows {
                lines.push(serde_json::to_string(row)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)?),
    }
}

// Error types

#[derive(Debug)]
enum CurateCliError {
    Io(io::Error),
    Curate(CurateError),
    Json(serde_json::Error),
    NoDescriptors,
    NoRows,
    Unrecognized(usize),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for CurateCliError {
    fn from(e: io::Error) -> Self {
        CurateCliError::Io(e)
    }
}

impl From<CurateError> for CurateCliError {
    fn from(e: CurateError) -> Self {
        CurateCliError::Curate(e)
    }
}

impl From<serde_json::Error> for CurateCliError {
    fn from(e: serde_json::Error) -> Self {
        CurateCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CurateCliError> for CliError {
    fn from(e: CurateCliError) -> Self {
        match e {
            CurateCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CurateCliError::Curate(e) => {
                let (code, hint) = match &e {
                    CurateError::MalformedDescriptor(_) => (
                        "MALFORMED_DESCRIPTOR",
                        "Run 'curate validate' to locate the record",
                    ),
                    CurateError::UnknownSession(_) => (
                        "UNKNOWN_SESSION",
                        "Build the session index from the same project as the descriptors",
                    ),
                    CurateError::InvalidTemplate(_)
                    | CurateError::DuplicateCategory(_)
                    | CurateError::UnregisteredCategory(_) => {
                        ("INVALID_RULE_SET", "Run 'curate doctor' for details")
                    }
                    CurateError::JsonError(_) | CurateError::ParseError(_) => {
                        ("PARSE_ERROR", "Check input format")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CurateCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CurateCliError::NoDescriptors => CliError {
                code: "NO_DESCRIPTORS".to_string(),
                message: "No descriptors found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CurateCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No NIfTI files found in catalog".to_string(),
                hint: Some("Check that the catalog includes acquisition files".to_string()),
            },
            CurateCliError::Unrecognized(count) => CliError {
                code: "UNRECOGNIZED_SERIES".to_string(),
                message: format!("{} series need manual triage", count),
                hint: Some("See the 'unrecognized' list in the report".to_string()),
            },
            CurateCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} descriptor issues found", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CurateCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_descriptors: usize,
    issues: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    series_id: String,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
