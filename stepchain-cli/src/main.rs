// stepchain-cli/src/main.rs
// ============================================================================
// Module: Stepchain CLI Entry Point
// Description: Command dispatcher for offline runs and trace verification.
// Purpose: Execute problem specs, verify traces, and compare replays.
// Dependencies: clap, serde_json, stepchain-core, thiserror, tracing-subscriber
// ============================================================================

//! ## Overview
//! The CLI drives the engine offline: `run` executes a problem spec and
//! emits the NDJSON trace, `verify` re-validates a trace file, `diff`
//! compares two traces for byte-identical replay, and `metrics` aggregates a
//! trace. Inputs are untrusted and size-limited before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use stepchain_core::EngineRunner;
use stepchain_core::ExecuteRequest;
use stepchain_core::ProblemSpec;
use stepchain_core::StateStatus;
use stepchain_core::Timestamp;
use stepchain_core::TraceId;
use stepchain_core::TraceRecord;
use stepchain_core::aggregate_trace_metrics;
use stepchain_core::trace_divergence;
use stepchain_core::verify_trace_bytes;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a problem specification JSON input.
const MAX_SPEC_BYTES: u64 = 1024 * 1024;
/// Maximum size of a trace NDJSON input.
const MAX_TRACE_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stepchain", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a problem specification and emit its trace.
    Run(RunCommand),
    /// Re-validate a trace file end to end.
    Verify(VerifyCommand),
    /// Compare two traces for byte-identical replay.
    Diff(DiffCommand),
    /// Aggregate metrics over a trace file.
    Metrics(MetricsCommand),
}

/// Configuration for the `run` command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Path to the problem specification JSON file.
    #[arg(long, value_name = "PATH")]
    spec: PathBuf,
    /// Trace identifier (defaults to the spec id).
    #[arg(long, value_name = "ID")]
    trace_id: Option<String>,
    /// Deterministic clock seed (defaults to the spec created_at).
    #[arg(long, value_name = "TIMESTAMP")]
    now: Option<String>,
    /// Trace output path (stdout when omitted).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Optional path for the final state JSON.
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,
}

/// Configuration for the `verify` command.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Path to the trace NDJSON file.
    #[arg(long, value_name = "PATH")]
    trace: PathBuf,
}

/// Configuration for the `diff` command.
#[derive(Args, Debug)]
struct DiffCommand {
    /// Path to the expected (golden) trace.
    #[arg(long, value_name = "PATH")]
    expected: PathBuf,
    /// Path to the actual trace.
    #[arg(long, value_name = "PATH")]
    actual: PathBuf,
}

/// Configuration for the `metrics` command.
#[derive(Args, Debug)]
struct MetricsCommand {
    /// Path to the trace NDJSON file.
    #[arg(long, value_name = "PATH")]
    trace: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures surfaced to the operator.
#[derive(Debug, Error)]
enum CliError {
    /// Filesystem access failed.
    #[error("cannot read {path}: {message}")]
    Read {
        /// Offending path.
        path: String,
        /// Failure description.
        message: String,
    },
    /// Input exceeds the configured size limit.
    #[error("{path} exceeds the {limit}-byte input limit")]
    TooLarge {
        /// Offending path.
        path: String,
        /// Applicable limit in bytes.
        limit: u64,
    },
    /// Input failed to parse.
    #[error("cannot parse {path}: {message}")]
    Parse {
        /// Offending path.
        path: String,
        /// Failure description.
        message: String,
    },
    /// Writing an output file failed.
    #[error("cannot write {path}: {message}")]
    Write {
        /// Offending path.
        path: String,
        /// Failure description.
        message: String,
    },
    /// Engine rejected the request or the run.
    #[error("engine error ({code}): {message}")]
    Engine {
        /// Stable taxonomy code.
        code: &'static str,
        /// Failure description.
        message: String,
    },
    /// Trace verification failed.
    #[error("trace verification failed ({code}): {message}")]
    Verify {
        /// Stable taxonomy code.
        code: &'static str,
        /// Failure description.
        message: String,
    },
    /// Two traces diverged.
    #[error("traces diverge at line {line}")]
    Divergence {
        /// One-based line number of the first difference.
        line: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("stepchain: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the selected subcommand.
fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run(command) => run(&command),
        Commands::Verify(command) => verify(&command),
        Commands::Diff(command) => diff(&command),
        Commands::Metrics(command) => metrics(&command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes a problem specification and emits the trace.
fn run(command: &RunCommand) -> Result<(), CliError> {
    let spec_bytes = read_limited(&command.spec, MAX_SPEC_BYTES)?;
    let spec: ProblemSpec = serde_json::from_slice(&spec_bytes).map_err(|err| CliError::Parse {
        path: display_path(&command.spec),
        message: err.to_string(),
    })?;

    let trace_id = command
        .trace_id
        .clone()
        .map_or_else(|| TraceId::new(spec.id.as_str()), TraceId::new);
    let now = match &command.now {
        Some(raw) => Timestamp::parse(raw).map_err(|err| CliError::Parse {
            path: "--now".to_string(),
            message: err.to_string(),
        })?,
        None => spec.created_at,
    };

    let runner = EngineRunner::new();
    let request = ExecuteRequest {
        problem_spec: spec,
        trace_id,
        now,
    };
    let result = runner.execute(&request).map_err(|err| CliError::Engine {
        code: err.code(),
        message: err.to_string(),
    })?;

    match &command.output {
        Some(path) => write_file(path, &result.trace_bytes)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&result.trace_bytes).map_err(|err| CliError::Write {
                path: "stdout".to_string(),
                message: err.to_string(),
            })?;
        }
    }
    if let Some(path) = &command.state {
        let state_json =
            serde_json::to_vec_pretty(&result.final_state).map_err(|err| CliError::Write {
                path: display_path(path),
                message: err.to_string(),
            })?;
        write_file(path, &state_json)?;
    }

    let status = match result.final_state.status {
        StateStatus::Completed => "completed",
        StateStatus::Failed => "failed",
        StateStatus::Pending | StateStatus::Running => "incomplete",
    };
    eprintln!(
        "stepchain: run {} {status} ({} records, step_index {})",
        result.trace_id,
        result.records.len(),
        result.final_state.step_index
    );
    Ok(())
}

/// Re-validates a trace file.
fn verify(command: &VerifyCommand) -> Result<(), CliError> {
    let bytes = read_limited(&command.trace, MAX_TRACE_BYTES)?;
    let report = verify_trace_bytes(&bytes).map_err(|err| CliError::Verify {
        code: err.code(),
        message: err.to_string(),
    })?;
    println!(
        "trace ok: {} records ({} steps, {} controls), final hash {}",
        report.records, report.step_records, report.control_records, report.final_record_hash
    );
    Ok(())
}

/// Compares two traces for byte-identical replay.
fn diff(command: &DiffCommand) -> Result<(), CliError> {
    let expected = read_limited(&command.expected, MAX_TRACE_BYTES)?;
    let actual = read_limited(&command.actual, MAX_TRACE_BYTES)?;
    match trace_divergence(&expected, &actual) {
        None => {
            println!("traces are byte-identical");
            Ok(())
        }
        Some(divergence) => {
            if let Some(line) = &divergence.expected {
                eprintln!("- {line}");
            }
            if let Some(line) = &divergence.actual {
                eprintln!("+ {line}");
            }
            Err(CliError::Divergence {
                line: divergence.line,
            })
        }
    }
}

/// Aggregates metrics over a trace file.
fn metrics(command: &MetricsCommand) -> Result<(), CliError> {
    let bytes = read_limited(&command.trace, MAX_TRACE_BYTES)?;
    let mut records = Vec::new();
    for (position, line) in bytes.split(|byte| *byte == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let record: TraceRecord = serde_json::from_slice(line).map_err(|err| CliError::Parse {
            path: format!("{}:{}", display_path(&command.trace), position + 1),
            message: err.to_string(),
        })?;
        records.push(record);
    }
    let metrics = aggregate_trace_metrics(&records);
    let rendered = serde_json::to_string_pretty(&metrics).map_err(|err| CliError::Write {
        path: "stdout".to_string(),
        message: err.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Reads a file after checking it against a size limit.
fn read_limited(path: &Path, limit: u64) -> Result<Vec<u8>, CliError> {
    let metadata = fs::metadata(path).map_err(|err| CliError::Read {
        path: display_path(path),
        message: err.to_string(),
    })?;
    if metadata.len() > limit {
        return Err(CliError::TooLarge {
            path: display_path(path),
            limit,
        });
    }
    fs::read(path).map_err(|err| CliError::Read {
        path: display_path(path),
        message: err.to_string(),
    })
}

/// Writes bytes to a file.
fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    fs::write(path, bytes).map_err(|err| CliError::Write {
        path: display_path(path),
        message: err.to_string(),
    })
}

/// Renders a path for error messages.
fn display_path(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;

    fn write_spec(dir: &Path) -> PathBuf {
        let path = dir.join("spec.json");
        let spec = serde_json::json!({
            "version": "1.0.0",
            "id": "req-cli-1",
            "created_at": "2026-02-02T00:00:00Z",
            "inputs": { "prompt": "Hello world" },
        });
        fs::write(&path, serde_json::to_vec_pretty(&spec).unwrap()).unwrap();
        path
    }

    /// Run produces a verifiable trace file and a final state file.
    #[test]
    fn run_then_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let spec = write_spec(dir.path());
        let trace = dir.path().join("trace.ndjson");
        let state = dir.path().join("state.json");

        run(&RunCommand {
            spec,
            trace_id: Some("trace-cli-1".to_string()),
            now: None,
            output: Some(trace.clone()),
            state: Some(state.clone()),
        })
        .unwrap();

        verify(&VerifyCommand {
            trace: trace.clone(),
        })
        .unwrap();

        let state: serde_json::Value =
            serde_json::from_slice(&fs::read(state).unwrap()).unwrap();
        assert_eq!(state["status"], serde_json::json!("completed"));

        diff(&DiffCommand {
            expected: trace.clone(),
            actual: trace,
        })
        .unwrap();
    }

    /// Diverging traces surface the first differing line.
    #[test]
    fn diff_reports_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left.ndjson");
        let right = dir.path().join("right.ndjson");
        fs::write(&left, b"{\"a\":1}\n").unwrap();
        fs::write(&right, b"{\"a\":2}\n").unwrap();

        let err = diff(&DiffCommand {
            expected: left,
            actual: right,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Divergence { line: 1 }));
    }

    /// A tampered trace fails verification.
    #[test]
    fn verify_rejects_tampered_trace() {
        let dir = tempfile::tempdir().unwrap();
        let spec = write_spec(dir.path());
        let trace = dir.path().join("trace.ndjson");
        run(&RunCommand {
            spec,
            trace_id: None,
            now: None,
            output: Some(trace.clone()),
            state: None,
        })
        .unwrap();

        let tampered = fs::read_to_string(&trace).unwrap().replacen("Hello", "Jello", 1);
        fs::write(&trace, tampered).unwrap();
        let err = verify(&VerifyCommand {
            trace,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Verify { .. }));
    }
}
