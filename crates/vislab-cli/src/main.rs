use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vislab_analysis::AggregateSummary;
use vislab_core::{HarnessConfig, VislabError};

const LOG_ENV: &str = "VISLAB_LOG";

#[derive(Parser)]
#[command(name = "vislab", version = "0.3.0", about = "Chart trial runner, linter and aggregator")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        trial_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Lint {
        trial_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Aggregate {
        #[arg(long, default_value = "runs")]
        runs: PathBuf,
        #[arg(long, default_value = "reports")]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_command(cli: Cli) -> Result<Option<Value>> {
    let config = HarnessConfig::load(cli.config.as_deref())?;
    debug!(interpreter = %config.interpreter, timeout_secs = config.timeout_secs, "config loaded");
    match cli.command {
        Commands::Run { trial_dir, json } => {
            let record = vislab_runner::run_trial(&trial_dir, &config)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "record": record
                })));
            }
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Lint { trial_dir, json } => {
            let findings = vislab_analysis::lint_trial(&trial_dir, &config)?;
            if json {
                let violations = findings.iter().filter(|f| f.status.is_violation()).count();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "lint",
                    "violations": violations,
                    "findings": findings
                })));
            }
            println!("{}", serde_json::to_string_pretty(&findings)?);
        }
        Commands::Aggregate { runs, out, json } => {
            let summary = vislab_analysis::run_aggregation(&runs, &out, &config.files)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "aggregate",
                    "runs_root": runs.display().to_string(),
                    "summary": summary_to_json(&summary)
                })));
            }
            for path in [
                &summary.outputs.runs,
                &summary.outputs.findings,
                &summary.outputs.violations,
            ] {
                println!("wrote: {}", path.display());
            }
        }
    }
    Ok(None)
}

fn summary_to_json(summary: &AggregateSummary) -> Value {
    json!({
        "runs_csv": summary.outputs.runs.display().to_string(),
        "lint_summary_csv": summary.outputs.findings.display().to_string(),
        "violations_csv": summary.outputs.violations.display().to_string(),
        "run_rows": summary.run_rows,
        "finding_rows": summary.finding_rows,
        "violation_rows": summary.violation_rows
    })
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<VislabError>()
        .map(VislabError::code)
        .unwrap_or("command_failed")
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Lint { json, .. }
        | Commands::Aggregate { json, .. } => *json,
    }
}
