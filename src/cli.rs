//! CLI argument parsing for the parity harness.
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "parity",
    version,
    about = "Differential parity harness: run scenario cases against a baseline and a candidate CLI",
    after_help = "Examples:\n  parity run --baseline-dir ../tool-rs --baseline-bin-name tool --candidate-bin build/tool\n  parity run --suite help --case help-0 -v\n  parity list --candidate-bin build/tool --baseline-bin /usr/bin/tool",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute selected cases on both sides and write the reports
    Run(RunArgs),
    /// Print every selected case with its gate decision without executing
    List(ListArgs),
}

/// Where scenarios come from and which of them to select.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Project root; relative paths and `parity.json` resolve against it
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/parity.json when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding *.yaml/*.yml/*.json scenario documents
    #[arg(long, value_name = "DIR")]
    pub scenarios_dir: Option<PathBuf>,

    /// Run only the named suite (repeatable)
    #[arg(long = "suite", value_name = "NAME")]
    pub suites: Vec<String>,

    /// Run only the given case id (repeatable)
    #[arg(long = "case", value_name = "ID")]
    pub cases: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BinaryArgs {
    /// Baseline executable [env: PARITY_BASELINE_BIN]
    #[arg(long, value_name = "PATH")]
    pub baseline_bin: Option<PathBuf>,

    /// Baseline cargo project, run from target/debug or `cargo run` [env: PARITY_BASELINE_DIR]
    #[arg(long, value_name = "DIR")]
    pub baseline_dir: Option<PathBuf>,

    /// Baseline executable name inside --baseline-dir (default: baseline_package)
    #[arg(long, value_name = "NAME")]
    pub baseline_bin_name: Option<String>,

    /// Candidate executable [env: PARITY_CANDIDATE_BIN]
    #[arg(long, value_name = "PATH")]
    pub candidate_bin: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// JSON report path
    #[arg(long, value_name = "PATH")]
    pub out_json: Option<PathBuf>,

    /// Text report path
    #[arg(long, value_name = "PATH")]
    pub out_txt: Option<PathBuf>,

    /// Default per-step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_sec: Option<f64>,

    /// Count skipped cases as failures
    #[arg(long)]
    pub fail_on_skip: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub binaries: BinaryArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub binaries: BinaryArgs,
}
