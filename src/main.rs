mod cli;
mod config;
mod error;
mod invocation;
mod logging;
mod report;
mod scenarios;
mod util;

use anyhow::Result;
use clap::Parser;
use cli::{Command, ListArgs, RootArgs, RunArgs};
use scenarios::run::{list_cases, run_scenarios, RunScenariosArgs, Selection};
use scenarios::Platform;
use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;
use tracing::{info, warn};

/// Exit status for configuration errors that abort before any case runs.
const EXIT_CONFIG_ERROR: u8 = 2;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    if let Err(err) = logging::init_logging(args.verbose) {
        eprintln!("warning: {err:#}");
    }

    let result = match args.command {
        Command::Run(args) => cmd_run(args),
        Command::List(args) => cmd_list(args),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let config = config::resolve_config(&args.source, &args.binaries, Some(&args.output), |key| {
        env::var(key).ok()
    })?;
    let invocations = invocation::resolve_invocations(&config.binaries)?;
    info!(
        baseline = %util::format_command_line(&invocations.baseline.argv),
        candidate = %util::format_command_line(&invocations.candidate.argv),
        baseline_direct = invocations.baseline_direct,
        "resolved binaries"
    );

    let host_env = host_environment();
    let selection = Selection::new(&args.source.suites, &args.source.cases);
    let report = run_scenarios(&RunScenariosArgs {
        project_root: &config.project_root,
        scenarios_dir: &config.scenarios_dir,
        invocations: &invocations,
        host_env: &host_env,
        host: Platform::detect(),
        default_timeout_sec: config.timeout_sec,
        config_home_var: &config.config_home_var,
        config_home_subdir: &config.config_home_subdir,
        output_limit: config.output_limit,
        selection: &selection,
        fail_on_skip: config.fail_on_skip,
    })?;
    report.write(&config.out_json, &config.out_txt)?;

    let summary = report.summary;
    info!(
        total = summary.total,
        pass = summary.pass,
        fail = summary.fail,
        skip = summary.skip,
        "parity run finished"
    );
    println!("{}", config.out_json.display());
    println!("{}", config.out_txt.display());
    Ok(if summary.run_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_list(args: ListArgs) -> Result<ExitCode> {
    let config = config::resolve_config(&args.source, &args.binaries, None, |key| {
        env::var(key).ok()
    })?;
    // Listing works without binaries; direct-binary cases then show as skipped.
    let baseline_direct = match invocation::resolve_invocations(&config.binaries) {
        Ok(invocations) => invocations.baseline_direct,
        Err(err) => {
            warn!(error = %err, "binaries unresolved; assuming no direct baseline");
            false
        }
    };
    let selection = Selection::new(&args.source.suites, &args.source.cases);
    for line in list_cases(
        &config.scenarios_dir,
        &selection,
        Platform::detect(),
        baseline_direct,
    )? {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Snapshot of the inherited environment; entries that are not valid UTF-8
/// are dropped.
fn host_environment() -> BTreeMap<String, String> {
    env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}
