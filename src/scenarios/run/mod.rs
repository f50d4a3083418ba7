//! Case orchestration.
//!
//! Cases run one at a time: gate, baseline side, candidate side, compare.
//! Each side's ephemeral directories live until its report row is built.
mod exec;
mod validate;

use super::gate::{self, GateDecision, Platform};
use super::load::{default_suite_name, discover_scenario_files, load_suite};
use super::normalize::BinNames;
use super::{Case, Side, SuiteEntry};
use crate::invocation::Invocations;
use crate::report::{CaseReport, Report, SideReport, Verdict};
use crate::util::{display_path, now_epoch_ms};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use exec::{run_side, ExecEnv, ExecutionRecord, StepResult};
pub use validate::{build_regex, evaluate, CompareContext};

/// Suite and case filters; an empty set admits everything.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub suites: BTreeSet<String>,
    pub cases: BTreeSet<String>,
}

impl Selection {
    pub fn new(suites: &[String], cases: &[String]) -> Self {
        fn cleaned(values: &[String]) -> BTreeSet<String> {
            values
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect()
        }
        Selection {
            suites: cleaned(suites),
            cases: cleaned(cases),
        }
    }

    pub fn includes(&self, suite: &str, case_id: &str) -> bool {
        (self.suites.is_empty() || self.suites.contains(suite))
            && (self.cases.is_empty() || self.cases.contains(case_id))
    }
}

/// Inputs needed to execute every selected case.
pub struct RunScenariosArgs<'a> {
    pub project_root: &'a Path,
    pub scenarios_dir: &'a Path,
    pub invocations: &'a Invocations,
    pub host_env: &'a BTreeMap<String, String>,
    pub host: Platform,
    pub default_timeout_sec: f64,
    pub config_home_var: &'a str,
    pub config_home_subdir: &'a str,
    pub output_limit: usize,
    pub selection: &'a Selection,
    pub fail_on_skip: bool,
}

/// Run the selected cases and return the aggregated report.
///
/// Only configuration problems (missing scenario dir, no documents) are
/// errors; everything case-level lands in the report.
pub fn run_scenarios(args: &RunScenariosArgs<'_>) -> Result<Report> {
    let files = discover_scenario_files(args.scenarios_dir)?;
    let invocations = args.invocations;
    let mut report = Report::new(
        now_epoch_ms()?,
        args.host,
        args.project_root.display().to_string(),
        invocations.baseline.argv.clone(),
        invocations.candidate.argv.clone(),
    );
    let names = BinNames::new(
        &invocations.baseline.display_name,
        &invocations.candidate.display_name,
    );
    let exec_env = ExecEnv {
        project_root: args.project_root,
        host_env: args.host_env,
        default_timeout_sec: args.default_timeout_sec,
        config_home_var: args.config_home_var,
        config_home_subdir: args.config_home_subdir,
    };
    let compare = CompareContext {
        project_root: args.project_root,
        names: &names,
    };

    for path in files {
        let suite = match load_suite(&path) {
            Ok(suite) => suite,
            Err(err) => {
                let name = default_suite_name(&path);
                if args.selection.includes(&name, &name) {
                    warn!(
                        path = %display_path(&path, Some(args.project_root)),
                        error = %err,
                        "malformed suite"
                    );
                    let verdict = Verdict::fail(err.to_string(), 0);
                    report.push(CaseReport::new(&name, &name, "", verdict));
                }
                continue;
            }
        };

        debug!(
            suite = %suite.name,
            path = %display_path(&suite.source, Some(args.project_root)),
            cases = suite.entries.len(),
            "loaded suite"
        );
        for entry in &suite.entries {
            if !args.selection.includes(&suite.name, entry.id()) {
                continue;
            }
            let row = match entry {
                SuiteEntry::Malformed(malformed) => CaseReport::new(
                    &suite.name,
                    &malformed.id,
                    &malformed.description,
                    Verdict::fail(
                        format!("malformed case #{}: {}", malformed.index, malformed.reason),
                        0,
                    ),
                ),
                SuiteEntry::Case(case) => run_case(&suite.name, case, args, &exec_env, &compare),
            };
            info!(
                suite = %row.suite,
                case = %row.id,
                status = row.status.as_str(),
                duration_ms = row.duration_ms,
                "case finished"
            );
            report.push(row);
        }
    }

    if args.fail_on_skip {
        report.summary.promote_skips();
    }
    Ok(report)
}

fn run_case(
    suite: &str,
    case: &Case,
    args: &RunScenariosArgs<'_>,
    exec_env: &ExecEnv<'_>,
    compare: &CompareContext<'_>,
) -> CaseReport {
    if let GateDecision::Skip(reason) =
        gate::admit(case, args.host, args.invocations.baseline_direct)
    {
        return CaseReport::new(suite, &case.id, &case.description, Verdict::skip(reason));
    }

    let started = Instant::now();
    let execution_failure = |side: Side, err: anyhow::Error| {
        warn!(case = %case.id, side = %side, error = %format!("{err:#}"), "execution error");
        CaseReport::new(
            suite,
            &case.id,
            &case.description,
            Verdict::fail(format!("{side} execution error: {err:#}"), elapsed_ms(started)),
        )
    };
    // Baseline completes every step before the candidate starts.
    let baseline = match run_side(Side::Baseline, case, &args.invocations.baseline, exec_env) {
        Ok(record) => record,
        Err(err) => return execution_failure(Side::Baseline, err),
    };
    let candidate = match run_side(Side::Candidate, case, &args.invocations.candidate, exec_env)
    {
        Ok(record) => record,
        Err(err) => return execution_failure(Side::Candidate, err),
    };

    let failures = evaluate(case, &baseline, &candidate, compare);
    let verdict = Verdict::from_failures(failures, elapsed_ms(started));
    CaseReport::new(suite, &case.id, &case.description, verdict).with_sides(
        SideReport::from_record(&baseline, args.output_limit),
        SideReport::from_record(&candidate, args.output_limit),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// One line per selected case with its gate decision; nothing is executed.
pub fn list_cases(
    scenarios_dir: &Path,
    selection: &Selection,
    host: Platform,
    baseline_direct: bool,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in discover_scenario_files(scenarios_dir)? {
        let suite = match load_suite(&path) {
            Ok(suite) => suite,
            Err(err) => {
                let name = default_suite_name(&path);
                if selection.includes(&name, &name) {
                    lines.push(format!("{name}::{name}\tmalformed: {err}"));
                }
                continue;
            }
        };
        for entry in &suite.entries {
            if !selection.includes(&suite.name, entry.id()) {
                continue;
            }
            let decision = match entry {
                SuiteEntry::Malformed(malformed) => format!("malformed: {}", malformed.reason),
                SuiteEntry::Case(case) => match gate::admit(case, host, baseline_direct) {
                    GateDecision::Admit => "run".to_string(),
                    GateDecision::Skip(reason) => format!("skip: {reason}"),
                },
            };
            lines.push(format!("{}::{}\t{decision}", suite.name, entry.id()));
        }
    }
    Ok(lines)
}
