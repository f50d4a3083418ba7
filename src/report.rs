//! Verdict aggregation and the JSON/text parity reports.
use crate::scenarios::run::{ExecutionRecord, StepResult};
use crate::scenarios::Platform;
use crate::util::{truncate_text, write_json_pretty, write_text};
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pass,
    Fail,
    Skip,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Pass => "pass",
            CaseStatus::Fail => "fail",
            CaseStatus::Skip => "skip",
        }
    }
}

/// Outcome of one case. `reasons` is empty iff the status is pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: CaseStatus,
    pub reasons: Vec<String>,
    pub duration_ms: u64,
}

impl Verdict {
    pub fn from_failures(reasons: Vec<String>, duration_ms: u64) -> Self {
        let status = if reasons.is_empty() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        };
        Verdict {
            status,
            reasons,
            duration_ms,
        }
    }

    pub fn fail(reason: impl Into<String>, duration_ms: u64) -> Self {
        Verdict {
            status: CaseStatus::Fail,
            reasons: vec![reason.into()],
            duration_ms,
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Verdict {
            status: CaseStatus::Skip,
            reasons: vec![reason.into()],
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
}

impl Summary {
    pub fn record(&mut self, status: CaseStatus) {
        self.total += 1;
        match status {
            CaseStatus::Pass => self.pass += 1,
            CaseStatus::Fail => self.fail += 1,
            CaseStatus::Skip => self.skip += 1,
        }
    }

    /// Strict mode counts every skip as a failure too; `skip` is unchanged.
    pub fn promote_skips(&mut self) {
        self.fail += self.skip;
    }

    pub fn run_failed(&self) -> bool {
        self.fail > 0
    }
}

/// One side's captured behavior with bounded output.
#[derive(Debug, Clone, Serialize)]
pub struct SideReport {
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub tmp_dir: String,
    pub home: String,
    pub config_home: String,
    pub steps: Vec<StepResult>,
}

impl SideReport {
    pub fn from_record(record: &ExecutionRecord, limit: usize) -> Self {
        let steps = record
            .steps
            .iter()
            .map(|step| StepResult {
                stdout: truncate_text(&step.stdout, limit),
                stderr: truncate_text(&step.stderr, limit),
                ..step.clone()
            })
            .collect();
        SideReport {
            exit_code: record.exit_code,
            timed_out: record.timed_out,
            duration_ms: record.duration_ms,
            stdout: truncate_text(&record.stdout, limit),
            stderr: truncate_text(&record.stderr, limit),
            tmp_dir: record.tmp_path().display().to_string(),
            home: record.home.clone(),
            config_home: record.config_home.clone(),
            steps,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub suite: String,
    pub id: String,
    pub description: String,
    pub status: CaseStatus,
    pub reasons: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<SideReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheng: Option<SideReport>,
}

impl CaseReport {
    pub fn new(suite: &str, id: &str, description: &str, verdict: Verdict) -> Self {
        CaseReport {
            suite: suite.to_string(),
            id: id.to_string(),
            description: description.to_string(),
            status: verdict.status,
            reasons: verdict.reasons,
            duration_ms: verdict.duration_ms,
            baseline: None,
            cheng: None,
        }
    }

    pub fn with_sides(mut self, baseline: SideReport, candidate: SideReport) -> Self {
        self.baseline = Some(baseline);
        self.cheng = Some(candidate);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub version: u32,
    pub generated_at_epoch_ms: u128,
    pub host_platform: Platform,
    pub project_root: String,
    pub baseline_cmd: Vec<String>,
    pub cheng_cmd: Vec<String>,
    pub summary: Summary,
    pub results: Vec<CaseReport>,
}

impl Report {
    pub fn new(
        generated_at_epoch_ms: u128,
        host_platform: Platform,
        project_root: String,
        baseline_cmd: Vec<String>,
        cheng_cmd: Vec<String>,
    ) -> Self {
        Report {
            version: REPORT_VERSION,
            generated_at_epoch_ms,
            host_platform,
            project_root,
            baseline_cmd,
            cheng_cmd,
            summary: Summary::default(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, row: CaseReport) {
        self.summary.record(row.status);
        self.results.push(row);
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let summary = &self.summary;
        let _ = writeln!(out, "Parity report");
        let _ = writeln!(out, "- generated_at_epoch_ms: {}", self.generated_at_epoch_ms);
        let _ = writeln!(out, "- host_platform: {}", self.host_platform);
        let _ = writeln!(out, "- total: {}", summary.total);
        let _ = writeln!(out, "- pass: {}", summary.pass);
        let _ = writeln!(out, "- fail: {}", summary.fail);
        let _ = writeln!(out, "- skip: {}", summary.skip);
        out.push('\n');
        for row in &self.results {
            let _ = writeln!(out, "[{}] {}::{}", row.status.as_str(), row.suite, row.id);
            for reason in &row.reasons {
                let _ = writeln!(out, "  - {reason}");
            }
        }
        out
    }

    pub fn write(&self, json_path: &Path, txt_path: &Path) -> Result<()> {
        write_json_pretty(json_path, self)?;
        write_text(txt_path, &self.render_text())
    }
}
