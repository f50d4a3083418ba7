//! Shared test infrastructure for integration tests.
//!
//! Each test builds a throwaway project root holding shell-script stand-ins
//! for the baseline and candidate binaries plus scenario documents, then
//! drives the compiled `parity` binary against it.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Reference implementation: stable behavior the candidate is judged by.
pub const BASELINE_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "tool 1.2.3" ;;
  --help) echo "usage: tool [OPTIONS]" ;;
  fail) echo "error: bad input" >&2; exit 2 ;;
  sleep) echo "done" ;;
  init) [ "$2" = "--force" ] && exit 2; exit 0 ;;
  *) echo "unknown: $1" >&2; exit 1 ;;
esac
"#;

/// Implementation under test: drifts in version, help text and timing.
pub const CANDIDATE_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "tool-next 1.4.0" ;;
  --help) echo "tool-next: a tool" ;;
  fail) echo "error: bad input" >&2; exit 2 ;;
  sleep) echo "partial"; sleep 5; echo "late" ;;
  init) [ "$2" = "--force" ] && exit 2; exit 0 ;;
  *) echo "unknown: $1" >&2; exit 1 ;;
esac
"#;

pub struct ParityProject {
    pub root: TempDir,
}

/// Captured `parity` invocation.
#[derive(Debug)]
pub struct ParityOutcome {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Default for ParityProject {
    fn default() -> Self {
        Self::new()
    }
}

impl ParityProject {
    /// Project with both scripts under `bin/` and an empty `scenarios/`.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create project root");
        let project = ParityProject { root };
        project.write_executable("bin/tool", BASELINE_SCRIPT);
        project.write_executable("bin/tool-next", CANDIDATE_SCRIPT);
        fs::create_dir_all(project.path().join("scenarios")).expect("create scenarios dir");
        project
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn write_executable(&self, rel: &str, script: &str) -> PathBuf {
        let path = self.write_file(rel, script);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("make script executable");
        }
        path
    }

    pub fn write_scenario(&self, name: &str, yaml: &str) {
        self.write_file(&format!("scenarios/{name}"), yaml);
    }

    /// `parity` with a clean environment for the harness's own settings.
    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_parity"));
        cmd.arg(subcommand)
            .arg("--root")
            .arg(self.path())
            .arg("--scenarios-dir")
            .arg("scenarios")
            .env_remove("PARITY_BASELINE_BIN")
            .env_remove("PARITY_BASELINE_DIR")
            .env_remove("PARITY_CANDIDATE_BIN")
            .env_remove("RUST_LOG");
        cmd
    }

    /// `parity run` against the two scripts plus any extra flags.
    pub fn run(&self, extra: &[&str]) -> ParityOutcome {
        self.run_with_env(extra, &[])
    }

    /// Like `run`, with extra environment for the `parity` process itself.
    pub fn run_with_env(&self, extra: &[&str], envs: &[(&str, &Path)]) -> ParityOutcome {
        let mut cmd = self.command("run");
        cmd.args(["--baseline-bin", "bin/tool", "--candidate-bin", "bin/tool-next"])
            .args(extra);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        outcome(&mut cmd)
    }

    pub fn report_json(&self) -> serde_json::Value {
        let path = self.path().join("build/parity/report.json");
        let text = fs::read_to_string(&path).expect("read report json");
        serde_json::from_str(&text).expect("parse report json")
    }

    pub fn report_text(&self) -> String {
        fs::read_to_string(self.path().join("build/parity/report.txt")).expect("read report text")
    }

    /// Result row for `suite::id`.
    pub fn result(&self, suite: &str, id: &str) -> serde_json::Value {
        let report = self.report_json();
        report["results"]
            .as_array()
            .expect("results array")
            .iter()
            .find(|row| row["suite"] == suite && row["id"] == id)
            .cloned()
            .unwrap_or_else(|| panic!("no result for {suite}::{id}"))
    }
}

pub fn outcome(cmd: &mut Command) -> ParityOutcome {
    let output = cmd.output().expect("spawn parity");
    ParityOutcome {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

pub fn reasons(row: &serde_json::Value) -> Vec<String> {
    row["reasons"]
        .as_array()
        .expect("reasons array")
        .iter()
        .map(|reason| reason.as_str().expect("reason string").to_string())
        .collect()
}
