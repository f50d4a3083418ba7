use super::exec::ExecutionRecord;
use crate::scenarios::normalize::{normalize, BinNames};
use crate::scenarios::{Case, ExitPolicy, OutputChecks, Side};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;

/// Inputs to comparison that do not come from the case itself.
pub struct CompareContext<'a> {
    pub project_root: &'a Path,
    pub names: &'a BinNames,
}

/// Patterns are matched line-aware so `^`/`$` anchor on output lines.
pub fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).multi_line(true).build()
}

/// Every failed check for a case, in evaluation order. Empty means pass.
pub fn evaluate(
    case: &Case,
    baseline: &ExecutionRecord,
    candidate: &ExecutionRecord,
    compare: &CompareContext<'_>,
) -> Vec<String> {
    let mut failures = Vec::new();
    let expect = &case.expect;

    check_sources(case, compare.project_root, &mut failures);
    check_exit_codes(case, baseline, candidate, &mut failures);

    for record in [baseline, candidate] {
        check_output(record, &expect.output, &mut failures);
    }
    for record in [baseline, candidate] {
        check_output(record, expect.side_output(record.side), &mut failures);
    }

    for record in [baseline, candidate] {
        for raw in expect.paths_exist.layered(record.side).flatten() {
            let rendered = record.context.render_str(raw);
            let path = record.tmp_path().join(&rendered);
            if !path.exists() {
                failures.push(format!(
                    "{} expected path missing: {}",
                    record.side,
                    path.display()
                ));
            }
        }
    }

    if expect.normalized_stdout_equal {
        compare_normalized(
            "stdout",
            &baseline.stdout,
            &candidate.stdout,
            case,
            compare,
            &mut failures,
        );
    }
    if expect.normalized_stderr_equal {
        compare_normalized(
            "stderr",
            &baseline.stderr,
            &candidate.stderr,
            case,
            compare,
            &mut failures,
        );
    }

    failures
}

fn check_sources(case: &Case, project_root: &Path, failures: &mut Vec<String>) {
    for check in &case.source_checks {
        let rel = check.path.trim();
        if rel.is_empty() || check.contains.is_empty() {
            continue;
        }
        let path = project_root.join(rel);
        let Ok(bytes) = fs::read(&path) else {
            failures.push(format!("source check missing file: {rel}"));
            continue;
        };
        if !String::from_utf8_lossy(&bytes).contains(check.contains.as_str()) {
            failures.push(format!(
                "source check missing text in {rel}: {}",
                quoted(&check.contains)
            ));
        }
    }
}

fn check_exit_codes(
    case: &Case,
    baseline: &ExecutionRecord,
    candidate: &ExecutionRecord,
    failures: &mut Vec<String>,
) {
    let expect = &case.expect;
    match expect.exit {
        ExitPolicy::Ignore => return,
        ExitPolicy::BothNonZero => {
            for record in [baseline, candidate] {
                if record.exit_code == 0 {
                    failures.push(format!("{} exit code must be non-zero", record.side));
                }
            }
        }
        ExitPolicy::Exactly(code) => {
            for record in [baseline, candidate] {
                if record.exit_code != code {
                    failures.push(format!(
                        "{} exit code mismatch: expected {code}, got {}",
                        record.side, record.exit_code
                    ));
                }
            }
        }
        ExitPolicy::Equal => {
            if baseline.exit_code != candidate.exit_code {
                failures.push(format!(
                    "exit code mismatch: {}={} {}={}",
                    Side::Baseline,
                    baseline.exit_code,
                    Side::Candidate,
                    candidate.exit_code
                ));
            }
        }
    }

    for record in [baseline, candidate] {
        if let Some(code) = expect.exit_code.resolve(record.side) {
            if record.exit_code != *code {
                failures.push(format!("{} exit code must be {code}", record.side));
            }
        }
    }
}

fn check_output(record: &ExecutionRecord, checks: &OutputChecks, failures: &mut Vec<String>) {
    if checks.is_empty() {
        return;
    }
    let stdout_label = format!("{}.stdout", record.side);
    let stderr_label = format!("{}.stderr", record.side);
    check_contains(&stdout_label, &record.stdout, &checks.stdout_contains, failures);
    check_contains(&stderr_label, &record.stderr, &checks.stderr_contains, failures);
    check_not_contains(&stdout_label, &record.stdout, &checks.stdout_not_contains, failures);
    check_not_contains(&stderr_label, &record.stderr, &checks.stderr_not_contains, failures);
    check_regex(&stdout_label, &record.stdout, &checks.stdout_regex, failures);
    check_regex(&stderr_label, &record.stderr, &checks.stderr_regex, failures);
}

fn check_contains(label: &str, text: &str, needles: &[String], failures: &mut Vec<String>) {
    for needle in needles {
        if !text.contains(needle.as_str()) {
            failures.push(format!("{label} missing text: {}", quoted(needle)));
        }
    }
}

fn check_not_contains(label: &str, text: &str, needles: &[String], failures: &mut Vec<String>) {
    for needle in needles {
        if text.contains(needle.as_str()) {
            failures.push(format!("{label} must not contain: {}", quoted(needle)));
        }
    }
}

fn check_regex(label: &str, text: &str, patterns: &[String], failures: &mut Vec<String>) {
    for pattern in patterns {
        match build_regex(pattern) {
            Ok(re) => {
                if !re.is_match(text) {
                    failures.push(format!("{label} missing regex: /{pattern}/"));
                }
            }
            // Patterns are validated at load; this only guards hand-built cases.
            Err(err) => failures.push(format!("{label} invalid regex /{pattern}/: {err}")),
        }
    }
}

fn compare_normalized(
    stream: &str,
    baseline: &str,
    candidate: &str,
    case: &Case,
    compare: &CompareContext<'_>,
    failures: &mut Vec<String>,
) {
    let rules = &case.expect.normalizers;
    let left = normalize(baseline, rules, compare.names);
    let right = normalize(candidate, rules, compare.names);
    if left == right {
        return;
    }
    let offset = left
        .chars()
        .zip(right.chars())
        .take_while(|(a, b)| a == b)
        .count();
    failures.push(format!(
        "normalized {stream} mismatch (first difference at char {offset})"
    ));
}

/// Single-quoted rendering of a needle, switching to double quotes when the
/// text itself contains a single quote.
fn quoted(text: &str) -> String {
    if text.contains('\'') && !text.contains('"') {
        return format!("\"{}\"", text.replace('\\', "\\\\"));
    }
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
