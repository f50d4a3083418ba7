use super::{evaluate, quoted, CompareContext};
use crate::scenarios::load::parse_suite;
use crate::scenarios::normalize::BinNames;
use crate::scenarios::run::exec::ExecutionRecord;
use crate::scenarios::{Case, Side, TIMEOUT_EXIT_CODE};
use std::path::Path;

fn case_from(yaml: &str) -> Case {
    let suite = parse_suite(yaml, Path::new("validate.yaml")).expect("parse suite");
    let case = suite.cases().next().cloned().expect("one case");
    case
}

fn baseline(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionRecord {
    ExecutionRecord::synthetic(Side::Baseline, exit_code, stdout, stderr)
}

fn candidate(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionRecord {
    ExecutionRecord::synthetic(Side::Candidate, exit_code, stdout, stderr)
}

fn eval_with_root(case: &Case, b: &ExecutionRecord, c: &ExecutionRecord, root: &Path) -> Vec<String> {
    let names = BinNames::new("tool", "tool-next");
    let compare = CompareContext {
        project_root: root,
        names: &names,
    };
    evaluate(case, b, c, &compare)
}

fn eval(case: &Case, b: &ExecutionRecord, c: &ExecutionRecord) -> Vec<String> {
    eval_with_root(case, b, c, Path::new("/nonexistent-project"))
}

#[test]
fn empty_expectation_only_checks_exit_equality() {
    let case = case_from("cases:\n  - id: bare\n");
    assert!(eval(&case, &baseline(0, "a", ""), &candidate(0, "b", "x")).is_empty());
    assert_eq!(
        eval(&case, &baseline(0, "", ""), &candidate(1, "", "")),
        vec!["exit code mismatch: baseline=0 cheng=1".to_string()]
    );
}

#[test]
fn both_nonzero_checks_each_side_independently() {
    let case = case_from("cases:\n  - id: nz\n    expect: {both_nonzero: true}\n");
    for (b, c) in [(0, 0), (0, 2), (1, 0), (1, 2), (3, 3)] {
        let failures = eval(&case, &baseline(b, "", ""), &candidate(c, "", ""));
        assert_eq!(failures.is_empty(), b != 0 && c != 0, "codes {b} {c}");
        if b == 0 {
            assert!(failures.contains(&"baseline exit code must be non-zero".to_string()));
        }
        if c == 0 {
            assert!(failures.contains(&"cheng exit code must be non-zero".to_string()));
        }
    }
}

#[test]
fn explicit_exit_code_applies_to_both_sides() {
    let case = case_from("cases:\n  - id: code\n    expect: {exit_code: 2}\n");
    let failures = eval(&case, &baseline(2, "", ""), &candidate(0, "", ""));
    assert_eq!(
        failures,
        vec!["cheng exit code mismatch: expected 2, got 0".to_string()]
    );
}

#[test]
fn per_side_exit_code_is_independent_of_the_main_policy() {
    let case = case_from(
        "cases:\n  - id: per-side\n    steps:\n      - args: [init]\n      - args: [init]\n        cheng_args: [init, --force]\n    expect: {cheng_exit_code: 2, both_nonzero: true}\n",
    );
    assert!(eval(&case, &baseline(1, "", ""), &candidate(2, "", "")).is_empty());
    assert_eq!(
        eval(&case, &baseline(1, "", ""), &candidate(1, "", "")),
        vec!["cheng exit code must be 2".to_string()]
    );
}

#[test]
fn ignore_exit_code_skips_every_exit_check() {
    let case = case_from(
        "cases:\n  - id: ignore\n    expect: {ignore_exit_code: true, baseline_exit_code: 4}\n",
    );
    assert!(eval(&case, &baseline(0, "", ""), &candidate(9, "", "")).is_empty());
}

#[test]
fn candidate_timeout_surfaces_as_exit_mismatch() {
    let case = case_from("cases:\n  - id: slow\n    timeout_sec: 1\n");
    let failures = eval(
        &case,
        &baseline(0, "", ""),
        &candidate(TIMEOUT_EXIT_CODE, "partial", ""),
    );
    assert_eq!(
        failures,
        vec![format!("exit code mismatch: baseline=0 cheng={TIMEOUT_EXIT_CODE}")]
    );
}

#[test]
fn candidate_only_block_does_not_check_baseline() {
    let case = case_from(
        "cases:\n  - id: usage\n    expect:\n      cheng:\n        stdout_contains: ['usage:']\n",
    );
    let failures = eval(&case, &baseline(0, "", ""), &candidate(0, "help text\n", ""));
    assert_eq!(failures, vec!["cheng.stdout missing text: 'usage:'".to_string()]);
}

#[test]
fn shared_and_side_blocks_accumulate() {
    let case = case_from(
        "cases:\n  - id: layered\n    expect:\n      stdout_contains: [ok]\n      stderr_not_contains: [panic]\n      stdout_regex: ['^done$']\n      baseline:\n        stderr_contains: [warn]\n",
    );
    let failures = eval(
        &case,
        &baseline(0, "ok\ndone\n", "quiet"),
        &candidate(0, "nope\n", "thread panicked: panic"),
    );
    assert_eq!(
        failures,
        vec![
            "cheng.stdout missing text: 'ok'".to_string(),
            "cheng.stderr must not contain: 'panic'".to_string(),
            "cheng.stdout missing regex: /^done$/".to_string(),
            "baseline.stderr missing text: 'warn'".to_string(),
        ]
    );
}

#[test]
fn paths_exist_resolves_against_each_sides_directory() {
    let case = case_from(
        "cases:\n  - id: paths\n    expect:\n      paths_exist: ['{{CASE_TMP}}/out.txt']\n      cheng_paths_exist: [cand.txt]\n",
    );
    let b = baseline(0, "", "");
    let c = candidate(0, "", "");
    std::fs::write(b.tmp_path().join("out.txt"), "x").expect("write baseline file");
    std::fs::write(c.tmp_path().join("out.txt"), "x").expect("write candidate file");
    // Present in the baseline dir only: must not satisfy the candidate check.
    std::fs::write(b.tmp_path().join("cand.txt"), "x").expect("write stray file");

    let failures = eval(&case, &b, &c);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("cheng expected path missing: "));
    assert!(failures[0].ends_with("cand.txt"));

    std::fs::write(c.tmp_path().join("cand.txt"), "x").expect("write candidate file");
    assert!(eval(&case, &b, &c).is_empty());
}

#[test]
fn side_paths_add_to_shared_paths() {
    let case = case_from(
        "cases:\n  - id: paths\n    expect:\n      paths_exist: [shared.txt]\n      cheng_paths_exist: [cand.txt]\n",
    );
    let b = baseline(0, "", "");
    let c = candidate(0, "", "");
    std::fs::write(b.tmp_path().join("shared.txt"), "x").expect("write baseline file");
    std::fs::write(c.tmp_path().join("cand.txt"), "x").expect("write candidate file");

    let failures = eval(&case, &b, &c);
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert!(failures[0].starts_with("cheng expected path missing: "));
    assert!(failures[0].ends_with("shared.txt"));
}

#[test]
fn normalized_stdout_absorbs_version_drift() {
    let case = case_from(
        "cases:\n  - id: version\n    args: [--version]\n    expect: {normalized_stdout_equal: true}\n",
    );
    let failures = eval(
        &case,
        &baseline(0, "tool 1.2.3\n", ""),
        &candidate(0, "tool-next 1.4.0\n", ""),
    );
    assert!(failures.is_empty(), "{failures:?}");

    let drift = eval(
        &case,
        &baseline(0, "tool 1.2.3\n", ""),
        &candidate(0, "tool 1.2.3 (beta)\n", ""),
    );
    assert_eq!(drift.len(), 1);
    assert!(drift[0].starts_with("normalized stdout mismatch"));
}

#[test]
fn identical_output_passes_for_any_rule_order() {
    for rules in [
        "[]",
        "[trim, strip_ansi]",
        "[collapse_ws, drop_versions, canonical_bin_name]",
    ] {
        let case = case_from(&format!(
            "cases:\n  - id: same\n    expect:\n      normalized_stdout_equal: true\n      normalized_stderr_equal: true\n      normalizers: {rules}\n"
        ));
        let out = "\x1b[1mtool\x1b[0m  1.0\n";
        assert!(eval(&case, &baseline(0, out, out), &candidate(0, out, out)).is_empty());
    }
}

#[test]
fn normalized_stderr_uses_case_rules() {
    let case = case_from(
        "cases:\n  - id: err\n    expect:\n      normalized_stderr_equal: true\n      normalizers: [trim]\n",
    );
    let failures = eval(
        &case,
        &baseline(1, "", "error: a  b\n"),
        &candidate(1, "", "  error: a b"),
    );
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("normalized stderr mismatch"));
}

#[test]
fn source_checks_read_from_project_root() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(root.path().join("src")).expect("create src");
    std::fs::write(root.path().join("src/main.rs"), "fn dispatch_argv0() {}\n")
        .expect("write source");
    let case = case_from(
        "cases:\n  - id: src\n    source_checks:\n      - {path: src/main.rs, contains: dispatch_argv0}\n      - {path: src/main.rs, contains: missing_fn}\n      - {path: src/gone.rs, contains: x}\n      - {path: '', contains: x}\n",
    );
    let failures = eval_with_root(&case, &baseline(0, "", ""), &candidate(0, "", ""), root.path());
    assert_eq!(
        failures,
        vec![
            "source check missing text in src/main.rs: 'missing_fn'".to_string(),
            "source check missing file: src/gone.rs".to_string(),
        ]
    );
}

#[test]
fn every_divergence_is_reported() {
    let case = case_from(
        "cases:\n  - id: many\n    expect:\n      exit_code: 0\n      stdout_contains: [x]\n      normalized_stdout_equal: true\n",
    );
    let failures = eval(&case, &baseline(1, "a", ""), &candidate(2, "b", ""));
    assert_eq!(failures.len(), 5, "{failures:?}");
}

#[test]
fn quoting_follows_the_needle_content() {
    assert_eq!(quoted("usage:"), "'usage:'");
    assert_eq!(quoted("it's"), "\"it's\"");
    assert_eq!(quoted("a'\"b"), "'a\\'\"b'");
}
