//! Scenario discovery, parsing and eager validation.
//!
//! Documents are YAML (JSON is accepted as a YAML subset). A document with
//! the wrong top-level shape is a `MalformedSuite`; a bad case entry becomes
//! a `MalformedCase` so it is reported rather than dropped.
use super::normalize::parse_rules;
use super::run::build_regex;
use super::types::{CaseDoc, ExitCodeDoc, ExpectDoc, StepDoc, Text};
use super::{
    Case, ExitPolicy, Expectation, MalformedCase, Sided, Step, Suite, SuiteEntry,
    SCENARIO_EXTENSIONS,
};
use crate::error::HarnessError;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Sorted scenario documents directly inside `dir`.
pub fn discover_scenario_files(dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !dir.is_dir() {
        return Err(HarnessError::ScenarioDirMissing {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|_| HarnessError::ScenarioDirMissing {
        path: dir.to_path_buf(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SCENARIO_EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(HarnessError::NoScenarios {
            path: dir.to_path_buf(),
        });
    }
    Ok(files)
}

/// Suite name used when a document does not declare one.
pub fn default_suite_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "suite".to_string())
}

pub fn load_suite(path: &Path) -> Result<Suite, HarnessError> {
    let text = fs::read_to_string(path)
        .map_err(|err| HarnessError::malformed_suite(path, format!("read failed: {err}")))?;
    parse_suite(&text, path)
}

pub fn parse_suite(text: &str, source: &Path) -> Result<Suite, HarnessError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|err| HarnessError::malformed_suite(source, format!("parse failed: {err}")))?;
    let serde_yaml::Value::Mapping(map) = doc else {
        return Err(HarnessError::malformed_suite(
            source,
            "top-level document must be a mapping",
        ));
    };
    let name = match map.get("suite") {
        Some(serde_yaml::Value::String(name)) if !name.trim().is_empty() => {
            name.trim().to_string()
        }
        _ => default_suite_name(source),
    };
    let cases = match map.get("cases") {
        Some(serde_yaml::Value::Sequence(cases)) => cases,
        Some(_) => {
            return Err(HarnessError::malformed_suite(
                source,
                "`cases` must be a sequence",
            ))
        }
        None => {
            return Err(HarnessError::malformed_suite(
                source,
                "missing `cases` sequence",
            ))
        }
    };

    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(cases.len());
    for (index, value) in cases.iter().enumerate() {
        let mut entry = parse_case_entry(value, &name, index);
        if !seen.insert(entry.id().to_string()) {
            entry = SuiteEntry::Malformed(MalformedCase {
                index,
                id: entry.id().to_string(),
                description: String::new(),
                reason: format!("duplicate case id {:?} in suite {name}", entry.id()),
            });
        }
        if let SuiteEntry::Malformed(malformed) = &entry {
            warn!(suite = %name, case = %malformed.id, reason = %malformed.reason, "malformed case");
        }
        entries.push(entry);
    }

    Ok(Suite {
        name,
        source: source.to_path_buf(),
        entries,
    })
}

fn parse_case_entry(value: &serde_yaml::Value, suite: &str, index: usize) -> SuiteEntry {
    let default_id = format!("{suite}-{index}");
    // A null entry is an empty case: one implicit step with no arguments.
    let value = match value {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        serde_yaml::Value::Mapping(_) => value.clone(),
        _ => {
            return SuiteEntry::Malformed(MalformedCase {
                index,
                id: default_id,
                description: String::new(),
                reason: format!("case #{index} is not a mapping"),
            })
        }
    };
    let declared_id = value
        .get("id")
        .and_then(scalar_string)
        .filter(|id| !id.trim().is_empty())
        .map(|id| id.trim().to_string());
    let id = declared_id.unwrap_or(default_id);
    let description = value
        .get("description")
        .and_then(scalar_string)
        .unwrap_or_default();

    let doc: CaseDoc = match serde_yaml::from_value(value) {
        Ok(doc) => doc,
        Err(err) => {
            return SuiteEntry::Malformed(MalformedCase {
                index,
                id,
                description,
                reason: format!("invalid case: {err}"),
            })
        }
    };
    match build_case(doc, id.clone()) {
        Ok(case) => SuiteEntry::Case(Box::new(case)),
        Err(reason) => SuiteEntry::Malformed(MalformedCase {
            index,
            id,
            description,
            reason,
        }),
    }
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn build_case(doc: CaseDoc, id: String) -> Result<Case, String> {
    let CaseDoc {
        description,
        platforms,
        requires_direct_bin,
        files,
        steps,
        source_checks,
        expect,
        step,
        ..
    } = doc;

    let platforms = platforms
        .map(|platforms| platforms.into_vec())
        .unwrap_or_else(|| vec![super::gate::ALL_PLATFORMS.to_string()])
        .into_iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    if platforms.is_empty() {
        return Err("platforms must not be empty".to_string());
    }

    for (idx, file) in files.iter().enumerate() {
        let raw = file.path.trim();
        if raw.is_empty() {
            return Err(format!("files[{idx}].path must not be empty"));
        }
        // Templated paths are checked against the case directory at run time.
        if !raw.contains("{{") && escapes_case_dir(Path::new(raw)) {
            return Err(format!(
                "files[{idx}].path must be relative and must not contain '..', got {raw:?}"
            ));
        }
    }

    let case_step = build_step(step);
    let timeout_sec = case_step.timeout_sec.clone();
    let steps = if steps.is_empty() {
        vec![case_step]
    } else {
        steps.into_iter().map(build_step).collect()
    };
    for timeout in steps
        .iter()
        .flat_map(|step| step.timeout_sec.declared())
        .chain(timeout_sec.declared())
    {
        if !timeout.is_finite() || *timeout <= 0.0 {
            return Err(format!("timeout_sec must be positive, got {timeout}"));
        }
        if *timeout > super::MAX_TIMEOUT_SEC {
            return Err(format!(
                "timeout_sec must be at most {}, got {timeout}",
                super::MAX_TIMEOUT_SEC
            ));
        }
    }

    let expect = build_expectation(expect)?;

    Ok(Case {
        id,
        description: description.map(Text::into_string).unwrap_or_default(),
        platforms,
        requires_direct_bin,
        steps,
        timeout_sec,
        files,
        source_checks,
        expect,
    })
}

fn escapes_case_dir(path: &Path) -> bool {
    path.components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
}

fn build_step(doc: StepDoc) -> Step {
    fn texts(values: Option<Vec<Text>>) -> Option<Vec<String>> {
        values.map(|values| values.into_iter().map(Text::into_string).collect())
    }
    fn text(value: Option<Text>) -> Option<String> {
        value.map(Text::into_string)
    }
    fn env(values: Option<BTreeMap<String, Text>>) -> Option<BTreeMap<String, String>> {
        values.map(|values| {
            values
                .into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect()
        })
    }

    Step {
        args: Sided::new(
            texts(doc.args),
            texts(doc.baseline_args),
            texts(doc.cheng_args),
        ),
        stdin: Sided::new(
            text(doc.stdin),
            text(doc.baseline_stdin),
            text(doc.cheng_stdin),
        ),
        env: Sided::new(env(doc.env), env(doc.baseline_env), env(doc.cheng_env)),
        cwd: Sided::new(text(doc.cwd), text(doc.baseline_cwd), text(doc.cheng_cwd)),
        timeout_sec: Sided::new(
            doc.timeout_sec,
            doc.baseline_timeout_sec,
            doc.cheng_timeout_sec,
        ),
        argv0: Sided::new(
            text(doc.argv0),
            text(doc.baseline_argv0),
            text(doc.cheng_argv0),
        ),
    }
}

fn build_expectation(doc: ExpectDoc) -> Result<Expectation, String> {
    let exit = if doc.ignore_exit_code {
        ExitPolicy::Ignore
    } else if doc.both_nonzero {
        ExitPolicy::BothNonZero
    } else {
        match doc.exit_code {
            None => ExitPolicy::Equal,
            Some(ExitCodeDoc::Code(code)) => ExitPolicy::Exactly(code),
            Some(ExitCodeDoc::Keyword(keyword)) if keyword.trim() == "equal" => ExitPolicy::Equal,
            Some(ExitCodeDoc::Keyword(keyword)) => {
                return Err(format!(
                    "expect.exit_code must be an integer or \"equal\", got {keyword:?}"
                ))
            }
        }
    };

    let baseline_output = doc.baseline.unwrap_or_default();
    let candidate_output = doc.cheng.unwrap_or_default();
    for pattern in doc
        .output
        .regexes()
        .chain(baseline_output.regexes())
        .chain(candidate_output.regexes())
    {
        build_regex(pattern).map_err(|err| format!("invalid regex /{pattern}/: {err}"))?;
    }

    let normalizers = match doc.normalizers {
        Some(names) => parse_rules(&names)?,
        None => super::NormalizeRule::DEFAULT_PIPELINE.to_vec(),
    };

    Ok(Expectation {
        exit,
        exit_code: Sided::new(None, doc.baseline_exit_code, doc.cheng_exit_code),
        output: doc.output,
        baseline_output,
        candidate_output,
        paths_exist: Sided::new(
            doc.paths_exist,
            doc.baseline_paths_exist,
            doc.cheng_paths_exist,
        ),
        normalized_stdout_equal: doc.normalized_stdout_equal,
        normalized_stderr_equal: doc.normalized_stderr_equal,
        normalizers,
    })
}
