//! Scenario document schema and the typed records it resolves into.
//!
//! The `*Doc` structs mirror the on-disk scenario shape (all fields optional,
//! side-prefixed keys flattened). The loader converts them into `Case`,
//! `Step` and `Expectation`, which carry explicit defaults and are what the
//! executor and comparator consume.
use super::normalize::NormalizeRule;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Which implementation a step or check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Baseline,
    Candidate,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Baseline, Side::Candidate];

    /// Label used in failure reasons, reports and side-prefixed keys.
    pub fn label(self) -> &'static str {
        match self {
            Side::Baseline => "baseline",
            Side::Candidate => "cheng",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value that may be specialized per side.
///
/// `resolve` is the only place the precedence rule lives: a side-specific
/// value shadows the shared one.
#[derive(Debug, Clone, PartialEq)]
pub struct Sided<T> {
    pub shared: Option<T>,
    pub baseline: Option<T>,
    pub candidate: Option<T>,
}

impl<T> Default for Sided<T> {
    fn default() -> Self {
        Sided {
            shared: None,
            baseline: None,
            candidate: None,
        }
    }
}

impl<T> Sided<T> {
    pub fn new(shared: Option<T>, baseline: Option<T>, candidate: Option<T>) -> Self {
        Sided {
            shared,
            baseline,
            candidate,
        }
    }

    pub fn resolve(&self, side: Side) -> Option<&T> {
        let specific = match side {
            Side::Baseline => self.baseline.as_ref(),
            Side::Candidate => self.candidate.as_ref(),
        };
        specific.or(self.shared.as_ref())
    }

    /// Shared value followed by the side's own, for checks that add up
    /// instead of shadowing.
    pub fn layered(&self, side: Side) -> impl Iterator<Item = &T> {
        let specific = match side {
            Side::Baseline => self.baseline.as_ref(),
            Side::Candidate => self.candidate.as_ref(),
        };
        self.shared.iter().chain(specific)
    }

    /// Every declared value regardless of side, for load-time validation.
    pub fn declared(&self) -> impl Iterator<Item = &T> {
        [&self.shared, &self.baseline, &self.candidate]
            .into_iter()
            .flatten()
    }
}

/// One process invocation within a case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub args: Sided<Vec<String>>,
    pub stdin: Sided<String>,
    pub env: Sided<BTreeMap<String, String>>,
    pub cwd: Sided<String>,
    pub timeout_sec: Sided<f64>,
    pub argv0: Sided<String>,
}

/// File written into the side's ephemeral directory before any step runs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FileFixture {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: Text,
}

/// Assertion about a source artifact, resolved against the project root.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceCheck {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub contains: String,
}

/// Text presence checks against one side's combined output.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputChecks {
    pub stdout_contains: Vec<String>,
    pub stderr_contains: Vec<String>,
    pub stdout_not_contains: Vec<String>,
    pub stderr_not_contains: Vec<String>,
    pub stdout_regex: Vec<String>,
    pub stderr_regex: Vec<String>,
}

impl OutputChecks {
    pub fn is_empty(&self) -> bool {
        self.stdout_contains.is_empty()
            && self.stderr_contains.is_empty()
            && self.stdout_not_contains.is_empty()
            && self.stderr_not_contains.is_empty()
            && self.stdout_regex.is_empty()
            && self.stderr_regex.is_empty()
    }

    pub fn regexes(&self) -> impl Iterator<Item = &String> {
        self.stdout_regex.iter().chain(self.stderr_regex.iter())
    }
}

/// Main exit-code policy; exactly one applies per case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Baseline and candidate must exit with the same code.
    #[default]
    Equal,
    /// Each side must individually exit non-zero.
    BothNonZero,
    /// Both sides must exit with this code.
    Exactly(i32),
    /// No exit-code assertions at all, including per-side codes.
    Ignore,
}

/// Assertion bundle for a case. Absent checks are not evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub exit: ExitPolicy,
    pub exit_code: Sided<i32>,
    /// Applied to both sides.
    pub output: OutputChecks,
    pub baseline_output: OutputChecks,
    pub candidate_output: OutputChecks,
    pub paths_exist: Sided<Vec<String>>,
    pub normalized_stdout_equal: bool,
    pub normalized_stderr_equal: bool,
    pub normalizers: Vec<NormalizeRule>,
}

impl Default for Expectation {
    fn default() -> Self {
        Expectation {
            exit: ExitPolicy::Equal,
            exit_code: Sided::default(),
            output: OutputChecks::default(),
            baseline_output: OutputChecks::default(),
            candidate_output: OutputChecks::default(),
            paths_exist: Sided::default(),
            normalized_stdout_equal: false,
            normalized_stderr_equal: false,
            normalizers: NormalizeRule::DEFAULT_PIPELINE.to_vec(),
        }
    }
}

impl Expectation {
    pub fn side_output(&self, side: Side) -> &OutputChecks {
        match side {
            Side::Baseline => &self.baseline_output,
            Side::Candidate => &self.candidate_output,
        }
    }
}

/// The unit of comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub id: String,
    pub description: String,
    /// Lower-cased platform names; contains `all` when undeclared.
    pub platforms: Vec<String>,
    pub requires_direct_bin: bool,
    /// Never empty: an undeclared sequence becomes one implicit step.
    pub steps: Vec<Step>,
    /// Case-wide timeout fallback for steps that declare none.
    pub timeout_sec: Sided<f64>,
    pub files: Vec<FileFixture>,
    pub source_checks: Vec<SourceCheck>,
    pub expect: Expectation,
}

/// Case entry that failed load-time validation; reported as a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCase {
    pub index: usize,
    pub id: String,
    pub description: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuiteEntry {
    Case(Box<Case>),
    Malformed(MalformedCase),
}

impl SuiteEntry {
    pub fn id(&self) -> &str {
        match self {
            SuiteEntry::Case(case) => &case.id,
            SuiteEntry::Malformed(entry) => &entry.id,
        }
    }
}

/// Ordered collection of cases loaded from one scenario document.
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub name: String,
    pub source: PathBuf,
    pub entries: Vec<SuiteEntry>,
}

impl Suite {
    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.entries.iter().filter_map(|entry| match entry {
            SuiteEntry::Case(case) => Some(case.as_ref()),
            SuiteEntry::Malformed(_) => None,
        })
    }
}

/// String field that also accepts YAML numbers and booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text(pub String);

impl Text {
    pub fn into_string(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TextVisitor;

        impl Visitor<'_> for TextVisitor {
            type Value = Text;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Text, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Text, E> {
                Ok(Text(value))
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Text, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Text, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Text, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Text, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Text, E> {
                Ok(Text(String::new()))
            }
        }

        deserializer.deserialize_any(TextVisitor)
    }
}

/// `platforms` accepts a single name or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// `exit_code` is either an integer or the keyword `equal`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExitCodeDoc {
    Code(i32),
    Keyword(String),
}

/// Step fields as written in a document, shared and side-prefixed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StepDoc {
    pub(crate) args: Option<Vec<Text>>,
    pub(crate) baseline_args: Option<Vec<Text>>,
    #[serde(alias = "candidate_args")]
    pub(crate) cheng_args: Option<Vec<Text>>,
    pub(crate) stdin: Option<Text>,
    pub(crate) baseline_stdin: Option<Text>,
    #[serde(alias = "candidate_stdin")]
    pub(crate) cheng_stdin: Option<Text>,
    pub(crate) env: Option<BTreeMap<String, Text>>,
    pub(crate) baseline_env: Option<BTreeMap<String, Text>>,
    #[serde(alias = "candidate_env")]
    pub(crate) cheng_env: Option<BTreeMap<String, Text>>,
    pub(crate) cwd: Option<Text>,
    pub(crate) baseline_cwd: Option<Text>,
    #[serde(alias = "candidate_cwd")]
    pub(crate) cheng_cwd: Option<Text>,
    pub(crate) timeout_sec: Option<f64>,
    pub(crate) baseline_timeout_sec: Option<f64>,
    #[serde(alias = "candidate_timeout_sec")]
    pub(crate) cheng_timeout_sec: Option<f64>,
    pub(crate) argv0: Option<Text>,
    pub(crate) baseline_argv0: Option<Text>,
    #[serde(alias = "candidate_argv0")]
    pub(crate) cheng_argv0: Option<Text>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ExpectDoc {
    pub(crate) ignore_exit_code: bool,
    pub(crate) both_nonzero: bool,
    pub(crate) exit_code: Option<ExitCodeDoc>,
    pub(crate) baseline_exit_code: Option<i32>,
    #[serde(alias = "candidate_exit_code")]
    pub(crate) cheng_exit_code: Option<i32>,
    #[serde(flatten)]
    pub(crate) output: OutputChecks,
    pub(crate) baseline: Option<OutputChecks>,
    #[serde(alias = "candidate")]
    pub(crate) cheng: Option<OutputChecks>,
    pub(crate) paths_exist: Option<Vec<String>>,
    pub(crate) baseline_paths_exist: Option<Vec<String>>,
    #[serde(alias = "candidate_paths_exist")]
    pub(crate) cheng_paths_exist: Option<Vec<String>>,
    pub(crate) normalized_stdout_equal: bool,
    pub(crate) normalized_stderr_equal: bool,
    pub(crate) normalizers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CaseDoc {
    pub(crate) id: Option<Text>,
    pub(crate) description: Option<Text>,
    pub(crate) platforms: Option<OneOrMany>,
    pub(crate) requires_direct_bin: bool,
    pub(crate) files: Vec<FileFixture>,
    pub(crate) steps: Vec<StepDoc>,
    pub(crate) source_checks: Vec<SourceCheck>,
    pub(crate) expect: ExpectDoc,
    /// Case-level step fields: the implicit step when `steps` is empty.
    #[serde(flatten)]
    pub(crate) step: StepDoc,
}
