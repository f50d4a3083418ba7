//! Text normalization applied before baseline/candidate equality checks.
//!
//! Rules absorb cosmetic differences (ANSI styling, version strings, binary
//! names, whitespace) without touching anything else.
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const VERSION_PLACEHOLDER: &str = "<VER>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeRule {
    StripAnsi,
    CanonicalBinName,
    DropVersions,
    CollapseWs,
    Trim,
}

impl NormalizeRule {
    pub const DEFAULT_PIPELINE: [NormalizeRule; 5] = [
        NormalizeRule::StripAnsi,
        NormalizeRule::CanonicalBinName,
        NormalizeRule::DropVersions,
        NormalizeRule::CollapseWs,
        NormalizeRule::Trim,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NormalizeRule::StripAnsi => "strip_ansi",
            NormalizeRule::CanonicalBinName => "canonical_bin_name",
            NormalizeRule::DropVersions => "drop_versions",
            NormalizeRule::CollapseWs => "collapse_ws",
            NormalizeRule::Trim => "trim",
        }
    }

    fn apply(self, text: &str, names: &BinNames) -> String {
        match self {
            NormalizeRule::StripAnsi => strip_ansi(text),
            NormalizeRule::CanonicalBinName => names.canonicalize(text),
            NormalizeRule::DropVersions => version_re()
                .replace_all(text, VERSION_PLACEHOLDER)
                .into_owned(),
            NormalizeRule::CollapseWs => whitespace_re().replace_all(text, " ").into_owned(),
            NormalizeRule::Trim => text.trim().to_string(),
        }
    }
}

impl fmt::Display for NormalizeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizeRule {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "strip_ansi" => Ok(NormalizeRule::StripAnsi),
            "canonical_bin_name" => Ok(NormalizeRule::CanonicalBinName),
            "drop_versions" => Ok(NormalizeRule::DropVersions),
            "collapse_ws" => Ok(NormalizeRule::CollapseWs),
            "trim" => Ok(NormalizeRule::Trim),
            other => Err(format!("unknown normalizer {other:?}")),
        }
    }
}

/// Display names of the two executables, used by `canonical_bin_name`.
#[derive(Debug, Clone, Default)]
pub struct BinNames {
    baseline: String,
    matcher: Option<Regex>,
}

impl BinNames {
    pub fn new(baseline: impl Into<String>, candidate: impl Into<String>) -> Self {
        let baseline = baseline.into();
        let candidate = candidate.into();
        let matcher = if baseline.is_empty() || candidate.is_empty() || baseline == candidate {
            None
        } else {
            // Longest name first so an occurrence of the baseline name that
            // contains the candidate name is kept as-is.
            let (long, short) = if baseline.len() >= candidate.len() {
                (&baseline, &candidate)
            } else {
                (&candidate, &baseline)
            };
            Regex::new(&format!(
                "{}|{}",
                regex::escape(long),
                regex::escape(short)
            ))
            .ok()
        };
        BinNames { baseline, matcher }
    }

    fn canonicalize(&self, text: &str) -> String {
        match &self.matcher {
            Some(matcher) => matcher
                .replace_all(text, regex::NoExpand(&self.baseline))
                .into_owned(),
            None => text.to_string(),
        }
    }
}

/// Run `rules` in order until the text stops changing.
///
/// A later rule can expose a match for an earlier one (dropping a version
/// can join the halves of an escape sequence), so a single pass is not
/// always stable. Each rule is idempotent on its own, so a further pass only
/// changes text when an earlier one removed characters; passes are capped at
/// the input length.
pub fn normalize(text: &str, rules: &[NormalizeRule], names: &BinNames) -> String {
    let mut current = text.to_string();
    for _ in 0..=text.len() {
        let next = rules
            .iter()
            .fold(current.clone(), |acc, rule| rule.apply(&acc, names));
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Removing one sequence can splice its neighbours into another, so strip
/// until nothing matches. Every round shortens the text.
fn strip_ansi(text: &str) -> String {
    let mut current = text.to_string();
    while ansi_re().is_match(&current) {
        current = ansi_re().replace_all(&current, "").into_owned();
    }
    current
}

pub fn parse_rules(raw: &[String]) -> Result<Vec<NormalizeRule>, String> {
    raw.iter().map(|name| name.parse()).collect()
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"))
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\.\d+(?:\.\d+)?\b").expect("valid version regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}
