//! Platform and capability admission for cases.
//!
//! Decisions depend only on the case declaration, the host platform and
//! whether the baseline is a direct executable, so they are repeatable and
//! have no side effects.
use super::Case;
use serde::Serialize;
use std::fmt;

pub const ALL_PLATFORMS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Unknown,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Skip(String),
}

pub fn admit(case: &Case, host: Platform, baseline_direct: bool) -> GateDecision {
    let platform_ok = case
        .platforms
        .iter()
        .any(|name| name == ALL_PLATFORMS || name == host.as_str());
    if !platform_ok {
        return GateDecision::Skip(format!(
            "platform {host} not in [{}]",
            case.platforms.join(", ")
        ));
    }
    if case.requires_direct_bin && !baseline_direct {
        return GateDecision::Skip(
            "requires a direct baseline binary (--baseline-bin or target/debug build); \
             baseline only runs through cargo"
                .to_string(),
        );
    }
    GateDecision::Admit
}
