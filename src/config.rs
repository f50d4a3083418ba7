//! Run configuration.
//!
//! Values layer as CLI flag, then environment, then `parity.json`, then the
//! built-in default. Relative paths resolve against the project root.
use crate::cli::{BinaryArgs, OutputArgs, SourceArgs};
use crate::error::HarnessError;
use crate::invocation::BinarySettings;
use crate::scenarios::MAX_TIMEOUT_SEC;
use crate::util::resolve_against;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "parity.json";
pub const ENV_BASELINE_BIN: &str = "PARITY_BASELINE_BIN";
pub const ENV_BASELINE_DIR: &str = "PARITY_BASELINE_DIR";
pub const ENV_CANDIDATE_BIN: &str = "PARITY_CANDIDATE_BIN";

const DEFAULT_SCENARIOS_DIR: &str = "tooling/parity/scenarios";
const DEFAULT_OUT_JSON: &str = "build/parity/report.json";
const DEFAULT_OUT_TXT: &str = "build/parity/report.txt";
const DEFAULT_TIMEOUT_SEC: f64 = 25.0;
const DEFAULT_CONFIG_HOME_VAR: &str = "XDG_CONFIG_HOME";
const DEFAULT_CONFIG_HOME_SUBDIR: &str = ".config";
const DEFAULT_OUTPUT_LIMIT: usize = 1000;

/// Optional on-disk settings; every key may be omitted.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub scenarios_dir: Option<PathBuf>,
    pub out_json: Option<PathBuf>,
    pub out_txt: Option<PathBuf>,
    pub timeout_sec: Option<f64>,
    pub baseline_bin: Option<PathBuf>,
    pub baseline_dir: Option<PathBuf>,
    pub baseline_package: Option<String>,
    pub baseline_bin_name: Option<String>,
    pub candidate_bin: Option<PathBuf>,
    pub config_home_var: Option<String>,
    pub config_home_subdir: Option<String>,
    pub output_limit: Option<usize>,
    pub fail_on_skip: Option<bool>,
}

/// Fully resolved settings for one invocation of the harness.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub project_root: PathBuf,
    pub scenarios_dir: PathBuf,
    pub out_json: PathBuf,
    pub out_txt: PathBuf,
    pub timeout_sec: f64,
    pub binaries: BinarySettings,
    pub config_home_var: String,
    pub config_home_subdir: String,
    pub output_limit: usize,
    pub fail_on_skip: bool,
}

/// Read the config file. An explicit path must exist; the default one is
/// optional.
pub fn load_file_config(root: &Path, explicit: Option<&Path>) -> Result<FileConfig, HarnessError> {
    let path = match explicit {
        Some(path) => resolve_against(root, path),
        None => {
            let path = root.join(CONFIG_FILE_NAME);
            if !path.is_file() {
                return Ok(FileConfig::default());
            }
            path
        }
    };
    let bytes = fs::read(&path).map_err(|err| HarnessError::ConfigInvalid {
        path: path.clone(),
        reason: format!("read failed: {err}"),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| HarnessError::ConfigInvalid {
        path,
        reason: err.to_string(),
    })
}

pub fn resolve_config(
    source: &SourceArgs,
    binaries: &BinaryArgs,
    output: Option<&OutputArgs>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RunConfig, HarnessError> {
    let project_root = fs::canonicalize(&source.root).map_err(|err| HarnessError::ConfigInvalid {
        path: source.root.clone(),
        reason: format!("project root not usable: {err}"),
    })?;
    let file = load_file_config(&project_root, source.config.as_deref())?;
    let config_path = source
        .config
        .clone()
        .unwrap_or_else(|| project_root.join(CONFIG_FILE_NAME));

    let from_env = |key: &str| {
        env_lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    };
    let path_or = |cli: Option<&PathBuf>, file: Option<&PathBuf>, default: &str| {
        let chosen = cli.or(file).cloned().unwrap_or_else(|| PathBuf::from(default));
        resolve_against(&project_root, &chosen)
    };
    let layered = |cli: &Option<PathBuf>, env_key: &str, file: &Option<PathBuf>| {
        cli.clone()
            .or_else(|| from_env(env_key))
            .or_else(|| file.clone())
            .map(|path| resolve_against(&project_root, &path))
    };

    let timeout_sec = output
        .and_then(|output| output.timeout_sec)
        .or(file.timeout_sec)
        .unwrap_or(DEFAULT_TIMEOUT_SEC);
    if !timeout_sec.is_finite() || timeout_sec <= 0.0 {
        return Err(HarnessError::ConfigInvalid {
            path: config_path,
            reason: format!("timeout_sec must be positive, got {timeout_sec}"),
        });
    }
    if timeout_sec > MAX_TIMEOUT_SEC {
        return Err(HarnessError::ConfigInvalid {
            path: config_path,
            reason: format!("timeout_sec must be at most {MAX_TIMEOUT_SEC}, got {timeout_sec}"),
        });
    }
    let output_limit = file.output_limit.unwrap_or(DEFAULT_OUTPUT_LIMIT);
    if output_limit == 0 {
        return Err(HarnessError::ConfigInvalid {
            path: config_path,
            reason: "output_limit must be positive".to_string(),
        });
    }

    let binaries = BinarySettings {
        candidate_bin: layered(&binaries.candidate_bin, ENV_CANDIDATE_BIN, &file.candidate_bin),
        baseline_bin: layered(&binaries.baseline_bin, ENV_BASELINE_BIN, &file.baseline_bin),
        baseline_dir: layered(&binaries.baseline_dir, ENV_BASELINE_DIR, &file.baseline_dir),
        baseline_package: file.baseline_package.clone(),
        baseline_bin_name: binaries
            .baseline_bin_name
            .clone()
            .or_else(|| file.baseline_bin_name.clone()),
    };

    Ok(RunConfig {
        scenarios_dir: path_or(
            source.scenarios_dir.as_ref(),
            file.scenarios_dir.as_ref(),
            DEFAULT_SCENARIOS_DIR,
        ),
        out_json: path_or(
            output.and_then(|output| output.out_json.as_ref()),
            file.out_json.as_ref(),
            DEFAULT_OUT_JSON,
        ),
        out_txt: path_or(
            output.and_then(|output| output.out_txt.as_ref()),
            file.out_txt.as_ref(),
            DEFAULT_OUT_TXT,
        ),
        timeout_sec,
        binaries,
        config_home_var: file
            .config_home_var
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_HOME_VAR.to_string()),
        config_home_subdir: file
            .config_home_subdir
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_HOME_SUBDIR.to_string()),
        output_limit,
        fail_on_skip: output.is_some_and(|output| output.fail_on_skip)
            || file.fail_on_skip.unwrap_or(false),
        project_root,
    })
}
