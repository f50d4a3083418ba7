//! Baseline and candidate binary discovery.
//!
//! The candidate is always a direct executable. The baseline is either a
//! direct executable or a `cargo run` passthrough inside its source tree;
//! only the former supports argv0 overrides, which the gate consults.
use crate::error::HarnessError;
use std::path::{Path, PathBuf};

/// Command prefix for one side; step arguments are appended to `argv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideInvocation {
    pub argv: Vec<String>,
    /// Default working directory; the project root when unset.
    pub cwd: Option<PathBuf>,
    /// Executable name as it appears in help and error output.
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocations {
    pub baseline: SideInvocation,
    pub candidate: SideInvocation,
    /// Baseline is a single existing executable rather than a passthrough.
    pub baseline_direct: bool,
}

/// Binary locations after CLI/env/config layering, already absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySettings {
    pub candidate_bin: Option<PathBuf>,
    pub baseline_bin: Option<PathBuf>,
    pub baseline_dir: Option<PathBuf>,
    pub baseline_package: Option<String>,
    pub baseline_bin_name: Option<String>,
}

pub fn resolve_invocations(settings: &BinarySettings) -> Result<Invocations, HarnessError> {
    let candidate_path = settings
        .candidate_bin
        .as_deref()
        .ok_or_else(|| HarnessError::CandidateNotFound {
            detail: "set --candidate-bin or PARITY_CANDIDATE_BIN".to_string(),
        })?;
    if !is_executable(candidate_path) {
        return Err(HarnessError::CandidateNotFound {
            detail: format!("{} is not an executable file", candidate_path.display()),
        });
    }
    let candidate = SideInvocation {
        argv: vec![candidate_path.display().to_string()],
        cwd: None,
        display_name: file_stem(candidate_path),
    };

    let baseline = resolve_baseline(settings)?;
    let baseline_direct = baseline.argv.len() == 1 && is_executable(Path::new(&baseline.argv[0]));
    Ok(Invocations {
        baseline,
        candidate,
        baseline_direct,
    })
}

fn resolve_baseline(settings: &BinarySettings) -> Result<SideInvocation, HarnessError> {
    if let Some(bin) = settings.baseline_bin.as_deref() {
        if !is_executable(bin) {
            return Err(HarnessError::BaselineNotFound {
                detail: format!("{} is not an executable file", bin.display()),
            });
        }
        return Ok(direct(bin));
    }

    let Some(dir) = settings.baseline_dir.as_deref() else {
        return Err(HarnessError::BaselineNotFound {
            detail: "set --baseline-bin or --baseline-dir (PARITY_BASELINE_BIN / PARITY_BASELINE_DIR)"
                .to_string(),
        });
    };
    if !dir.join("Cargo.toml").is_file() {
        return Err(HarnessError::BaselineNotFound {
            detail: format!("{} has no Cargo.toml", dir.display()),
        });
    }

    // The candidate's name would make the debug-build lookup and
    // `canonical_bin_name` look at the wrong executable.
    let Some(bin_name) = settings
        .baseline_bin_name
        .clone()
        .or_else(|| settings.baseline_package.clone())
    else {
        return Err(HarnessError::BaselineNotFound {
            detail: format!(
                "{} needs a binary name: set --baseline-bin-name or baseline_bin_name \
                 (or baseline_package) in the config",
                dir.display()
            ),
        });
    };
    let built = dir
        .join("target")
        .join("debug")
        .join(format!("{bin_name}{}", std::env::consts::EXE_SUFFIX));
    if is_executable(&built) {
        return Ok(direct(&built));
    }

    let cargo = which::which("cargo").map_err(|_| HarnessError::CargoMissing)?;
    let mut argv = vec![
        cargo.display().to_string(),
        "run".to_string(),
        "-q".to_string(),
    ];
    if let Some(package) = settings.baseline_package.as_deref() {
        argv.push("-p".to_string());
        argv.push(package.to_string());
    }
    argv.push("--".to_string());
    Ok(SideInvocation {
        argv,
        cwd: Some(dir.to_path_buf()),
        display_name: bin_name,
    })
}

fn direct(path: &Path) -> SideInvocation {
    SideInvocation {
        argv: vec![path.display().to_string()],
        cwd: None,
        display_name: file_stem(path),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    fn candidate_must_be_executable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plain = dir.path().join("tool");
        fs::write(&plain, "not executable").expect("write");
        let settings = BinarySettings {
            candidate_bin: Some(plain),
            ..Default::default()
        };
        let err = resolve_invocations(&settings).expect_err("not executable");
        assert!(matches!(err, HarnessError::CandidateNotFound { .. }));

        let err = resolve_invocations(&BinarySettings::default()).expect_err("unset");
        assert!(matches!(err, HarnessError::CandidateNotFound { .. }));
    }

    #[test]
    fn explicit_baseline_is_direct() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = dir.path().join("tool-next");
        let baseline = dir.path().join("tool");
        write_script(&candidate);
        write_script(&baseline);
        let invocations = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate),
            baseline_bin: Some(baseline.clone()),
            ..Default::default()
        })
        .expect("resolve");
        assert!(invocations.baseline_direct);
        assert_eq!(invocations.baseline.argv, vec![baseline.display().to_string()]);
        assert_eq!(invocations.baseline.display_name, "tool");
        assert_eq!(invocations.candidate.display_name, "tool-next");
    }

    #[test]
    fn baseline_dir_prefers_debug_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = dir.path().join("bin/tool-next");
        write_script(&candidate);
        let source = dir.path().join("baseline");
        fs::create_dir_all(&source).expect("create source");
        fs::write(source.join("Cargo.toml"), "[package]\nname = \"tool\"\n").expect("manifest");
        write_script(&source.join("target/debug/tool"));

        let invocations = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate),
            baseline_dir: Some(source.clone()),
            baseline_package: Some("tool".to_string()),
            ..Default::default()
        })
        .expect("resolve");
        assert!(invocations.baseline_direct);
        assert_eq!(
            invocations.baseline.argv,
            vec![source.join("target/debug/tool").display().to_string()]
        );
        assert_eq!(invocations.baseline.display_name, "tool");
        assert_eq!(invocations.candidate.display_name, "tool-next");
    }

    #[test]
    fn baseline_dir_needs_a_binary_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = dir.path().join("bin/tool-next");
        write_script(&candidate);
        let source = dir.path().join("baseline");
        fs::create_dir_all(&source).expect("create source");
        fs::write(source.join("Cargo.toml"), "[package]\nname = \"tool\"\n").expect("manifest");
        // A build named after the candidate must not be picked up.
        write_script(&source.join("target/debug/tool-next"));

        let err = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate),
            baseline_dir: Some(source),
            ..Default::default()
        })
        .expect_err("no baseline name");
        assert!(matches!(err, HarnessError::BaselineNotFound { .. }));
        assert!(err.to_string().contains("baseline_bin_name"));
    }

    #[test]
    fn baseline_dir_without_build_uses_cargo_passthrough() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = dir.path().join("tool");
        write_script(&candidate);
        let source = dir.path().join("baseline");
        fs::create_dir_all(&source).expect("create source");
        fs::write(source.join("Cargo.toml"), "[workspace]\n").expect("manifest");

        let result = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate),
            baseline_dir: Some(source.clone()),
            baseline_package: Some("tool-cli".to_string()),
            baseline_bin_name: Some("tool-ref".to_string()),
            ..Default::default()
        });
        if which::which("cargo").is_err() {
            assert!(matches!(result, Err(HarnessError::CargoMissing)));
            return;
        }
        let invocations = result.expect("resolve");
        assert!(!invocations.baseline_direct);
        assert_eq!(
            &invocations.baseline.argv[1..],
            &["run", "-q", "-p", "tool-cli", "--"]
        );
        assert_eq!(invocations.baseline.cwd.as_deref(), Some(source.as_path()));
        assert_eq!(invocations.baseline.display_name, "tool-ref");
    }

    #[test]
    fn missing_baseline_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = dir.path().join("tool");
        write_script(&candidate);
        let err = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate.clone()),
            baseline_dir: Some(dir.path().join("nowhere")),
            ..Default::default()
        })
        .expect_err("no manifest");
        assert!(matches!(err, HarnessError::BaselineNotFound { .. }));

        let err = resolve_invocations(&BinarySettings {
            candidate_bin: Some(candidate),
            ..Default::default()
        })
        .expect_err("nothing configured");
        assert!(matches!(err, HarnessError::BaselineNotFound { .. }));
    }
}
