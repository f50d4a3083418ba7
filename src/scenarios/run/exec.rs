use crate::invocation::SideInvocation;
use crate::scenarios::render::{
    Render, RenderContext, CASE_TMP, CONFIG_HOME, HOME, PROJECT_ROOT, STEP_INDEX,
};
use crate::scenarios::{Case, FileFixture, Side, TIMEOUT_EXIT_CODE};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Per-run inputs shared by every case and side.
pub struct ExecEnv<'a> {
    pub project_root: &'a Path,
    /// Inherited environment; copied, never mutated.
    pub host_env: &'a BTreeMap<String, String>,
    pub default_timeout_sec: f64,
    pub config_home_var: &'a str,
    pub config_home_subdir: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub cmd: Vec<String>,
    pub argv0: String,
    pub cwd: String,
    pub timeout_sec: f64,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// One side's execution of a case.
///
/// Owns its ephemeral directories; they are removed when the record drops,
/// which the runner does only after comparison and reporting.
#[derive(Debug)]
pub struct ExecutionRecord {
    pub side: Side,
    tmp: TempDir,
    _home: TempDir,
    pub steps: Vec<StepResult>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub home: String,
    pub config_home: String,
    /// Render context as it stood after the last step.
    pub context: RenderContext,
}

impl ExecutionRecord {
    pub fn tmp_path(&self) -> &Path {
        self.tmp.path()
    }

    #[cfg(test)]
    pub(crate) fn synthetic(side: Side, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        let tmp = TempDir::new().expect("tmp dir");
        let home = TempDir::new().expect("home dir");
        let context = RenderContext::new()
            .with(CASE_TMP, tmp.path().display().to_string())
            .with(HOME, home.path().display().to_string());
        ExecutionRecord {
            side,
            home: home.path().display().to_string(),
            config_home: home.path().join(".config").display().to_string(),
            tmp,
            _home: home,
            steps: Vec::new(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: exit_code == TIMEOUT_EXIT_CODE,
            duration_ms: 0,
            context,
        }
    }
}

/// Run every step of `case` against one side, in order.
pub fn run_side(
    side: Side,
    case: &Case,
    invocation: &SideInvocation,
    env: &ExecEnv<'_>,
) -> Result<ExecutionRecord> {
    let label = format!("{}-{}", temp_label(&case.id), side.label());
    let tmp = tempfile::Builder::new()
        .prefix(&format!("parity-{label}-"))
        .tempdir()
        .with_context(|| format!("create ephemeral dir for {}", case.id))?;
    let home_dir = tempfile::Builder::new()
        .prefix(&format!("parity-home-{label}-"))
        .tempdir()
        .with_context(|| format!("create home dir for {}", case.id))?;
    let home = home_dir.path().display().to_string();
    let config_home_path = home_dir.path().join(env.config_home_subdir);
    fs::create_dir_all(&config_home_path)
        .with_context(|| format!("create {}", config_home_path.display()))?;
    let config_home = config_home_path.display().to_string();

    let mut context = RenderContext::new()
        .with(CASE_TMP, tmp.path().display().to_string())
        .with(PROJECT_ROOT, env.project_root.display().to_string())
        .with(HOME, home.clone())
        .with(CONFIG_HOME, config_home.clone())
        .with(env.config_home_var, config_home.clone());

    materialize_fixtures(&case.files, tmp.path(), &context)?;

    let mut base_env = env.host_env.clone();
    base_env.insert("HOME".to_string(), home.clone());
    base_env.insert(env.config_home_var.to_string(), config_home.clone());

    let default_cwd = invocation
        .cwd
        .clone()
        .unwrap_or_else(|| env.project_root.to_path_buf());

    let mut steps = Vec::with_capacity(case.steps.len());
    let mut exit_code = 0;
    let mut timed_out = false;
    let mut duration_ms = 0u64;
    let mut stdout = String::new();
    let mut stderr = String::new();

    for (index, step) in case.steps.iter().enumerate() {
        context.insert(STEP_INDEX, index.to_string());

        let args = step
            .args
            .resolve(side)
            .cloned()
            .unwrap_or_default()
            .render(&context);
        let stdin_text = step
            .stdin
            .resolve(side)
            .map(|text| context.render_str(text))
            .unwrap_or_default();
        let extra_env = step
            .env
            .resolve(side)
            .cloned()
            .unwrap_or_default()
            .render(&context);

        let mut merged_env = base_env.clone();
        merged_env.extend(extra_env);
        if let Some(value) = merged_env.get("HOME") {
            context.insert(HOME, value.clone());
        }
        if let Some(value) = merged_env.get(env.config_home_var) {
            context.insert(CONFIG_HOME, value.clone());
            context.insert(env.config_home_var, value.clone());
        }

        let cwd = match step.cwd.resolve(side).map(|raw| context.render_str(raw)) {
            Some(raw) if !raw.trim().is_empty() => tmp.path().join(raw.trim()),
            _ => default_cwd.clone(),
        };
        let timeout_sec = step
            .timeout_sec
            .resolve(side)
            .or_else(|| case.timeout_sec.resolve(side))
            .copied()
            .unwrap_or(env.default_timeout_sec);
        let argv0 = step
            .argv0
            .resolve(side)
            .map(|raw| context.render_str(raw))
            .unwrap_or_default();

        let mut cmd = invocation.argv.clone();
        cmd.extend(args);

        debug!(
            case = %case.id,
            side = %side,
            step = index,
            cmd = %crate::util::format_command_line(&cmd),
            cwd = %cwd.display(),
            timeout_sec,
            "run step"
        );
        let timeout = Duration::try_from_secs_f64(timeout_sec)
            .with_context(|| format!("timeout_sec {timeout_sec} for step {index} of {}", case.id))?;
        let output = run_process(
            &cmd,
            (!argv0.is_empty()).then_some(argv0.as_str()),
            &cwd,
            &merged_env,
            &stdin_text,
            timeout,
        )
        .with_context(|| format!("run step {index} of {}", case.id))?;
        if output.timed_out {
            warn!(case = %case.id, side = %side, step = index, timeout_sec, "step timed out");
        }

        exit_code = output.exit_code;
        timed_out |= output.timed_out;
        duration_ms += output.duration_ms;
        stdout.push_str(&output.stdout);
        stderr.push_str(&output.stderr);
        steps.push(StepResult {
            index,
            cmd,
            argv0,
            cwd: cwd.display().to_string(),
            timeout_sec,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
            duration_ms: output.duration_ms,
        });
    }

    Ok(ExecutionRecord {
        side,
        tmp,
        _home: home_dir,
        steps,
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration_ms,
        home,
        config_home,
        context,
    })
}

fn temp_label(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn materialize_fixtures(files: &[FileFixture], root: &Path, context: &RenderContext) -> Result<()> {
    for file in files {
        let rendered = context.render_str(&file.path);
        let rel = fixture_rel_path(&rendered, root)?;
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, context.render_str(&file.content.0))
            .with_context(|| format!("write fixture {}", path.display()))?;
    }
    Ok(())
}

/// Fixture paths are relative to the ephemeral dir; an absolute path is
/// accepted only when it already points inside it.
fn fixture_rel_path(raw: &str, root: &Path) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("fixture paths must not be empty"));
    }
    let path = Path::new(trimmed);
    let path = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| anyhow!("fixture path {trimmed} is outside the case directory"))?
    } else {
        path
    };
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow!("fixture path {trimmed} must not contain '..'"));
            }
            _ => return Err(anyhow!("fixture path {trimmed} must be relative")),
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(anyhow!("fixture path {trimmed} names no file"));
    }
    Ok(cleaned)
}

struct ProcessOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
    timed_out: bool,
    duration_ms: u64,
}

/// Drains one pipe on its own thread so a chatty child never blocks on a
/// full pipe while we poll it.
struct OutputPipe {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
    finished: bool,
}

impl OutputPipe {
    fn spawn<R: Read + Send + 'static>(mut reader: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
            let _ = tx.send(());
        });
        OutputPipe {
            buffer,
            done,
            finished: false,
        }
    }

    /// Wait for EOF until `deadline`; true once the writer side is closed.
    fn wait_until(&mut self, deadline: Instant) -> bool {
        if !self.finished {
            let budget = deadline.saturating_duration_since(Instant::now());
            self.finished = self.done.recv_timeout(budget).is_ok();
        }
        self.finished
    }

    fn into_text(self) -> String {
        let bytes = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn run_process(
    argv: &[String],
    argv0: Option<&str>,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    stdin_text: &str,
    timeout: Duration,
) -> Result<ProcessOutput> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;
    let mut command = Command::new(program);
    command
        .args(rest)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        if let Some(argv0) = argv0 {
            command.arg0(argv0);
        }
    }
    #[cfg(not(unix))]
    let _ = argv0;

    let start = Instant::now();
    let deadline = start
        .checked_add(timeout)
        .ok_or_else(|| anyhow!("timeout {timeout:?} overflows the clock"))?;
    let mut child = command
        .spawn()
        .with_context(|| format!("spawn {program} in {}", cwd.display()))?;

    if let Some(mut pipe) = child.stdin.take() {
        let data = stdin_text.as_bytes().to_vec();
        // The child may exit without reading; a broken pipe is expected then.
        thread::spawn(move || {
            let _ = pipe.write_all(&data);
        });
    }
    let mut stdout = child
        .stdout
        .take()
        .map(OutputPipe::spawn)
        .ok_or_else(|| anyhow!("stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .map(OutputPipe::spawn)
        .ok_or_else(|| anyhow!("stderr not captured"))?;

    let mut timed_out = false;
    let mut status = None;
    loop {
        if let Some(exit) = child.try_wait().context("poll child status")? {
            status = Some(exit);
            break;
        }
        if Instant::now() >= deadline {
            timed_out = true;
            kill_tree(&mut child);
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // A descendant that outlives the child can hold the pipes open; treat
    // that as a timeout once the step budget is spent.
    let read_deadline = if timed_out {
        Instant::now() + KILL_GRACE
    } else {
        deadline
    };
    let drained = stdout.wait_until(read_deadline) & stderr.wait_until(read_deadline);
    if !drained && !timed_out {
        timed_out = true;
        kill_tree(&mut child);
        let grace = Instant::now() + KILL_GRACE;
        stdout.wait_until(grace);
        stderr.wait_until(grace);
    }
    if status.is_none() {
        status = child.wait().ok();
    }
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let exit_code = if timed_out {
        TIMEOUT_EXIT_CODE
    } else {
        status.map(exit_code_of).unwrap_or(TIMEOUT_EXIT_CODE)
    };
    Ok(ProcessOutput {
        exit_code,
        stdout: stdout.into_text(),
        stderr: stderr.into_text(),
        timed_out,
        duration_ms,
    })
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: signalling a process group we created; no memory is shared.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
