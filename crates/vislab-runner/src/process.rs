use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use vislab_core::TIMEOUT_RETURNCODE;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ProcessSpec<'a> {
    pub interpreter: &'a str,
    pub script: &'a Path,
    pub cwd: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    pub stdout_path: &'a Path,
    pub stderr_path: &'a Path,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessOutcome {
    pub returncode: i32,
    pub timed_out: bool,
    pub elapsed: Duration,
}

pub fn run_isolated(spec: &ProcessSpec<'_>) -> Result<ProcessOutcome> {
    let stdout_file = fs::File::create(spec.stdout_path)
        .with_context(|| format!("create {}", spec.stdout_path.display()))?;
    let stderr_file = fs::File::create(spec.stderr_path)
        .with_context(|| format!("create {}", spec.stderr_path.display()))?;

    let mut cmd = Command::new(spec.interpreter);
    cmd.arg(spec.script);
    cmd.current_dir(spec.cwd);
    cmd.envs(spec.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(stdout_file));
    cmd.stderr(Stdio::from(stderr_file));

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", spec.interpreter))?;
    let (status, timed_out) = wait_with_deadline(&mut child, spec.timeout)?;
    let elapsed = started.elapsed();

    if timed_out {
        append_timeout_marker(spec.stderr_path, spec.timeout)?;
        return Ok(ProcessOutcome {
            returncode: TIMEOUT_RETURNCODE,
            timed_out: true,
            elapsed,
        });
    }
    Ok(ProcessOutcome {
        returncode: exit_code(status),
        timed_out: false,
        elapsed,
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status, false)),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let status = child
                        .wait()
                        .map_err(|e| anyhow!("wait after kill failed: {}", e))?;
                    return Ok((status, true));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(anyhow!("try_wait failed: {}", e)),
        }
    }
}

pub fn timeout_marker(timeout: Duration) -> String {
    format!("\n[runner] TimeoutExpired ({}s)", timeout.as_secs())
}

fn append_timeout_marker(stderr_path: &Path, timeout: Duration) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(stderr_path)?;
    file.write_all(timeout_marker(timeout).as_bytes())?;
    Ok(())
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 128,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
