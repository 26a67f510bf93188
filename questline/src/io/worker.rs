//! Worker process spawning and outcome collection.
//!
//! [`WorkerSpawner`] decouples the scheduler from the agent backend
//! (currently the `claude` CLI in print mode). Tests use scripted spawners
//! that settle with predetermined outcomes without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::core::signal::Signal;
use crate::core::types::WorkerOutcome;
use crate::workunit::WorkUnit;

/// Parameters for one worker dispatch.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub unit: WorkUnit,
    /// Wall-clock budget; the spawner reports `timed_out` when it fires.
    pub timeout: Duration,
    /// Session token from a prior attempt on the same step, if any.
    pub resume_session: Option<String>,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over worker execution backends.
///
/// `spawn` begins the worker task without waiting for it; the returned handle
/// settles exactly once with the worker's outcome. Errors inside the handle
/// are collaborator faults and abort the run.
pub trait WorkerSpawner {
    fn spawn(&self, request: SpawnRequest) -> JoinHandle<Result<WorkerOutcome>>;
}

/// Spawner that runs the `claude` CLI in print mode with JSON output.
#[derive(Debug, Clone)]
pub struct ClaudeSpawner {
    command: Vec<String>,
}

impl ClaudeSpawner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl WorkerSpawner for ClaudeSpawner {
    fn spawn(&self, request: SpawnRequest) -> JoinHandle<Result<WorkerOutcome>> {
        let argv = self.command.clone();
        tokio::spawn(async move { run_worker(argv, request).await })
    }
}

#[instrument(skip_all, fields(step_id = %request.unit.step_id, role = %request.unit.role, timeout_secs = request.timeout.as_secs()))]
async fn run_worker(argv: Vec<String>, request: SpawnRequest) -> Result<WorkerOutcome> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("worker command must not be empty"))?;

    // A signal left behind by an earlier attempt must not be mistaken for
    // this one's.
    if request.unit.signal_path.exists() {
        std::fs::remove_file(&request.unit.signal_path).with_context(|| {
            format!("remove stale signal {}", request.unit.signal_path.display())
        })?;
    }
    if let Some(parent) = request.unit.signal_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create signal dir {}", parent.display()))?;
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg("-p")
        .arg("--output-format")
        .arg("json");
    if let Some(session) = &request.resume_session {
        cmd.arg("--resume").arg(session);
    }
    cmd.current_dir(&request.unit.workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning worker process");
    let mut child = cmd.spawn().context("spawn worker")?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let prompt = request.unit.prompt.clone();
    let stdin_task = tokio::spawn(async move {
        stdin.write_all(prompt.as_bytes()).await?;
        stdin.shutdown().await?;
        Ok::<_, std::io::Error>(())
    });

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = request.output_limit_bytes;
    let stdout_task = tokio::spawn(async move { read_limited(stdout, limit).await });
    let stderr_task = tokio::spawn(async move { read_limited(stderr, limit).await });

    let mut timed_out = false;
    let status = match tokio::time::timeout(request.timeout, child.wait()).await {
        Ok(status) => status.context("wait for worker")?,
        Err(_) => {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "worker timed out, killing"
            );
            timed_out = true;
            child.start_kill().context("kill worker")?;
            child.wait().await.context("wait worker after kill")?
        }
    };

    stdin_task.await.context("join stdin writer")?.ok();
    let (stdout, stdout_truncated) = stdout_task
        .await
        .context("join stdout reader")?
        .context("read stdout")?;
    let (stderr, stderr_truncated) = stderr_task
        .await
        .context("join stderr reader")?
        .context("read stderr")?;

    write_worker_log(
        &request.unit.log_path,
        &stdout,
        stdout_truncated,
        &stderr,
        stderr_truncated,
        timed_out,
        request.output_limit_bytes,
    )?;

    let session_id = parse_session_id(&stdout);
    let signal = take_signal(&request.unit.signal_path)?;
    let crashed = !timed_out && !status.success();

    debug!(
        exit_code = ?status.code(),
        crashed,
        timed_out,
        has_signal = signal.is_some(),
        session_id = session_id.as_deref().unwrap_or(""),
        "worker settled"
    );
    Ok(WorkerOutcome {
        session_id,
        crashed,
        timed_out,
        signal,
    })
}

/// The CLI's JSON output is a single object carrying `session_id`.
fn parse_session_id(stdout: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    value
        .get("session_id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
}

/// Read the worker's signal file if it wrote one, consuming it so a later
/// attempt on the same step starts clean.
fn take_signal(path: &Path) -> Result<Option<Signal>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read signal {}", path.display()))?;
    let signal: Signal = serde_json::from_str(&contents)
        .with_context(|| format!("parse signal {}", path.display()))?;
    std::fs::remove_file(path).with_context(|| format!("remove signal {}", path.display()))?;
    Ok(Some(signal))
}

async fn read_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

fn write_worker_log(
    path: &PathBuf,
    stdout: &[u8],
    stdout_truncated: usize,
    stderr: &[u8],
    stderr_truncated: usize,
    timed_out: bool,
    output_limit: usize,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create worker log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(stdout));
    if stdout_truncated > 0 {
        buf.push_str(&format!("\n[worker stdout truncated {stdout_truncated} bytes]\n"));
    }
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(stderr));
    if stderr_truncated > 0 {
        buf.push_str(&format!("\n[worker stderr truncated {stderr_truncated} bytes]\n"));
    }
    if timed_out {
        buf.push_str("\n[worker timed out]\n");
    }

    if buf.len() > output_limit {
        let truncated = format!(
            "{}\n[truncated {} bytes]\n",
            &buf[..output_limit],
            buf.len() - output_limit
        );
        std::fs::write(path, truncated)
            .with_context(|| format!("write worker log {}", path.display()))?;
        return Ok(());
    }

    std::fs::write(path, buf).with_context(|| format!("write worker log {}", path.display()))
}
