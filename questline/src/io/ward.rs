//! Ward adapter: the external validation check the repair loop tries to
//! satisfy (lint, typecheck, test suite — whatever the project's command is).

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// One parseable error record extracted from ward output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardError {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

/// Result of one ward run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardReport {
    pub success: bool,
    pub errors: Vec<WardError>,
}

impl WardReport {
    pub fn passing() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }
}

pub trait WardRunner {
    fn run(&self, project_dir: &Path) -> Result<WardReport>;
}

/// Ward that shells out to a configured command (default `just ci`).
#[derive(Debug, Clone)]
pub struct CommandWard {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl WardRunner for CommandWard {
    fn run(&self, project_dir: &Path) -> Result<WardReport> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("ward command must not be empty"))?;

        debug!(command = ?self.command, "running ward");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawn ward")?;

        let status = match child
            .wait_timeout(self.timeout)
            .context("wait for ward timeout")?
        {
            Some(status) => status,
            None => {
                warn!(timeout_secs = self.timeout.as_secs(), "ward timed out, killing");
                child.kill().context("kill ward process")?;
                child.wait().context("wait ward process")?;
                return Ok(WardReport {
                    success: false,
                    errors: vec![WardError {
                        file: None,
                        line: None,
                        message: format!("ward timed out after {:?}", self.timeout),
                    }],
                });
            }
        };

        let output = child.wait_with_output().context("collect ward output")?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push('\n');
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if combined.len() > self.output_limit_bytes {
            let mut cut = self.output_limit_bytes;
            while !combined.is_char_boundary(cut) {
                cut -= 1;
            }
            combined.truncate(cut);
        }

        let success = status.success();
        let errors = if success {
            Vec::new()
        } else {
            parse_ward_errors(&combined)
        };
        debug!(success, errors = errors.len(), "ward finished");
        Ok(WardReport { success, errors })
    }
}

/// Extract structured error records from ward output.
///
/// Recognizes `path:line[:col]: error: message` location lines and bare
/// `error:` / `error[CODE]:` lines. Anything else is noise.
pub fn parse_ward_errors(output: &str) -> Vec<WardError> {
    static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?P<file>[^\s:][^:]*):(?P<line>\d+)(?::\d+)?:\s*error[:\s]\s*(?P<msg>.+)$")
            .unwrap()
    });
    static BARE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^error(?:\[[A-Za-z0-9]+\])?:\s*(?P<msg>.+)$").unwrap()
    });

    let mut errors = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(caps) = LOCATED.captures(line) {
            errors.push(WardError {
                file: Some(caps["file"].to_string()),
                line: caps["line"].parse().ok(),
                message: caps["msg"].trim().to_string(),
            });
        } else if let Some(caps) = BARE.captures(line) {
            errors.push(WardError {
                file: None,
                line: None,
                message: caps["msg"].trim().to_string(),
            });
        }
    }
    errors
}
