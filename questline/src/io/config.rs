//! Questline configuration stored under `.questline/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuestlineConfig {
    /// Concurrent execution slots shared by every stage.
    pub slot_count: usize,

    /// Per-spawn wall-clock budget for a worker process, in seconds.
    pub worker_timeout_secs: u64,

    /// Repair loop ceiling (counting from 1).
    pub max_repair_iterations: u32,

    /// Truncate worker stdout/stderr logs beyond this many bytes.
    pub worker_output_limit_bytes: usize,

    /// Truncate ward stdout/stderr beyond this many bytes.
    pub ward_output_limit_bytes: usize,

    pub worker: WorkerConfig,
    pub ward: WardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base argv for the worker agent CLI.
    pub command: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WardConfig {
    /// Command to execute for the validation check (e.g. `["just","ci"]`).
    pub command: Vec<String>,
    /// Wall-clock budget for one ward run, in seconds.
    pub timeout_secs: u64,
}

impl Default for WardConfig {
    fn default() -> Self {
        Self {
            command: vec!["just".to_string(), "ci".to_string()],
            timeout_secs: 30 * 60,
        }
    }
}

impl Default for QuestlineConfig {
    fn default() -> Self {
        Self {
            slot_count: 3,
            worker_timeout_secs: 30 * 60,
            max_repair_iterations: 5,
            worker_output_limit_bytes: 1_000_000,
            ward_output_limit_bytes: 1_000_000,
            worker: WorkerConfig::default(),
            ward: WardConfig::default(),
        }
    }
}

impl QuestlineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(anyhow!("slot_count must be > 0"));
        }
        if self.worker_timeout_secs == 0 {
            return Err(anyhow!("worker_timeout_secs must be > 0"));
        }
        if self.max_repair_iterations == 0 {
            return Err(anyhow!("max_repair_iterations must be >= 1"));
        }
        if self.worker_output_limit_bytes == 0 {
            return Err(anyhow!("worker_output_limit_bytes must be > 0"));
        }
        if self.ward_output_limit_bytes == 0 {
            return Err(anyhow!("ward_output_limit_bytes must be > 0"));
        }
        if self.worker.command.is_empty() || self.worker.command[0].trim().is_empty() {
            return Err(anyhow!("worker.command must be a non-empty array"));
        }
        if self.ward.command.is_empty() || self.ward.command[0].trim().is_empty() {
            return Err(anyhow!("ward.command must be a non-empty array"));
        }
        if self.ward.timeout_secs == 0 {
            return Err(anyhow!("ward.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `QuestlineConfig::default()`.
pub fn load_config(path: &Path) -> Result<QuestlineConfig> {
    if !path.exists() {
        let cfg = QuestlineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: QuestlineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &QuestlineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
