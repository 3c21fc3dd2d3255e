use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::demosaic::Method;
use crate::denoise::DenoiseMode;
use crate::error::{DemosaicError, Result};
use crate::io::OutputNaming;

/// One batch entry. Disabled targets keep their position in the
/// outcome list but are never processed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetItem {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub path: PathBuf,
}

fn default_enabled() -> bool {
    true
}

impl TargetItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            path: path.into(),
        }
    }
}

/// What happens when a target fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Record the failure and keep going.
    #[default]
    Continue,
    /// Cancel the remaining queue and in-flight tasks.
    Abort,
}

/// Per-file processing options, shared by every target of a batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub method: Method,
    pub denoise: DenoiseMode,
    /// Fixed CFA pattern overriding the file metadata, e.g. "RGGB" or
    /// a 36-character X-Trans layout.
    pub pattern: Option<String>,
    pub evaluate_noise: bool,
    pub evaluate_signal: bool,
    pub output: OutputNaming,
    /// Additionally write the three channel planes as separate files.
    pub save_channel_files: bool,
}

/// Scheduler tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// File-level worker multiplier over the hardware thread count.
    pub file_thread_overload: f32,
    /// Hard cap on file-level workers; 0 means no cap.
    pub max_file_threads: usize,
    /// Cap concurrency so the estimated working sets fit in memory.
    pub memory_load_control: bool,
    /// Fraction of available physical memory the batch may claim.
    pub memory_load_limit: f32,
    pub max_read_threads: usize,
    pub max_write_threads: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            file_thread_overload: crate::consts::DEFAULT_FILE_THREAD_OVERLOAD,
            max_file_threads: 0,
            memory_load_control: true,
            memory_load_limit: crate::consts::DEFAULT_MEMORY_LOAD_LIMIT,
            max_read_threads: crate::consts::DEFAULT_MAX_READ_THREADS,
            max_write_threads: crate::consts::DEFAULT_MAX_WRITE_THREADS,
        }
    }
}

/// Full batch description, loadable from a TOML file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub targets: Vec<TargetItem>,
    pub job: JobOptions,
    pub tuning: Tuning,
    pub error_policy: ErrorPolicy,
}

impl BatchConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| DemosaicError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    pub fn enabled_count(&self) -> usize {
        self.targets.iter().filter(|t| t.enabled).count()
    }
}
