//! debdiff invocation and cleanup of its output.

use crate::cache::ArtifactCache;
use crate::errors::{DebcompareError, Result};
use futures_lite::future;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Lines starting with these open a diff nested inside debdiff's own diff.
const WRAPPED_MARKERS: [&str; 4] = ["+---", "----", "-+++", "++++"];

/// Never unwrapped: its outer marker is the real one.
const PATCH_SERIES: &str = "debian/patches/series";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Addition,
    Removal,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
}

/// Collapses debdiff's occasional diff-of-a-diff into a single level.
///
/// A wrapped region starts on one of [`WRAPPED_MARKERS`] and ends on the
/// first line not starting with `+` or `-`. Inside it one leading marker is
/// dropped from every line. This is a heuristic over debdiff's output, not a
/// format guarantee. Empty lines are dropped.
pub fn normalize(raw: &str) -> Vec<DiffLine> {
    let mut unwrap = false;
    let mut lines = Vec::new();

    for line in raw.lines() {
        if line.is_empty() {
            continue;
        }
        if WRAPPED_MARKERS.iter().any(|m| line.starts_with(m)) {
            unwrap = true;
        }
        if !line.starts_with(['+', '-']) {
            unwrap = false;
        }

        let text = if unwrap && !line.contains(PATCH_SERIES) {
            &line[1..]
        } else {
            line
        };
        if text.is_empty() {
            continue;
        }

        let kind = if text.starts_with('+') {
            LineKind::Addition
        } else if text.starts_with('-') {
            LineKind::Removal
        } else {
            LineKind::Context
        };
        lines.push(DiffLine {
            kind,
            text: text.to_string(),
        });
    }
    lines
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    Identical,
    Changed(String),
}

impl DiffOutcome {
    pub fn lines(&self) -> Vec<DiffLine> {
        match self {
            DiffOutcome::Identical => Vec::new(),
            DiffOutcome::Changed(raw) => normalize(raw),
        }
    }
}

/// Computes the textual difference between two `.dsc` files.
pub trait DiffTool: Send + Sync {
    fn diff(&self, old_dsc: &Path, new_dsc: &Path) -> Result<DiffOutcome>;
}

/// The `debdiff` program from devscripts.
pub struct Debdiff {
    program: PathBuf,
    timeout: Duration,
    tmp_dir: PathBuf,
}

impl Debdiff {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, tmp_dir: impl Into<PathBuf>) -> Self {
        Debdiff {
            program: program.into(),
            timeout,
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Runs debdiff: exit 0 means no differences, exit 1 means differences on
    /// stdout, anything else (or a timeout) is a failure.
    pub async fn run(&self, old_dsc: &Path, new_dsc: &Path) -> Result<DiffOutcome> {
        let command = format!(
            "{} {} {}",
            self.program.display(),
            old_dsc.display(),
            new_dsc.display()
        );
        log::info!("Running: {}", command);

        let mut cmd = smol::process::Command::new(&self.program);
        cmd.arg(old_dsc)
            .arg(new_dsc)
            .env("TMPDIR", &self.tmp_dir)
            .kill_on_drop(true);
        let output = cmd.output();
        let timeout = async {
            smol::Timer::after(self.timeout).await;
            None
        };

        let output = match future::or(async { Some(output.await) }, timeout).await {
            Some(output) => output.map_err(|e| DebcompareError::ExternalToolFailure {
                command: command.clone(),
                status: "not started".to_string(),
                output: e.to_string(),
            })?,
            None => {
                return Err(DebcompareError::ExternalToolFailure {
                    command,
                    status: format!("timed out after {:?}", self.timeout),
                    output: String::new(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        match output.status.code() {
            Some(0) => {
                log::warn!("No difference found");
                Ok(DiffOutcome::Identical)
            }
            Some(1) => Ok(DiffOutcome::Changed(stdout)),
            _ => {
                log::error!("{} exited with failures", command);
                Err(DebcompareError::ExternalToolFailure {
                    command,
                    status: output.status.to_string(),
                    output: format!("{}{}", stdout, String::from_utf8_lossy(&output.stderr)),
                })
            }
        }
    }
}

impl DiffTool for Debdiff {
    fn diff(&self, old_dsc: &Path, new_dsc: &Path) -> Result<DiffOutcome> {
        smol::block_on(self.run(old_dsc, new_dsc))
    }
}

/// Diff of `name` between two versions, reusing `name_old-new.diff` from the
/// cache when present.
pub fn cached_diff(
    cache: &ArtifactCache,
    tool: &dyn DiffTool,
    name: &str,
    (old_version, old_dsc): (&str, &Path),
    (new_version, new_dsc): (&str, &Path),
    force: bool,
) -> Result<DiffOutcome> {
    let cache_name = format!("{}_{}-{}.diff", name, old_version, new_version);
    if force {
        cache.invalidate(&cache_name)?;
    }
    if let Some(bytes) = cache.read(&cache_name)? {
        log::debug!("Using cached diff: {}", cache_name);
        return Ok(DiffOutcome::Changed(String::from_utf8_lossy(&bytes).into_owned()));
    }

    let outcome = tool.diff(old_dsc, new_dsc)?;
    if let DiffOutcome::Changed(raw) = &outcome {
        cache.write(&cache_name, raw.as_bytes())?;
    }
    Ok(outcome)
}
