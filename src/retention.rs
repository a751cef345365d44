//! Backup rotation.
//!
//! Keeps the newest `keep` artifacts in a destination directory and removes
//! the rest. Only files whose names parse as an [`ArtifactName`] are ever
//! considered; everything else in the directory is left alone.

use crate::archiver::is_partial_name;
use crate::artifact::{Artifact, ArtifactName};
use crate::error::{RetentionError, Warning};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionResult {
    /// Artifacts left in place, newest first.
    pub kept_paths: Vec<PathBuf>,
    /// Artifacts that were deleted, newest first.
    pub removed_paths: Vec<PathBuf>,
    pub deletion_warnings: Vec<Warning>,
    /// Partial files left behind by interrupted runs, now deleted.
    pub swept_paths: Vec<PathBuf>,
}

/// Contents of a destination directory that retention cares about.
#[derive(Debug, Default)]
struct Scan {
    /// Matching artifacts, newest first.
    artifacts: Vec<Artifact>,
    partials: Vec<PathBuf>,
}

/// Keeps the newest `keep_count` artifacts of any source in `destination`.
pub fn enforce_retention(
    destination: &Path,
    keep_count: usize,
) -> Result<RetentionResult, RetentionError> {
    RetentionPolicy::new(keep_count)?.enforce(destination)
}

/// How many artifacts to keep, and optionally for which source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep: usize,
    source: Option<String>,
}

impl RetentionPolicy {
    /// # Errors
    /// Returns [`RetentionError::InvalidKeepCount`] when `keep` is zero.
    pub fn new(keep: usize) -> Result<Self, RetentionError> {
        if keep == 0 {
            return Err(RetentionError::InvalidKeepCount);
        }
        Ok(Self { keep, source: None })
    }

    /// Restricts the policy to artifacts of one source base name, so that
    /// several sources can share a destination directory.
    pub fn scoped_to(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Lists matching artifacts in `destination`, newest first.
    pub fn list(&self, destination: &Path) -> Result<Vec<Artifact>, RetentionError> {
        Ok(self.scan(destination)?.artifacts)
    }

    fn scan(&self, destination: &Path) -> Result<Scan, RetentionError> {
        let list_failed = |e| RetentionError::ListFailed {
            path: destination.to_path_buf(),
            source: e,
        };

        let mut scan = Scan::default();
        for entry in fs::read_dir(destination).map_err(list_failed)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            // Symlinks and directories are never artifacts.
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if is_partial_name(file_name) {
                scan.partials.push(entry.path());
                continue;
            }
            let Some(name) = ArtifactName::parse(file_name) else {
                continue;
            };
            if self.source.as_deref().is_some_and(|s| s != name.source()) {
                continue;
            }
            scan.artifacts.push(Artifact {
                path: entry.path(),
                name,
            });
        }
        scan.artifacts.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(scan)
    }

    /// Deletes every matching artifact beyond the newest `keep`, and any
    /// partial file left by an interrupted run.
    ///
    /// A failed deletion is recorded as a warning and does not stop the pass.
    /// Only one run may use a destination at a time, so a partial file found
    /// here never belongs to a live run.
    pub fn enforce(&self, destination: &Path) -> Result<RetentionResult, RetentionError> {
        let scan = self.scan(destination)?;
        let mut result = self.prune(scan.artifacts);
        for path in scan.partials {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed abandoned partial backup");
                    result.swept_paths.push(path);
                }
                Err(e) => result.deletion_warnings.push(Warning::DeletionFailed {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(result)
    }

    /// Deletes `artifacts` (newest first) beyond the newest `keep`.
    fn prune(&self, mut artifacts: Vec<Artifact>) -> RetentionResult {
        let remove = artifacts.split_off(self.keep.min(artifacts.len()));
        tracing::debug!(
            found = artifacts.len() + remove.len(),
            keep = self.keep,
            remove = remove.len(),
            "retention plan"
        );

        let mut result = RetentionResult {
            kept_paths: artifacts.into_iter().map(|a| a.path).collect(),
            ..RetentionResult::default()
        };
        for artifact in remove {
            match fs::remove_file(&artifact.path) {
                Ok(()) => {
                    tracing::info!(path = %artifact.path.display(), "removed old backup");
                    result.removed_paths.push(artifact.path);
                }
                Err(e) => result.deletion_warnings.push(Warning::DeletionFailed {
                    path: artifact.path,
                    reason: e.to_string(),
                }),
            }
        }
        result
    }
}
