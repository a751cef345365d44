//! One backup run: archive, rotate, report.
//!
//! ```text
//! Idle -> Archiving -> RetentionPass -> Reporting -> Done
//!            |
//!            +-> Failed
//! ```
//!
//! Only a fatal archive error fails a run. Retention problems are downgraded
//! to warnings because a usable artifact already exists at that point.

use crate::archiver::{ArchiveResult, Archiver};
use crate::config::BackupConfig;
use crate::error::{ArchiveError, RetentionError, Warning};
use crate::report::{RunReporter, RunSummary, format_size};
use crate::retention::{RetentionPolicy, RetentionResult};
use crate::sysexits;
use chrono::Local;

/// Pipeline stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Archiving,
    RetentionPass,
    Reporting,
    Done,
    Failed,
}

impl Stage {
    fn can_enter(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Idle, Stage::Archiving)
                | (Stage::Archiving, Stage::RetentionPass)
                | (Stage::Archiving, Stage::Failed)
                | (Stage::RetentionPass, Stage::Reporting)
                | (Stage::Reporting, Stage::Done)
        )
    }
}

/// Receives progress from the orchestrator at stage boundaries.
///
/// Observers only listen; nothing they do feeds back into the run.
pub trait RunObserver {
    fn stage_changed(&mut self, _stage: Stage) {}
    fn archive_finished(&mut self, _result: &ArchiveResult) {}
    fn archive_failed(&mut self, _error: &ArchiveError) {}
    fn retention_finished(&mut self, _result: &RetentionResult) {}
    fn retention_skipped(&mut self, _error: &RetentionError) {}
    fn run_finished(&mut self, _summary: &RunSummary) {}
}

/// Writes run progress to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn stage_changed(&mut self, stage: Stage) {
        tracing::debug!(?stage, "stage changed");
    }

    fn archive_finished(&mut self, result: &ArchiveResult) {
        tracing::info!(
            artifact = %result.artifact_path.display(),
            files = result.file_count,
            skipped = result.skipped_count,
            symlinks_skipped = result.symlinks_skipped,
            format = %result.format,
            level = %result.level,
            "backup created ({})",
            format_size(result.compressed_bytes)
        );
    }

    fn archive_failed(&mut self, error: &ArchiveError) {
        tracing::error!(%error, "backup failed");
    }

    fn retention_finished(&mut self, result: &RetentionResult) {
        tracing::info!(
            kept = result.kept_paths.len(),
            removed = result.removed_paths.len(),
            swept = result.swept_paths.len(),
            "old backups rotated"
        );
    }

    fn retention_skipped(&mut self, error: &RetentionError) {
        tracing::warn!(%error, "rotation skipped");
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        for warning in &summary.warnings {
            tracing::warn!("{warning}");
        }
        let removed: Vec<_> = summary
            .removed_paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        let ratio = format!("{:.1}%", summary.compression_percent());
        let elapsed = format!("{:.2}s", summary.elapsed.as_secs_f64());

        if let Some(error) = &summary.error {
            tracing::error!(
                started_at = %summary.started_at,
                finished_at = %summary.finished_at,
                source = %summary.source.display(),
                destination = %summary.destination.display(),
                %elapsed,
                %error,
                "backup run failed"
            );
        } else {
            tracing::info!(
                started_at = %summary.started_at,
                finished_at = %summary.finished_at,
                source = %summary.source.display(),
                destination = %summary.destination.display(),
                original_bytes = summary.original_bytes,
                compressed_bytes = summary.compressed_bytes,
                %ratio,
                removed_count = removed.len(),
                ?removed,
                warnings = summary.warnings.len(),
                %elapsed,
                "backup run finished"
            );
        }
    }
}

/// Result of [`Orchestrator::run`].
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Either [`Stage::Done`] or [`Stage::Failed`].
    pub stage: Stage,
    pub error: Option<ArchiveError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Process exit status: success whenever an artifact was written.
    pub fn exit_code(&self) -> i32 {
        self.error
            .as_ref()
            .map_or(sysexits::EX_OK, ArchiveError::exit_code)
    }
}

/// Drives one run over a resolved configuration.
#[derive(Debug)]
pub struct Orchestrator {
    config: BackupConfig,
    stage: Stage,
}

impl Orchestrator {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(mut self, observer: &mut dyn RunObserver) -> RunOutcome {
        let started_at = Local::now();
        let source = self.config.source.clone();
        let destination = self.config.destination.clone();
        let reporter = RunReporter::new(&source, &destination);
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "starting backup"
        );

        self.enter(Stage::Archiving, observer);
        let archiver = Archiver::new(self.config.archive_options());
        let archive = match archiver.archive_at(&source, &destination, started_at.naive_local()) {
            Ok(result) => {
                observer.archive_finished(&result);
                result
            }
            Err(err) => {
                observer.archive_failed(&err);
                self.enter(Stage::Failed, observer);
                let summary = reporter.summarize(Err(&err), None, started_at, Local::now());
                observer.run_finished(&summary);
                return RunOutcome {
                    summary,
                    stage: self.stage,
                    error: Some(err),
                };
            }
        };

        self.enter(Stage::RetentionPass, observer);
        let retention = RetentionPolicy::new(self.config.keep)
            .map(|policy| policy.scoped_to(archive.name.source()))
            .and_then(|policy| policy.enforce(&destination));
        let retention = match retention {
            Ok(result) => {
                observer.retention_finished(&result);
                result
            }
            Err(err) => {
                observer.retention_skipped(&err);
                RetentionResult {
                    deletion_warnings: vec![Warning::RetentionListFailed {
                        reason: err.to_string(),
                    }],
                    ..RetentionResult::default()
                }
            }
        };

        self.enter(Stage::Reporting, observer);
        let summary = reporter.summarize(Ok(&archive), Some(&retention), started_at, Local::now());
        observer.run_finished(&summary);

        self.enter(Stage::Done, observer);
        RunOutcome {
            summary,
            stage: self.stage,
            error: None,
        }
    }

    fn enter(&mut self, next: Stage, observer: &mut dyn RunObserver) {
        debug_assert!(self.stage.can_enter(next), "{:?} -> {next:?}", self.stage);
        self.stage = next;
        observer.stage_changed(next);
    }
}
