//! Run summaries.

use crate::archiver::ArchiveResult;
use crate::error::{ArchiveError, Warning};
use crate::retention::RetentionResult;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything worth knowing about one backup run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// The artifact written by this run, if any.
    pub artifact_path: Option<PathBuf>,
    pub file_count: usize,
    pub skipped_count: usize,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    /// Fraction of the original size saved by compression, in `[0, 1]`.
    pub compression_ratio: f64,
    pub removed_paths: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
    /// The fatal error that ended the run, if it failed.
    pub error: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn compression_percent(&self) -> f64 {
        self.compression_ratio * 100.0
    }
}

/// Builds [`RunSummary`] values for one source/destination pair.
#[derive(Debug, Clone)]
pub struct RunReporter {
    source: PathBuf,
    destination: PathBuf,
}

impl RunReporter {
    pub fn new(source: &Path, destination: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        }
    }

    /// Combines the outputs of both pipeline steps. Missing inputs show up as
    /// zeroed fields; warnings are carried through unchanged.
    pub fn summarize(
        &self,
        archive: Result<&ArchiveResult, &ArchiveError>,
        retention: Option<&RetentionResult>,
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            started_at,
            finished_at,
            elapsed: (finished_at - started_at).to_std().unwrap_or_default(),
            source: self.source.clone(),
            destination: self.destination.clone(),
            artifact_path: None,
            file_count: 0,
            skipped_count: 0,
            original_bytes: 0,
            compressed_bytes: 0,
            compression_ratio: 0.0,
            removed_paths: vec![],
            warnings: vec![],
            error: None,
        };

        match archive {
            Ok(result) => {
                summary.artifact_path = Some(result.artifact_path.clone());
                summary.file_count = result.file_count;
                summary.skipped_count = result.skipped_count;
                summary.original_bytes = result.original_bytes;
                summary.compressed_bytes = result.compressed_bytes;
                summary.compression_ratio =
                    compression_ratio(result.original_bytes, result.compressed_bytes);
                summary.warnings.extend(result.warnings.iter().cloned());
            }
            Err(err) => summary.error = Some(err.to_string()),
        }
        if let Some(retention) = retention {
            summary.removed_paths = retention.removed_paths.clone();
            summary
                .warnings
                .extend(retention.deletion_warnings.iter().cloned());
        }
        summary
    }
}

/// `1 - compressed / original`, clamped to `[0, 1]`; `0` for empty input.
pub fn compression_ratio(original_bytes: u64, compressed_bytes: u64) -> f64 {
    if original_bytes == 0 {
        return 0.0;
    }
    (1.0 - compressed_bytes as f64 / original_bytes as f64).clamp(0.0, 1.0)
}

/// Formats a byte count with a binary unit, e.g. `1.50 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "succeeded" } else { "FAILED" };
        writeln!(f, "backup {status}")?;
        writeln!(f, "  started:     {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  finished:    {}", self.finished_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  source:      {}", self.source.display())?;
        writeln!(f, "  destination: {}", self.destination.display())?;
        if let Some(artifact) = &self.artifact_path {
            writeln!(f, "  artifact:    {}", artifact.display())?;
        }
        writeln!(
            f,
            "  files:       {} archived, {} skipped",
            self.file_count, self.skipped_count
        )?;
        writeln!(
            f,
            "  original:    {} ({} bytes)",
            format_size(self.original_bytes),
            self.original_bytes
        )?;
        writeln!(
            f,
            "  compressed:  {} ({} bytes)",
            format_size(self.compressed_bytes),
            self.compressed_bytes
        )?;
        writeln!(f, "  saved:       {:.1}%", self.compression_percent())?;
        writeln!(f, "  removed:     {}", self.removed_paths.len())?;
        for path in &self.removed_paths {
            writeln!(f, "    - {}", path.display())?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning:     {warning}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  error:       {error}")?;
        }
        write!(f, "  elapsed:     {:.2}s", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactName, CompressFormat, CompressionLevel};

    fn archive_result(original_bytes: u64, compressed_bytes: u64) -> ArchiveResult {
        let stamp = Local::now().naive_local();
        ArchiveResult {
            artifact_path: PathBuf::from("/dest/docs_20261017-120000.tar.gz"),
            name: ArtifactName::new("docs", stamp, CompressFormat::Gzip),
            file_count: 3,
            skipped_count: 1,
            symlinks_skipped: 0,
            original_bytes,
            compressed_bytes,
            format: CompressFormat::Gzip,
            level: CompressionLevel::default(),
            warnings: vec![Warning::FileSkipped {
                path: PathBuf::from("/src/locked"),
                reason: "Permission denied".to_string(),
            }],
        }
    }

    fn reporter() -> RunReporter {
        RunReporter::new(Path::new("/src"), Path::new("/dest"))
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(0, 0), 0.0);
        assert_eq!(compression_ratio(0, 120), 0.0);
        assert_eq!(compression_ratio(1000, 250), 0.75);
        assert_eq!(compression_ratio(100, 400), 0.0);
        assert_eq!(compression_ratio(100, 0), 1.0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(1 << 50), "1.00 PB");
    }

    #[test]
    fn test_summarize_success() {
        let start = Local::now();
        let end = start + chrono::Duration::milliseconds(1500);
        let archive = archive_result(1000, 400);
        let retention = RetentionResult {
            kept_paths: vec![],
            removed_paths: vec![PathBuf::from("/dest/docs_20261001-120000.tar.gz")],
            deletion_warnings: vec![Warning::DeletionFailed {
                path: PathBuf::from("/dest/docs_20260901-120000.tar.gz"),
                reason: "Permission denied".to_string(),
            }],
            swept_paths: vec![],
        };

        let summary = reporter().summarize(Ok(&archive), Some(&retention), start, end);

        assert!(summary.is_success());
        assert_eq!(summary.elapsed, Duration::from_millis(1500));
        assert!((summary.compression_ratio - 0.6).abs() < 1e-9);
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.removed_paths.len(), 1);
        assert_eq!(summary.warnings.len(), 2);
        assert!(matches!(summary.warnings[0], Warning::FileSkipped { .. }));
        assert!(matches!(summary.warnings[1], Warning::DeletionFailed { .. }));
        assert_eq!(summary.source, PathBuf::from("/src"));
    }

    #[test]
    fn test_summarize_failure_zeroes_fields() {
        let start = Local::now();
        let err = ArchiveError::SourceNotFound(PathBuf::from("/src"));

        let summary = reporter().summarize(Err(&err), None, start, start);

        assert!(!summary.is_success());
        assert_eq!(summary.artifact_path, None);
        assert_eq!(summary.original_bytes, 0);
        assert_eq!(summary.compression_ratio, 0.0);
        assert!(summary.removed_paths.is_empty());
        assert!(summary.error.unwrap().contains("does not exist"));
    }

    #[test]
    fn test_clock_going_backwards_gives_zero_elapsed() {
        let start = Local::now();
        let end = start - chrono::Duration::seconds(5);
        let archive = archive_result(10, 5);
        let summary = reporter().summarize(Ok(&archive), None, start, end);
        assert_eq!(summary.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_display_mentions_warnings_and_sizes() {
        let start = Local::now();
        let archive = archive_result(2048, 1024);
        let text = reporter()
            .summarize(Ok(&archive), None, start, start)
            .to_string();
        assert!(text.starts_with("backup succeeded"));
        assert!(text.contains("2.00 KB (2048 bytes)"));
        assert!(text.contains("saved:       50.0%"));
        assert!(text.contains("warning:     skipped '/src/locked'"));
    }
}
