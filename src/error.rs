//! Error and warning types shared by the backup pipeline.
//!
//! Fatal conditions are `ArchiveError`/`ConfigError` values that abort a run.
//! Everything the pipeline can tolerate is collected as a [`Warning`] instead.

use crate::sysexits;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised by the archive step.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source directory '{}' does not exist", .0.display())]
    SourceNotFound(PathBuf),
    #[error("source directory '{}' is not readable: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("source '{}' is not a directory", .0.display())]
    SourceNotADirectory(PathBuf),
    #[error("source directory '{}' contains no readable files", .0.display())]
    EmptySource(PathBuf),
    #[error("compression level {0} is out of range (expected 1-9)")]
    InvalidLevel(u32),
    #[error("destination '{}' is not writable: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write artifact '{}': {source}", path.display())]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ArchiveError::SourceNotFound(_)
            | ArchiveError::SourceUnreadable { .. }
            | ArchiveError::SourceNotADirectory(_) => sysexits::EX_NOINPUT,
            ArchiveError::EmptySource(_) => sysexits::EX_DATAERR,
            ArchiveError::InvalidLevel(_) => sysexits::EX_USAGE,
            ArchiveError::DestinationUnwritable { .. } => sysexits::EX_CANTCREAT,
            ArchiveError::ArtifactWriteFailed { .. } => sysexits::EX_IOERR,
        }
    }
}

/// Errors that stop the retention pass from running at all.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("retention count must be at least 1")]
    InvalidKeepCount,
    #[error("cannot list backups in '{}': {source}", path.display())]
    ListFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("compression level {0} is out of range (expected 1-9)")]
    InvalidLevel(u32),
    #[error("retention count must be at least 1")]
    InvalidKeepCount,
}

/// A non-fatal issue recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A source entry could not be read and was left out of the archive.
    FileSkipped { path: PathBuf, reason: String },
    /// A file could not be read to its full length; the missing tail was zero-filled.
    FileChanged { path: PathBuf, reason: String },
    /// An old artifact could not be removed.
    DeletionFailed { path: PathBuf, reason: String },
    /// The destination could not be listed, so no rotation happened.
    RetentionListFailed { reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::FileSkipped { path, reason } => {
                write!(f, "skipped '{}': {reason}", path.display())
            }
            Warning::FileChanged { path, reason } => {
                write!(f, "'{}' changed while being archived: {reason}", path.display())
            }
            Warning::DeletionFailed { path, reason } => {
                write!(f, "failed to remove '{}': {reason}", path.display())
            }
            Warning::RetentionListFailed { reason } => {
                write!(f, "retention skipped: {reason}")
            }
        }
    }
}
