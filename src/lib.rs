//! bkrotate: directory backups with rotation.
//!
//! A run archives a source directory into one compressed tarball
//! ([`archiver`]), deletes the oldest backups beyond a configured count
//! ([`retention`]) and summarizes what happened ([`report`]). The
//! [`orchestrator`] sequences the three steps.

pub mod archiver;
pub mod artifact;
pub mod commands;
pub mod config;
mod constants;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod path_util;
pub mod report;
pub mod retention;
pub mod sysexits;

pub use archiver::{ArchiveOptions, ArchiveResult, Archiver, archive};
pub use artifact::{ArtifactName, CompressFormat, CompressionLevel};
pub use config::BackupConfig;
pub use error::{ArchiveError, ConfigError, RetentionError, Warning};
pub use orchestrator::{Orchestrator, RunObserver, RunOutcome, Stage, TracingObserver};
pub use report::{RunReporter, RunSummary};
pub use retention::{RetentionPolicy, RetentionResult, enforce_retention};
