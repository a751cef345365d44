//! Log sink setup.

use crate::config::LogTarget;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber: stderr always, plus the log file when
/// `target` names one. `RUST_LOG` takes precedence over `verbose`.
///
/// A log file that cannot be opened is reported and otherwise ignored.
pub fn init_tracing(verbose: bool, target: &LogTarget) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let mut open_error = None;
    let file_layer = match target {
        LogTarget::Console => None,
        LogTarget::File(path) => match open_log_file(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                open_error = Some((path, e));
                None
            }
        },
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init();

    if let Some((path, error)) = open_error {
        tracing::warn!(
            path = %path.display(),
            %error,
            "cannot open log file, logging to console only"
        );
    }
}

/// Opens `path` for appending, creating it and its parent directory if needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
