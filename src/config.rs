//! Run configuration.
//!
//! A [`BackupConfig`] is resolved once from command-line values, the optional
//! TOML settings file and built-in defaults (in that order of precedence) and
//! is then passed by value to the orchestrator.

use crate::archiver::ArchiveOptions;
use crate::artifact::{CompressFormat, CompressionLevel, STAMP_FORMAT, source_name};
use crate::constants::{CONFIG_NAME, LOG_DIR_NAME, PKG_NAME};
use crate::error::ConfigError;
use crate::path_util::expand_path;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Number of artifacts kept when nothing else is configured.
pub const DEFAULT_KEEP: usize = 5;

/// Where log output goes in addition to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Console,
    File(PathBuf),
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub level: CompressionLevel,
    /// Number of artifacts to keep; always at least 1.
    pub keep: usize,
    pub format: CompressFormat,
    pub follow_symlinks: bool,
    pub log: LogTarget,
    pub verbose: bool,
}

impl BackupConfig {
    /// A configuration with all defaults and console-only logging.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            level: CompressionLevel::default(),
            keep: DEFAULT_KEEP,
            format: CompressFormat::default(),
            follow_symlinks: false,
            log: LogTarget::Console,
            verbose: false,
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            level: self.level,
            format: self.format,
            follow_symlinks: self.follow_symlinks,
        }
    }
}

/// Contents of the optional settings file. Every key is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub level: Option<u32>,
    pub keep: Option<usize>,
    pub format: Option<CompressFormat>,
    pub follow_symlinks: Option<bool>,
    /// Directory for per-run log files; defaults to `<destination>/logs`.
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// The built-in defaults, spelled out.
    pub fn defaults() -> Self {
        Self {
            level: Some(CompressionLevel::default().get()),
            keep: Some(DEFAULT_KEEP),
            format: Some(CompressFormat::default()),
            follow_symlinks: Some(false),
            log_dir: None,
        }
    }

    /// Reads a settings file in TOML format.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&toml_str).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reads the default settings file, or returns empty settings if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match config_file() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Writes the settings in TOML format, creating the parent directory if needed.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self).map_err(io::Error::other)?;
        let mut writer = io::BufWriter::new(fs::File::create(path)?);
        writer.write_all(toml_str.as_bytes())?;
        writer.flush()
    }
}

/// Values given on the command line. `None`/`false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub level: Option<u32>,
    pub keep: Option<usize>,
    pub format: Option<CompressFormat>,
    pub follow_symlinks: bool,
    pub log_file: Option<PathBuf>,
    pub no_log_file: bool,
    pub verbose: bool,
}

/// Merges command-line values, settings and defaults into a [`BackupConfig`].
///
/// `stamp` names the default per-run log file.
pub fn resolve(
    source: PathBuf,
    destination: PathBuf,
    overrides: Overrides,
    settings: &Settings,
    stamp: NaiveDateTime,
) -> Result<BackupConfig, ConfigError> {
    let level = overrides
        .level
        .or(settings.level)
        .unwrap_or(CompressionLevel::default().get());
    let level = CompressionLevel::new(level).ok_or(ConfigError::InvalidLevel(level))?;

    let keep = overrides.keep.or(settings.keep).unwrap_or(DEFAULT_KEEP);
    if keep == 0 {
        return Err(ConfigError::InvalidKeepCount);
    }

    let log = if overrides.no_log_file {
        LogTarget::Console
    } else if let Some(file) = overrides.log_file {
        LogTarget::File(file)
    } else {
        let dir = settings
            .log_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| destination.join(LOG_DIR_NAME));
        let file_name = format!("{}_{}.log", source_name(&source), stamp.format(STAMP_FORMAT));
        LogTarget::File(dir.join(file_name))
    };

    Ok(BackupConfig {
        level,
        keep,
        format: overrides.format.or(settings.format).unwrap_or_default(),
        follow_symlinks: overrides.follow_symlinks || settings.follow_symlinks.unwrap_or(false),
        log,
        verbose: overrides.verbose,
        source,
        destination,
    })
}

/// Returns the absolute path to the default settings file, if a config
/// directory can be determined for this platform.
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_NAME))
}

#[cfg(not(target_os = "macos"))]
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(PKG_NAME))
}

#[cfg(target_os = "macos")]
fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|dir| dir.join(".config").join(PKG_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn resolve_with(overrides: Overrides, settings: &Settings) -> Result<BackupConfig, ConfigError> {
        resolve(
            PathBuf::from("/data/photos"),
            PathBuf::from("/backups"),
            overrides,
            settings,
            stamp(),
        )
    }

    #[test]
    fn test_config_file_location() {
        if let Some(file) = config_file() {
            assert!(file.ends_with("bkrotate/config.toml"));
        }
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with(Overrides::default(), &Settings::default()).unwrap();
        assert_eq!(config.level.get(), 6);
        assert_eq!(config.keep, 5);
        assert_eq!(config.format, CompressFormat::Gzip);
        assert!(!config.follow_symlinks);
        assert_eq!(
            config.log,
            LogTarget::File(PathBuf::from("/backups/logs/photos_20261017-083000.log"))
        );
    }

    #[test]
    fn test_command_line_beats_settings() {
        let settings = Settings {
            level: Some(3),
            keep: Some(10),
            format: Some(CompressFormat::Xz),
            follow_symlinks: Some(true),
            log_dir: Some(PathBuf::from("/var/log/bkrotate")),
        };
        let overrides = Overrides {
            level: Some(9),
            keep: Some(2),
            ..Overrides::default()
        };

        let config = resolve_with(overrides, &settings).unwrap();
        assert_eq!(config.level.get(), 9);
        assert_eq!(config.keep, 2);
        assert_eq!(config.format, CompressFormat::Xz);
        assert!(config.follow_symlinks);
        assert_eq!(
            config.log,
            LogTarget::File(PathBuf::from("/var/log/bkrotate/photos_20261017-083000.log"))
        );
    }

    #[test]
    fn test_log_dir_from_settings_is_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        for log_dir in ["~/logs", "$HOME/logs"] {
            let settings = Settings {
                log_dir: Some(PathBuf::from(log_dir)),
                ..Settings::default()
            };
            let config = resolve_with(Overrides::default(), &settings).unwrap();
            assert_eq!(
                config.log,
                LogTarget::File(home.join("logs").join("photos_20261017-083000.log"))
            );
        }
    }

    #[test]
    fn test_log_target_overrides() {
        let overrides = Overrides {
            log_file: Some(PathBuf::from("/tmp/run.log")),
            ..Overrides::default()
        };
        let config = resolve_with(overrides, &Settings::default()).unwrap();
        assert_eq!(config.log, LogTarget::File(PathBuf::from("/tmp/run.log")));

        let overrides = Overrides {
            log_file: Some(PathBuf::from("/tmp/run.log")),
            no_log_file: true,
            ..Overrides::default()
        };
        let config = resolve_with(overrides, &Settings::default()).unwrap();
        assert_eq!(config.log, LogTarget::Console);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let settings = Settings {
            level: Some(11),
            ..Settings::default()
        };
        assert!(matches!(
            resolve_with(Overrides::default(), &settings),
            Err(ConfigError::InvalidLevel(11))
        ));

        let settings = Settings {
            keep: Some(0),
            ..Settings::default()
        };
        assert!(matches!(
            resolve_with(Overrides::default(), &settings),
            Err(ConfigError::InvalidKeepCount)
        ));
    }

    #[test]
    fn test_settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Settings::defaults().write(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("level = 6"));
        assert!(text.contains("format = \"gzip\""));

        assert_eq!(Settings::load(&path).unwrap(), Settings::defaults());
    }

    #[test]
    fn test_settings_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "keep = 3\nformat = \"zip\"\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, "retain = 3\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));

        assert!(matches!(
            Settings::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "keep = 7\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.keep, Some(7));
        assert_eq!(settings.level, None);
    }
}
