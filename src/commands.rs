//! Command-line interface definition for bkrotate.
//!
//! The CLI only resolves a [`BackupConfig`](crate::config::BackupConfig),
//! sets up logging and hands over to the orchestrator.

use crate::artifact::CompressFormat;
use crate::config::{self, Overrides, Settings};
use crate::logging;
use crate::orchestrator::{Orchestrator, TracingObserver};
use crate::path_util::expand_path;
use crate::sysexits;
use anyhow::{Context, bail};
use chrono::Local;
use clap::Parser;
use clap::builder::RangedU64ValueParser;
use std::path::PathBuf;

/// Archive a directory into a compressed tarball and rotate old backups.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory to back up.
    #[arg(required_unless_present = "init_config")]
    pub source: Option<PathBuf>,
    /// Directory that receives the backups.
    #[arg(required_unless_present = "init_config")]
    pub destination: Option<PathBuf>,
    /// Compression level, 1 (fastest) to 9 (smallest). [default: 6]
    #[arg(short = 'c', long = "compression", value_parser = clap::value_parser!(u32).range(1..=9))]
    pub level: Option<u32>,
    /// Number of backups to keep. [default: 5]
    #[arg(short, long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub keep: Option<usize>,
    /// Compression format. [default: gzip]
    #[arg(short, long)]
    pub format: Option<CompressFormat>,
    /// Follow symbolic links instead of skipping them.
    #[arg(long)]
    pub follow_symlinks: bool,
    /// Write logs to this file. [default: <destination>/logs/<source>_<timestamp>.log]
    #[arg(short, long, conflicts_with = "no_log_file")]
    pub log: Option<PathBuf>,
    /// Log to the console only.
    #[arg(long)]
    pub no_log_file: bool,
    /// Show detailed log messages and print a run report when done.
    #[arg(short, long)]
    pub verbose: bool,
    /// Settings file to read instead of the default one.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Write a settings file with the default values and exit.
    #[arg(long, conflicts_with_all = ["source", "destination"])]
    pub init_config: bool,
}

impl Cli {
    /// Values given on the command line, for merging with the settings file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            level: self.level,
            keep: self.keep,
            format: self.format,
            follow_symlinks: self.follow_symlinks,
            log_file: self.log.as_deref().map(expand_path),
            no_log_file: self.no_log_file,
            verbose: self.verbose,
        }
    }
}

/// Executes the parsed command line and returns the process exit status.
pub fn run(cli: Cli) -> i32 {
    if cli.init_config {
        return init_config(cli.config);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load(&expand_path(path)),
        None => Settings::load_default(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return sysexits::EX_CONFIG;
        }
    };

    let (Some(source), Some(destination)) = (&cli.source, &cli.destination) else {
        eprintln!("bkrotate requires a source and a destination. See 'bkrotate --help' for usage.");
        return sysexits::EX_USAGE;
    };
    let config = match config::resolve(
        expand_path(source),
        expand_path(destination),
        cli.overrides(),
        &settings,
        Local::now().naive_local(),
    ) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return sysexits::EX_CONFIG;
        }
    };

    logging::init_tracing(config.verbose, &config.log);
    tracing::debug!(?config, "resolved configuration");

    let verbose = config.verbose;
    let outcome = Orchestrator::new(config).run(&mut TracingObserver);
    if verbose {
        println!("{}", outcome.summary);
    }
    outcome.exit_code()
}

fn init_config(path: Option<PathBuf>) -> i32 {
    match write_default_config(path) {
        Ok(path) => {
            println!("config file: {}", path.display());
            sysexits::EX_OK
        }
        Err(e) => {
            eprintln!("{e:#}");
            sysexits::EX_CANTCREAT
        }
    }
}

/// Writes the default settings file to `path`, or to the default location.
fn write_default_config(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let path = path
        .as_deref()
        .map(expand_path)
        .or_else(config::config_file)
        .context("couldn't determine the configuration directory")?;
    if path.exists() {
        bail!("config file '{}' already exists", path.display());
    }
    Settings::defaults()
        .write(&path)
        .with_context(|| format!("failed to write config file '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "bkrotate",
            "/data/photos",
            "/backups",
            "-c",
            "9",
            "-k",
            "3",
            "--format",
            "zstd",
            "--follow-symlinks",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.source, Some(PathBuf::from("/data/photos")));
        assert_eq!(cli.destination, Some(PathBuf::from("/backups")));
        let overrides = cli.overrides();
        assert_eq!(overrides.level, Some(9));
        assert_eq!(overrides.keep, Some(3));
        assert_eq!(overrides.format, Some(CompressFormat::Zstd));
        assert!(overrides.follow_symlinks);
        assert!(overrides.verbose);
        assert!(!overrides.no_log_file);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        for args in [
            vec!["bkrotate", "/src", "/dst", "-c", "0"],
            vec!["bkrotate", "/src", "/dst", "-c", "10"],
            vec!["bkrotate", "/src", "/dst", "-k", "0"],
            vec!["bkrotate", "/src", "/dst", "--format", "zip"],
            vec!["bkrotate", "/src", "/dst", "--log", "a.log", "--no-log-file"],
            vec!["bkrotate", "/src"],
        ] {
            assert!(Cli::try_parse_from(args.iter().copied()).is_err(), "{args:?}");
        }
    }

    #[test]
    fn test_init_config_needs_no_paths() {
        let cli = Cli::try_parse_from(["bkrotate", "--init-config"]).unwrap();
        assert!(cli.init_config);
        assert!(Cli::try_parse_from(["bkrotate", "--init-config", "/src", "/dst"]).is_err());
    }

    #[test]
    fn test_init_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkrotate.toml");

        assert_eq!(init_config(Some(path.clone())), sysexits::EX_OK);
        assert_eq!(Settings::load(&path).unwrap(), Settings::defaults());
        assert_eq!(init_config(Some(path)), sysexits::EX_CANTCREAT);
    }
}
