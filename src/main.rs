use bkrotate::commands::{self, Cli};
use clap::Parser;
use std::process;

/// Entry point for the bkrotate CLI application.
/// Parses command-line arguments, runs one backup and exits with its status.
fn main() {
    let code = commands::run(Cli::parse());
    process::exit(code);
}
