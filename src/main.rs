//! geosub CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, run the
//! retrieval, and exit with status 1 (after the message and a usage
//! reminder, unless quiet) when it fails.
//! For programmatic use, prefer the library API (`geosub::api`).

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

mod cli;

fn main() -> ExitCode {
    let args = match cli::CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let quiet = args.quiet;
    match cli::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !quiet {
                eprintln!("{}", e);
                eprintln!("Usage:\n{}", cli::USAGE);
            }
            ExitCode::FAILURE
        }
    }
}
