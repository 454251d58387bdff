//! Command Line Interface (CLI) layer for geosub.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) turning the command line into a
//! `geosub::RetrievalRequest` and printing progress.
//!
//! If you are embedding geosub into another application, prefer using
//! the high-level `geosub::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::{USAGE, run};
