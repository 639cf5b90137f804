//! Command-line interface definitions for the `metadata-systest` binary.
//!
//! The parser structures live here so both the binary and the build script
//! can use them; the build script renders the manual page from them.

use clap::Parser;

/// Top-level CLI for the `metadata-systest` binary.
#[derive(Debug, Parser)]
#[command(
    name = "metadata-systest",
    about = "Deploy the metadata client to Google Cloud and check it detects the metadata service",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Pack the module once, then run the functions and build suites.
    #[command(name = "run", about = "Run the Cloud Functions and Cloud Build suites")]
    Run,
    /// Deploy the HTTP fixture, verify it, and prune this session's function.
    #[command(name = "functions", about = "Run the Cloud Functions suite")]
    Functions,
    /// Submit the Cloud Build fixture and check its log.
    #[command(name = "build", about = "Run the Cloud Build suite")]
    Build,
    /// Pack the module and stage the tarball in the fixtures.
    #[command(name = "pack", about = "Pack the module into the fixtures")]
    Pack,
    /// Delete leaked functions.
    #[command(name = "prune", about = "Delete leaked test functions")]
    Prune(PruneCommand),
}

/// Arguments for the `metadata-systest prune` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct PruneCommand {
    /// Delete every function of the session with this suffix, regardless of
    /// age. Without it, prefixed functions older than the staleness
    /// threshold are deleted.
    #[arg(long, value_name = "TAG")]
    pub(crate) session: Option<String>,
}
