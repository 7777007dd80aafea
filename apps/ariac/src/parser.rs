//! Command line argument parsing for the Aria compiler.
//!
//! This module defines the CLI interface using `clap`. The `Cli` struct
//! captures every flag and argument passed to the `aria` binary.

use std::path::PathBuf;

use clap::Parser;

/// Command line interface definition for the Aria compiler.
///
/// `aria` takes one or more source files and links them into a single
/// native executable; there is no phase-selection flag because the
/// compiler is whole-program and always runs the full pipeline.
#[derive(Parser)]
#[command(
    name = "aria",
    author,
    version,
    about = "Aria compiler",
    long_about = "Compiles one or more Aria source files into a native executable. \
Every input file is compiled together as one whole-program unit, so `import` \
statements resolve only among the files given on this command line."
)]
pub(crate) struct Cli {
    /// Source files to compile. At least one is required.
    #[arg(required = true)]
    pub(crate) inputs: Vec<PathBuf>,

    /// Path to the produced executable.
    #[arg(short = 'o', default_value = "a.out")]
    pub(crate) output: PathBuf,
}
