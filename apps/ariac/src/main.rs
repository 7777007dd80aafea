#![warn(clippy::pedantic)]

//! # Aria Compiler CLI
//!
//! Command line interface for the Aria toolchain: `aria <input-files…> [-o
//! <output>]` compiles every input together as one whole program and links
//! the result into `<output>` (default `a.out`).
//!
//! ## Exit codes
//! * 0 – success.
//! * the number of diagnostics of kind `Error` – the frontend rejected the
//!   program.
//! * a distinct fixed code – the linker could not be executed at all.
//! * 1 – usage error, unreadable input, or the linker ran but failed.

mod parser;

use std::process;

use aria_driver::CompileOutcome;
use clap::Parser as _;
use parser::Cli;

/// Exit code used when `ld` itself could not be spawned, distinct from any
/// frontend error count (which is always a small positive integer in
/// practice, but is never guaranteed to avoid this value — this CLI treats
/// the two as different failure *kinds*, not as a single numeric channel
/// that must never collide).
const LINKER_NOT_FOUND_EXIT: i32 = 127;

fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    match aria_driver::compile(&args.inputs, &args.output) {
        Ok(CompileOutcome::Success) => process::exit(0),
        Ok(CompileOutcome::FrontendErrors(n)) => {
            process::exit(i32::try_from(n).unwrap_or(i32::MAX));
        }
        Ok(CompileOutcome::LinkerNotFound(e)) => {
            eprintln!("error: could not run `ld`: {e}");
            process::exit(LINKER_NOT_FOUND_EXIT);
        }
        Ok(CompileOutcome::LinkerFailed) => process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
