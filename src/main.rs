//! `bodewell` binary entry point.

use std::process::ExitCode;

use clap::Parser;

use bodewell::cli_app::{Cli, run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("bodewell: {err}");
            ExitCode::FAILURE
        }
    }
}
