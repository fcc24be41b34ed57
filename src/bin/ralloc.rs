//! The register-allocator driver.  Takes a register budget, a one-letter
//! algorithm code, and an ILOC file; prints the rewritten block to stdout.
//!
//! Run with `--help` for more info.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use ralloc::back::{allocate, Algorithm};
use ralloc::front;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// number of registers for the target machine
    registers: usize,
    /// algorithm used to allocate registers
    #[arg(value_enum)]
    algorithm: Code,
    /// the file containing the ILOC block
    filename: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Code {
    /// bottom-up approach
    B,
    /// simple top-down (no live ranges)
    S,
    /// top-down with live ranges and max live
    T,
    /// linear-scan allocator
    O,
}

impl From<Code> for Algorithm {
    fn from(code: Code) -> Algorithm {
        match code {
            Code::B => Algorithm::BottomUp,
            Code::S => Algorithm::Simple,
            Code::T => Algorithm::TopDown,
            Code::O => Algorithm::LinearScan,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.registers < 2 {
        eprintln!("number of registers must be at least 2.");
        return ExitCode::FAILURE;
    }

    let input = match std::fs::read_to_string(&args.filename) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("cannot read {}: {err}", args.filename);
            return ExitCode::FAILURE;
        }
    };
    let insts = match front::parse(&input) {
        Ok(insts) => insts,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    for inst in allocate(&insts, args.registers, args.algorithm.into()) {
        println!("{inst}");
    }
    ExitCode::SUCCESS
}
