//! taskforest - hierarchical task lists that travel as a single token

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = taskforest::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
