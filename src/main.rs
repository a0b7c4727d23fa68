//! Hub Migrate - Dependency-aware content migration between content hubs

use std::process::ExitCode;

fn main() -> ExitCode {
    match hub_migrate::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
