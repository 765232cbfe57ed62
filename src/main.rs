//! aerosql CLI entry point
//!
//! Parses arguments, runs the selected command and exits non-zero on a
//! fatal error. All logic lives in the `cli` module.

use aerosql::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
