//! assetpipe - Command-line tool for building and serving static asset pipelines

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
