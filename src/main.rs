use std::process::ExitCode;

use clap::Parser;

use tegaki::cli::{run, CliArgs};
use tegaki::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);
    run(args)
}
