use clap::Parser;
use wfsim::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
