mod log;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Synthesizes virtual views from a set of depth-augmented input views.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the run's JSON configuration file.
    config: PathBuf,
}

fn main() -> ExitCode {
    log::initialize("dibr=info");

    let args = Args::parse();

    match dibr::Pipeline::open(&args.config).and_then(|pipeline| pipeline.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
