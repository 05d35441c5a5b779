use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Calibrate(args) => args.run(),
        Command::Check(args) => args.run(),
        Command::Merge(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "tiltcal", about = "Kinematic calibration for rotating A/B print heads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive calibration against a device or the simulator.
    Calibrate(cli::calibrate::CalibrateArgs),
    /// Validate a configuration file and the stored link lengths.
    Check(cli::check::CheckArgs),
    /// Merge two calibration reports, e.g. an XY run with a Z-probe run.
    Merge(cli::merge::MergeArgs),
}
