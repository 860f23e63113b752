use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use crate::primes::{run_primes, PrimesArgs};
use crate::worker::{run_worker, WorkerArgs};

#[derive(Parser)]
#[command(version, name = "drover", about = "Runs jobs on workers provisioned over SSH")]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Verbosity {
    /// Display error and warning messages only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Display debug messages
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Verbosity {
    fn level(&self) -> Option<LevelFilter> {
        match (self.quiet, self.verbose) {
            (true, _) => Some(LevelFilter::Warn),
            (_, true) => Some(LevelFilter::Debug),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Find all the primes below a number on provisioned workers
    Primes(PrimesArgs),
    /// Run a worker in the foreground
    Worker(WorkerArgs),
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);
    let level = cli.verbosity.level();

    match cli.command {
        Command::Primes(args) => run_primes(args, level),
        Command::Worker(args) => run_worker(args, level),
    }
}
