use anyhow::Result;
use clap::Parser;

use heatgrid::cli::{Cli, Commands};
use heatgrid::commands::run;
use heatgrid::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match &cli.command {
        Commands::Run(args) => run::run(&cli, args),
    }
}
