use anyhow::Result;
use clap::Parser;

use citypack::cli::{Cli, Commands};
use citypack::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Buildings(args) => commands::buildings(&cli, args),
        Commands::Demand(args) => commands::demand(&cli, args),
        Commands::All(args) => commands::all(&cli, args),
        Commands::Validate(args) => commands::validate(&cli, args),
        Commands::Serve(args) => commands::serve(&cli, args),
    }
}
