//! Horde CLI: the `hd` command.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor {
            fix,
            dry_run,
            warband,
            restart_sessions,
            skip,
            root,
            json,
        } => commands::doctor::run(commands::doctor::Args {
            fix,
            dry_run,
            warband,
            restart_sessions,
            skip,
            root,
            json,
        }),
    }
}
