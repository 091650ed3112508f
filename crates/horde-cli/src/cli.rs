use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hd",
    about = "Horde: a multi-agent orchestration harness",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the encampment's invariants and optionally repair them
    Doctor {
        /// Repair what detection flagged
        #[arg(long, conflicts_with = "dry_run")]
        fix: bool,

        /// Show what fix mode would do without mutating anything
        #[arg(long)]
        dry_run: bool,

        /// Narrow the run to one warband
        #[arg(long)]
        warband: Option<String>,

        /// Allow repairs that rewrite settings to also bounce the
        /// agent's running session
        #[arg(long)]
        restart_sessions: bool,

        /// Exempt a check from repair (repeatable)
        #[arg(long = "skip", value_name = "CHECK")]
        skip: Vec<String>,

        /// Encampment root (discovered from the cwd by default)
        #[arg(long)]
        root: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
