//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "evo-factory")]
#[command(about = "Autonomous software-evolution orchestration engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (TOML). Falls back to a self-contained
    /// default configuration when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv); overrides `logging.level` from config.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one orchestration cycle against a project.
    Run {
        /// What to change, in natural language.
        #[arg(short, long)]
        task: String,

        /// Root of the project to modify.
        #[arg(short, long)]
        project_path: PathBuf,

        /// Constraints the modification must respect (repeatable).
        #[arg(long)]
        constraint: Vec<String>,

        /// Quality gates the modification must pass (repeatable).
        #[arg(long)]
        quality_gate: Vec<String>,

        /// Original product idea, for architectural placement (spec §4.4).
        #[arg(long)]
        original_idea: Option<String>,

        /// Output format (json, pretty).
        #[arg(long, default_value = "pretty")]
        output: String,
    },

    /// Print the resolved engine configuration and exit.
    ShowConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
