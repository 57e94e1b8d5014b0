mod cmd;
mod input;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use dor_core::report::Verbosity;
use dor_core::types::CardType;
use dor_core::Analyzer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dor",
    about = "Definition-of-Readiness reports for backlog tickets",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest .dor.yaml, else built-in defaults)
    #[arg(long, global = true, env = "DOR_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single ticket file (or - for stdin)
    Analyze {
        /// Ticket JSON file, or - to read stdin
        input: String,

        /// Report detail: brief, balanced, or detailed
        #[arg(long, default_value = "balanced")]
        verbosity: Verbosity,
    },

    /// Analyze every ticket in the given files and directories
    Batch {
        /// Ticket files or directories of *.json files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List required fields per card type
    Requirements {
        /// Only show this card type
        #[arg(long = "type")]
        card_type: Option<CardType>,
    },

    /// Inspect the readiness configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, source) = root::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { input, verbosity } => {
            let analyzer = Analyzer::new(config)?;
            cmd::analyze::run(&analyzer, &input, verbosity, cli.json)
        }
        Commands::Batch { paths } => {
            let analyzer = Analyzer::new(config)?;
            cmd::batch::run(&analyzer, &paths, cli.json)
        }
        Commands::Requirements { card_type } => cmd::requirements::run(card_type, cli.json),
        Commands::Config { subcommand } => {
            cmd::config::run(&config, source.as_deref(), subcommand, cli.json)
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        // Full error chain
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
