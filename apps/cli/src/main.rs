//! MediaDL CLI - queue media downloads and watch them finish
//!
//! Resolves pages into downloadable variants, hands them to the task
//! engine and renders live progress until every job is done.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediadl_core::ConfigStore;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MediaDL - media download queue
#[derive(Parser)]
#[command(name = "mediadl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory for MediaDL
    #[arg(long, env = "MEDIADL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve pages, queue a download for each and wait for them
    Grab {
        /// Page URLs or search terms
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Variant label to download (e.g. 720p); prompts when omitted
        #[arg(short = 'f', long)]
        variant: Option<String>,

        /// Never prompt; take the first variant
        #[arg(short, long)]
        yes: bool,
    },

    /// Queue sample jobs and watch them run
    Demo {
        /// Number of jobs to queue
        #[arg(short, long, default_value_t = 4)]
        count: usize,

        /// Cancel this many jobs while they are still connecting
        #[arg(long, default_value_t = 0)]
        cancel: usize,
    },

    /// Show what can be downloaded from pages
    Probe {
        /// Page URLs or search terms
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Show/update settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,

        /// Config value
        value: String,
    },

    /// Show all config
    Show,

    /// Reset to defaults
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Determine data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("mediadl"))
            .unwrap_or_else(|| PathBuf::from(".mediadl"))
    });
    let store = ConfigStore::new(data_dir).await?;

    match cli.command {
        Commands::Grab {
            inputs,
            variant,
            yes,
        } => commands::grab(&store, inputs, variant, yes, cli.output).await?,

        Commands::Demo { count, cancel } => {
            commands::demo(&store, count, cancel, cli.output).await?
        }

        Commands::Probe { inputs } => commands::probe(inputs, cli.output).await?,

        Commands::Config { action } => commands::config_action(&store, action, cli.output).await?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "mediadl", &mut std::io::stdout());
        }
    }

    Ok(())
}
