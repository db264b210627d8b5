use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod common;
mod commands;

#[derive(Parser)]
#[command(name = "marksync", version, about = "Offline-first mark capture and sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and list marks
    Mark {
        #[command(subcommand)]
        action: commands::mark::MarkAction,
    },
    /// Push queued marks and inspect sync state
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Grade calculations
    Grade {
        #[command(subcommand)]
        action: commands::grade::GradeAction,
    },
    /// Cached students, classes and subjects
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marksync=info,marksync_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Mark { action } => commands::mark::run(action),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Grade { action } => commands::grade::run(action),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
