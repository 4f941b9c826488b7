use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use time::UtcOffset;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{AddArgs, CategoryArgs, EditArgs, FeedArgs, Journal};

#[derive(Parser, Debug)]
#[command(
    name = "til",
    version,
    about = "Today-I-learned journal with a day-bucketed feed"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over TIL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over TIL_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a new entry
    Add(AddArgs),
    /// Print the newest pages of the feed (default)
    Feed(FeedArgs),
    /// Replace the content of an entry
    Edit(EditArgs),
    /// Move an entry to another category
    Category(CategoryArgs),
    /// List the configured categories
    Categories,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("TIL_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("TIL_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    // The local offset can only be read while the process is single threaded.
    let offset = config.feed.resolved_offset().unwrap_or_else(local_offset);
    let store = storage::init(&paths, &config.storage)?;

    let journal = Journal::new(config, Arc::new(store), offset);
    let command = cli.command.unwrap_or(Commands::Feed(FeedArgs::default()));
    match command {
        Commands::Add(args) => commands::add_entry(&journal, args),
        Commands::Feed(args) => commands::print_feed(&journal, args),
        Commands::Edit(args) => commands::edit_entry(&journal, args),
        Commands::Category(args) => commands::change_category(&journal, args),
        Commands::Categories => commands::list_categories(&journal),
    }
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or_else(|err| {
        tracing::warn!(%err, "local UTC offset unavailable, bucketing days in UTC");
        UtcOffset::UTC
    })
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
