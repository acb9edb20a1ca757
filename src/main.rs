//! Head-tracked virtual window: renderer and tracker processes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use parallax_window::{
    app::{run_renderer, TrackerApp},
    config::{Config, EXAMPLE_CONFIG},
    scheduler::install_interrupt_handler,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the scene for the tracked head position
    Render {
        /// Shared mailbox directory
        #[arg(short, long)]
        mailbox: Option<PathBuf>,
    },
    /// Track the viewer's head and display corrected frames
    Track {
        /// Shared mailbox directory
        #[arg(short, long)]
        mailbox: Option<PathBuf>,
    },
    /// Print an example configuration file
    ExampleConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::default(),
    };
    config.validate().context("Invalid configuration")?;

    let shutdown = Arc::new(AtomicBool::new(false));

    match args.command {
        Command::Render { mailbox } => {
            let root = config.mailbox_root(mailbox.as_deref())?;
            install_interrupt_handler(Arc::clone(&shutdown))?;
            run_renderer(&config, &root, &shutdown)?;
        }
        Command::Track { mailbox } => {
            let root = config.mailbox_root(mailbox.as_deref())?;
            install_interrupt_handler(Arc::clone(&shutdown))?;
            let mut app = TrackerApp::new(&config, &root, args.debug, shutdown)?;
            app.run()?;
        }
        Command::ExampleConfig => print!("{EXAMPLE_CONFIG}"),
    }

    Ok(())
}
