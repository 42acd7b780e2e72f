//! Captionist - image captioning web app and CLI.
//!
//! Upload an image, get a BLIP caption, and optionally have IBM watsonx.ai
//! rewrite it for a stated purpose.
//!
//! # Usage
//!
//! ```bash
//! # Fetch the captioning model
//! captionist models download
//!
//! # Run the upload page on http://127.0.0.1:5000
//! captionist serve
//!
//! # Caption a single file
//! captionist caption cat.jpg --purpose marketing
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// Captionist - BLIP image captions with optional watsonx.ai refinement.
#[derive(Parser, Debug)]
#[command(name = "captionist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the upload web page
    Serve(cli::serve::ServeArgs),

    /// Caption a single image file
    Caption(cli::caption::CaptionArgs),

    /// Manage the captioning model (download, list, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Credentials may live in a .env file next to the working directory.
    let dotenv = dotenvy::dotenv();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match captionist_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `captionist config path`."
            );
            captionist_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Captionist v{}", captionist_core::VERSION);
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to read .env file: {e}"),
    }

    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args).await,
        Commands::Caption(args) => cli::caption::execute(args).await,
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
