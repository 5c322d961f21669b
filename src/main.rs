use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cli;
mod core;
mod gallery;

use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "gallery-watch")]
#[command(author, version, about = "Track image analysis status and results from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow image analysis status until it settles
    Watch {
        /// Poll interval in milliseconds (overrides config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Output status changes as JSON lines
        #[arg(long)]
        json: bool,

        /// Exit once no image is pending or processing
        #[arg(long)]
        until_settled: bool,
    },

    /// List uploaded images and their analysis status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload an image for analysis (JPEG, PNG, GIF or BMP, up to 5MB)
    Upload {
        /// Image file to upload
        file: PathBuf,

        /// Follow analysis until every image has settled
        #[arg(long)]
        watch: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an uploaded image and its analysis results
    Delete {
        /// Image identifier
        image_id: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Show analysis results for one image
    Results {
        /// Image identifier
        image_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Keep polling until analysis has finished
        #[arg(long)]
        wait: bool,

        /// Open the image in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn init() -> Result<Settings> {
    let settings = Settings::load()?;
    init_logging(settings.debug);
    tracing::debug!(path = ?Settings::config_path(), "Configuration loaded");
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            interval_ms,
            json,
            until_settled,
        } => {
            let mut settings = init()?;
            if let Some(interval_ms) = interval_ms {
                settings.polling.interval_ms = interval_ms;
                settings.polling.max_interval_ms =
                    settings.polling.max_interval_ms.max(interval_ms);
                settings.validate()?;
            }
            cli::watch::run(&settings, cli::watch::WatchOptions { json, until_settled }).await
        }
        Commands::List { json } => {
            let settings = init()?;
            cli::list::run(&settings, json).await
        }
        Commands::Upload { file, watch, json } => {
            let settings = init()?;
            cli::upload::run(&settings, &file, cli::upload::UploadOptions { watch, json }).await
        }
        Commands::Delete { image_id, yes } => {
            let settings = init()?;
            cli::delete::run(&settings, &image_id, yes).await
        }
        Commands::Results {
            image_id,
            json,
            wait,
            open,
        } => {
            let settings = init()?;
            cli::results::run(
                &settings,
                &image_id,
                cli::results::ResultsOptions { json, wait, open },
            )
            .await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
