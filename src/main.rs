//! `vidbridge` CLI - search and download through configured backends

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vidbridge")]
#[command(about = "Search and download videos through out-of-process MCP backends")]
#[command(version)]
struct Cli {
    /// Backends config file [default: ~/.config/vidbridge/backends.json]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured backends in fallback order
    Backends {
        /// Print the configuration as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search enabled backends; the first one with results answers
    Search {
        /// Search terms
        query: String,

        /// Only return items up to this many seconds long
        #[arg(short = 'd', long)]
        max_duration: Option<f64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show details for one item from one backend
    Details {
        /// Backend id
        backend: String,

        /// Item id
        id: String,

        /// Print details as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the opening segment of an item
    Download {
        /// Item id
        id: String,

        /// Backend id (default: youtube via yt-dlp)
        #[arg(short, long)]
        backend: Option<String>,

        /// Output file (default: ./<id>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds to download from the start
        #[arg(short, long, default_value = "30")]
        segment: f64,

        /// Maximum video height for yt-dlp downloads
        #[arg(long)]
        max_height: Option<u32>,

        /// Refuse yt-dlp output paths outside this directory
        #[arg(long)]
        cache_root: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .unwrap_or_else(vidbridge::config::default_config_path);

    match cli.command {
        Commands::Backends { json } => {
            cmd::cmd_backends(&config_path, json)?;
        }
        Commands::Search {
            query,
            max_duration,
            json,
        } => {
            cmd::cmd_search(&config_path, &query, max_duration, json).await?;
        }
        Commands::Details { backend, id, json } => {
            cmd::cmd_details(&config_path, &backend, &id, json).await?;
        }
        Commands::Download {
            id,
            backend,
            output,
            segment,
            max_height,
            cache_root,
            json,
        } => {
            let options = cmd::DownloadOptions {
                backend,
                output,
                segment,
                max_height,
                cache_root,
                json,
            };
            cmd::cmd_download(&config_path, &id, options).await?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout only carries results.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
