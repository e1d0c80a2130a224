//! demtiler CLI - Command-line interface
//!
//! Lists tile and download jobs as JSON Lines and runs them on a local
//! worker pool. Listing and running are separate so that job lists can be
//! split and handed to other machines sharing the same configuration.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use demtiler::logging::{default_log_dir, default_log_file, init_logging};

use commands::common::FormatArg;
use error::CliError;

#[derive(Parser)]
#[command(name = "demtiler")]
#[command(version, about = "Build elevation tile pyramids from public DEM datasets", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.demtiler/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the log file (default: ~/.demtiler/logs)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a render job for every tile of every configured output
    Tiles {
        /// Only this output format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Print a fetch job for every source file the tiles need
    Downloads {
        /// Only tiles of this output format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Print the covering box and resolution of an area at each zoom
    Expand {
        /// Area as minlon,minlat,maxlon,maxlat
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// Half-open zoom range as start,end
        #[arg(long)]
        zooms: String,

        /// Tile size to compute resolutions for
        #[arg(long, value_enum, default_value = "terrarium")]
        format: FormatArg,
    },

    /// Run job descriptors (JSON Lines) on the worker pool
    Run {
        /// Read jobs from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Worker threads (default: [render] threads, or one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let _logging_guard = match init_logging(&log_dir, default_log_file()) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Tiles { format } => commands::tiles::run_tiles(config, format),
        Commands::Downloads { format } => commands::tiles::run_downloads(config, format),
        Commands::Expand {
            bbox,
            zooms,
            format,
        } => commands::expand::run(&bbox, &zooms, format),
        Commands::Run {
            input,
            threads,
            progress,
        } => commands::run::run(config, input.as_deref(), threads, progress),
    }
}
