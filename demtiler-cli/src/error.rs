//! CLI error handling with user-friendly messages.

use std::fmt;
use std::path::PathBuf;
use std::process;

use demtiler::fetch::FetchError;
use demtiler::source::SourceError;
use demtiler::worker::WorkerError;
use demtiler::{ConfigError, CoordError, JobError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration could not be loaded
    Config(ConfigError),
    /// Bad command line value
    InvalidArgument(String),
    /// Failed to set up the HTTP client
    Http(FetchError),
    /// A source could not list its files
    Source(SourceError),
    /// A descriptor line could not be decoded
    Descriptor { line: usize, error: JobError },
    /// Failed to read job input
    Input { path: String, error: std::io::Error },
    /// Failed to write to stdout
    Output(std::io::Error),
    /// The worker pool could not run
    Worker(WorkerError),
    /// Some jobs failed
    JobsFailed { failed: usize, total: usize },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigError::NotFound(path)) => {
                eprintln!();
                eprintln!("Create {} or pass --config <path>.", path.display());
                eprintln!("A minimal configuration:");
                eprintln!();
                eprintln!("  [region.world]");
                eprintln!("  bbox = -180, -85, 180, 85");
                eprintln!("  zoom_range = 0, 6");
                eprintln!();
                eprintln!("  [source.etopo1]");
                eprintln!("  url = <ETOPO1_Bed_g_geotiff.zip URL>");
                eprintln!();
                eprintln!("  [output.terrarium]");
            }
            CliError::JobsFailed { .. } => {
                eprintln!("See the log file for the error of each failed job.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Http(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Source(e) => write!(f, "Source error: {}", e),
            CliError::Descriptor { line, error } => {
                write!(f, "Bad job descriptor on line {}: {}", line, error)
            }
            CliError::Input { path, error } => {
                write!(f, "Failed to read jobs from '{}': {}", path, error)
            }
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
            CliError::Worker(e) => write!(f, "Worker pool error: {}", e),
            CliError::JobsFailed { failed, total } => {
                write!(f, "{} of {} jobs failed", failed, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Descriptor { error, .. } => Some(error),
            CliError::Input { error, .. } => Some(error),
            CliError::Output(e) => Some(e),
            CliError::Worker(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}

impl From<WorkerError> for CliError {
    fn from(e: WorkerError) -> Self {
        CliError::Worker(e)
    }
}

impl From<CoordError> for CliError {
    fn from(e: CoordError) -> Self {
        CliError::InvalidArgument(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Output(e)
    }
}

impl CliError {
    pub fn input(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        CliError::Input {
            path: path.into().display().to_string(),
            error,
        }
    }
}
