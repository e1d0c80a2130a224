//! Pyramid configuration loaded from an INI file.
//!
//! ```ini
//! [region.san-francisco]
//! bbox = -122.5, 37.6, -122.3, 37.85
//! zoom_range = 0, 16
//!
//! [source.ned]
//! index_url = https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation/19/IMG/
//! base_dir = ned
//!
//! [source.etopo1]
//! url = https://www.ngdc.noaa.gov/mgg/global/relief/ETOPO1/data/bedrock/grid_registered/georeferenced_tiff/ETOPO1_Bed_g_geotiff.zip
//!
//! [output.terrarium]
//! output_dir = terrarium_tiles
//! ```
//!
//! Sources are prioritised in the order their sections appear.

mod parser;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ini::Ini;
use thiserror::Error;

use crate::fetch::HttpClient;
use crate::output::{Output, OutputConfig, TileFormat};
use crate::region::Region;
use crate::source::SourceRegistry;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Config file does not exist
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Required key is absent
    #[error("Missing configuration: {section}.{key}")]
    MissingValue { section: String, key: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Everything needed to enumerate and render a pyramid.
///
/// Built once, then shared read-only by every tile and worker.
#[derive(Debug)]
pub struct PyramidConfig {
    pub regions: Vec<Region>,
    pub sources: SourceRegistry,
    pub outputs: Vec<OutputConfig>,
    /// Worker pool size; `None` lets the pool decide.
    pub threads: Option<usize>,
}

impl PyramidConfig {
    /// Load configuration from a specific path.
    pub fn load_from(path: &Path, client: Arc<dyn HttpClient>) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path)?;
        parser::parse_ini(&ini, client)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str, client: Arc<dyn HttpClient>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::ReadError(ini::Error::Parse(e)))?;
        parser::parse_ini(&ini, client)
    }

    pub fn output_config(&self, format: TileFormat) -> Option<&OutputConfig> {
        self.outputs.iter().find(|o| o.format == format)
    }

    /// Tile generators for every configured output.
    pub fn outputs(&self) -> impl Iterator<Item = Output<'_>> {
        self.outputs
            .iter()
            .map(|config| Output::new(config, &self.regions))
    }
}

/// Get the configuration directory (~/.demtiler).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".demtiler")
}

/// Get the path to the config file (~/.demtiler/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
