//! Common types and utilities shared across CLI commands.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use demtiler::config::config_file_path;
use demtiler::fetch::{HttpClient, ReqwestClient};
use demtiler::{PyramidConfig, TileFormat};

use crate::error::CliError;

/// Tile format selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FormatArg {
    /// 256px terrarium-encoded RGB PNG
    Terrarium,
    /// 512px signed 16-bit GeoTIFF
    Tiff,
}

impl From<FormatArg> for TileFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Terrarium => TileFormat::Terrarium,
            FormatArg::Tiff => TileFormat::GeoTiff,
        }
    }
}

/// Whether `format` passes an optional `--format` filter.
pub fn format_selected(filter: Option<FormatArg>, format: TileFormat) -> bool {
    filter.map_or(true, |f| TileFormat::from(f) == format)
}

/// Shared HTTP client for index listings and downloads.
pub fn http_client() -> Result<Arc<ReqwestClient>, CliError> {
    ReqwestClient::new().map(Arc::new).map_err(CliError::Http)
}

/// Loads the configuration from `--config` or the default location.
pub fn load_config(
    path: Option<&Path>,
    client: Arc<dyn HttpClient>,
) -> Result<PyramidConfig, CliError> {
    let path: PathBuf = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    Ok(PyramidConfig::load_from(&path, client)?)
}

/// Buffered stdout for JSON Lines output.
pub fn stdout() -> BufWriter<io::StdoutLock<'static>> {
    BufWriter::new(io::stdout().lock())
}

/// Writes one JSON value per line.
pub fn write_line<W: Write, T: serde::Serialize + ?Sized>(
    out: &mut W,
    value: &T,
) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value).map_err(|e| CliError::Output(e.into()))?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Parses exactly `N` comma-separated numbers.
pub fn parse_numbers<T: std::str::FromStr, const N: usize>(
    name: &str,
    value: &str,
) -> Result<[T; N], CliError> {
    let invalid = || {
        CliError::InvalidArgument(format!(
            "--{} expects {} comma-separated numbers, got '{}'",
            name, N, value
        ))
    };
    let parsed = value
        .split(',')
        .map(|part| part.trim().parse::<T>().map_err(|_| invalid()))
        .collect::<Result<Vec<T>, CliError>>()?;
    parsed.try_into().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        let bbox: [f64; 4] = parse_numbers("bbox", "-122.5, 37.6,-122.3,37.85").unwrap();
        assert_eq!(bbox, [-122.5, 37.6, -122.3, 37.85]);

        let zooms: [u8; 2] = parse_numbers("zooms", "0,16").unwrap();
        assert_eq!(zooms, [0, 16]);
    }

    #[test]
    fn test_parse_numbers_wrong_count() {
        let result: Result<[u8; 2], _> = parse_numbers("zooms", "0,1,2");
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_numbers_not_a_number() {
        let result: Result<[f64; 4], _> = parse_numbers("bbox", "a,b,c,d");
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_format_filter() {
        assert!(format_selected(None, TileFormat::GeoTiff));
        assert!(format_selected(Some(FormatArg::Tiff), TileFormat::GeoTiff));
        assert!(!format_selected(Some(FormatArg::Terrarium), TileFormat::GeoTiff));
    }

    #[test]
    fn test_write_line() {
        let mut buf = Vec::new();
        write_line(&mut buf, &demtiler::JobDescriptor::Etopo1).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\"type\":\"etopo1\"}\n");
    }
}
