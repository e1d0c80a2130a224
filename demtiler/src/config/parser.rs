//! INI parsing logic for converting `Ini` → `PyramidConfig`.
//!
//! This is the single place where INI section and key names are mapped to
//! configuration values.

use std::path::PathBuf;
use std::sync::Arc;

use ini::{Ini, Properties};
use tracing::warn;

use super::{ConfigError, PyramidConfig};
use crate::coord::BoundingBox;
use crate::fetch::HttpClient;
use crate::output::{OutputConfig, TileFormat};
use crate::region::{Region, ZoomRange};
use crate::source::{
    Etopo1, Ned, NedVariant, SourceCatalog, SourceRegistry, ETOPO1_DEFAULT_BASE_DIR,
};

/// Parse an `Ini` object into a `PyramidConfig`.
///
/// Regions, sources and outputs keep the order their sections appear in.
pub(super) fn parse_ini(
    ini: &Ini,
    client: Arc<dyn HttpClient>,
) -> Result<PyramidConfig, ConfigError> {
    let mut regions = Vec::new();
    let mut sources = SourceRegistry::default();
    let mut outputs: Vec<OutputConfig> = Vec::new();
    let mut threads = None;

    for (name, section) in ini.iter() {
        let Some(name) = name else {
            continue;
        };

        if let Some(region_name) = name.strip_prefix("region.") {
            regions.push(parse_region(name, region_name, section)?);
        } else if let Some(kind) = name.strip_prefix("source.") {
            sources.push(parse_source(name, kind, section, &client)?);
        } else if let Some(tag) = name.strip_prefix("output.") {
            let format = TileFormat::from_tag(tag).ok_or_else(|| ConfigError::InvalidValue {
                section: name.to_string(),
                key: "format".to_string(),
                value: tag.to_string(),
                reason: "must be one of: terrarium, tiff".to_string(),
            })?;
            let mut output = OutputConfig::new(format);
            if let Some(dir) = non_empty(section, "output_dir") {
                output.output_dir = expand_tilde(dir);
            }
            outputs.retain(|o| o.format != format);
            outputs.push(output);
        } else if name == "render" {
            if let Some(v) = section.get("threads") {
                threads = Some(parse_number::<usize>(name, "threads", v)?).filter(|&n| n > 0);
            }
        } else {
            warn!(section = name, "Ignoring unknown configuration section");
        }
    }

    Ok(PyramidConfig {
        regions,
        sources,
        outputs,
        threads,
    })
}

fn parse_region(section_name: &str, name: &str, section: &Properties) -> Result<Region, ConfigError> {
    let raw = required(section_name, section, "bbox")?;
    let v = parse_list::<f64>(section_name, "bbox", raw, 4)?;
    let bbox = BoundingBox::new(v[0], v[1], v[2], v[3]).map_err(|e| ConfigError::InvalidValue {
        section: section_name.to_string(),
        key: "bbox".to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    let raw = required(section_name, section, "zoom_range")?;
    let z = parse_list::<u8>(section_name, "zoom_range", raw, 2)?;
    let zoom_range = ZoomRange::new(z[0], z[1]).map_err(|e| ConfigError::InvalidValue {
        section: section_name.to_string(),
        key: "zoom_range".to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Region::new(name, bbox, zoom_range))
}

fn parse_source(
    section_name: &str,
    kind: &str,
    section: &Properties,
    client: &Arc<dyn HttpClient>,
) -> Result<Box<dyn SourceCatalog>, ConfigError> {
    match kind {
        "etopo1" => {
            let url = required(section_name, section, "url")?;
            let base_dir = non_empty(section, "base_dir").unwrap_or(ETOPO1_DEFAULT_BASE_DIR);
            Ok(Box::new(Etopo1::new(url, expand_tilde(base_dir))))
        }
        "ned" | "ned_topobathy" => {
            let variant = if kind == "ned" {
                NedVariant::Normal
            } else {
                NedVariant::Topobathy
            };
            let index_url = required(section_name, section, "index_url")?;
            let base_dir = non_empty(section, "base_dir").unwrap_or(variant.default_base_dir());
            let mut ned = Ned::new(variant, index_url, expand_tilde(base_dir), Arc::clone(client));
            if let Some(v) = section.get("max_resolution") {
                let res = parse_number::<f64>(section_name, "max_resolution", v)?;
                if !(res.is_finite() && res > 0.0) {
                    return Err(ConfigError::InvalidValue {
                        section: section_name.to_string(),
                        key: "max_resolution".to_string(),
                        value: v.to_string(),
                        reason: "must be a positive number of degrees per pixel".to_string(),
                    });
                }
                ned = ned.with_max_resolution(res);
            }
            Ok(Box::new(ned))
        }
        other => Err(ConfigError::InvalidValue {
            section: section_name.to_string(),
            key: "type".to_string(),
            value: other.to_string(),
            reason: "must be one of: etopo1, ned, ned_topobathy".to_string(),
        }),
    }
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(section_name: &str, section: &'a Properties, key: &str) -> Result<&'a str, ConfigError> {
    non_empty(section, key).ok_or_else(|| ConfigError::MissingValue {
        section: section_name.to_string(),
        key: key.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "not a valid number".to_string(),
    })
}

/// Parses exactly `len` comma-separated numbers.
fn parse_list<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
    len: usize,
) -> Result<Vec<T>, ConfigError> {
    let items = value
        .split(',')
        .map(|part| parse_number::<T>(section, key, part))
        .collect::<Result<Vec<T>, _>>()
        .map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("expected {} comma-separated numbers", len),
        })?;
    if items.len() != len {
        return Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("expected {} comma-separated numbers", len),
        });
    }
    Ok(items)
}

pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockHttpClient;
    use crate::region::RegionTile;

    const SAMPLE: &str = r#"
[region.san-francisco]
bbox = -122.5, 37.6, -122.3, 37.85
zoom_range = 0, 16

[region.world]
bbox = -180, -85, 180, 85
zoom_range = 0, 8

[source.ned]
index_url = http://ned/19/
base_dir = /data/ned

[source.etopo1]
url = http://etopo/ETOPO1_Bed_g_geotiff.zip

[output.terrarium]

[output.tiff]
output_dir = /data/tiff

[render]
threads = 4
"#;

    fn parse(text: &str) -> Result<PyramidConfig, ConfigError> {
        PyramidConfig::from_ini_str(text, Arc::new(MockHttpClient::default()))
    }

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();

        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.regions[0].name, "san-francisco");
        assert_eq!(config.regions[0].zoom_range, ZoomRange::new(0, 16).unwrap());
        assert_eq!(config.regions[1].bbox.minx, -180.0);

        // Priority follows section order.
        assert_eq!(config.sources.names(), vec!["ned", "etopo1"]);

        assert_eq!(config.outputs.len(), 2);
        assert_eq!(
            config.output_config(TileFormat::Terrarium).unwrap().output_dir,
            PathBuf::from("terrarium_tiles")
        );
        assert_eq!(
            config.output_config(TileFormat::GeoTiff).unwrap().output_dir,
            PathBuf::from("/data/tiff")
        );
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.outputs().count(), 2);
    }

    #[test]
    fn test_missing_bbox() {
        let result = parse("[region.a]\nzoom_range = 0, 1\n");
        match result {
            Err(ConfigError::MissingValue { section, key }) => {
                assert_eq!(section, "region.a");
                assert_eq!(key, "bbox");
            }
            other => panic!("Expected MissingValue, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let result = parse("[region.a]\nbbox = 10, 0, 5, 1\nzoom_range = 0, 1\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_zoom_range_needs_two_values() {
        let result = parse("[region.a]\nbbox = 0, 0, 1, 1\nzoom_range = 3\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_source_type() {
        let result = parse("[source.srtm]\nurl = http://x\n");
        match result {
            Err(ConfigError::InvalidValue { value, .. }) => assert_eq!(value, "srtm"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_output_format() {
        let result = parse("[output.webp]\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_ned_topobathy_source() {
        let config = parse(
            "[source.ned_topobathy]\nindex_url = http://ned/19/\nmax_resolution = 0.001\n",
        )
        .unwrap();
        assert_eq!(config.sources.names(), vec!["ned_topobathy"]);
    }

    #[test]
    fn test_ned_variants_over_one_base_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let listing = "<a>ned19_n38x00_w122x50_ca_sanfrancisco_2010.zip</a>\n\
                       <a>ned19_n38x00_w122x50_ca_sf_topobathy_2010.zip</a>";
        let text = format!(
            "[source.ned]\nindex_url = http://ned/19/\nbase_dir = {dir}\n\n\
             [source.ned_topobathy]\nindex_url = http://ned/19/\nbase_dir = {dir}\n",
            dir = temp.path().display()
        );
        let tile = RegionTile {
            bbox: crate::coord::BoundingBox::new(-122.4, 37.8, -122.3, 37.9).unwrap(),
            resolution: crate::source::NED_NATIVE_RESOLUTION,
        };
        let counts = |listing: &str| -> Vec<usize> {
            let client = MockHttpClient::default().with("http://ned/19/", Ok(listing.into()));
            let config = PyramidConfig::from_ini_str(&text, Arc::new(client)).unwrap();
            config
                .sources
                .iter()
                .map(|s| s.downloads_for(&tile).unwrap().len())
                .collect()
        };

        assert_eq!(counts(listing), vec![1, 1]);
        // Second run reads both cached indexes.
        assert_eq!(counts(""), vec![1, 1]);
    }

    #[test]
    fn test_invalid_max_resolution() {
        let result = parse("[source.ned]\nindex_url = http://ned/19/\nmax_resolution = -1\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = PyramidConfig::load_from(
            std::path::Path::new("/nonexistent/demtiler.ini"),
            Arc::new(MockHttpClient::default()),
        );
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_expand_tilde_passthrough() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("relative"), PathBuf::from("relative"));
    }
}
