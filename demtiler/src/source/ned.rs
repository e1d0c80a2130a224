//! USGS National Elevation Dataset at 1/9 arc-second.
//!
//! NED is published as many quarter-degree cells, one file each. File names
//! encode the north-west corner of the cell, the state, a project name and
//! the survey year, e.g. `ned19_n38x25_w122x50_ca_sanfrancisco_2010.zip`.
//! Projects covering coastal bathymetry carry a `topobathy` segment and are
//! treated as a separate source.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::coord::BoundingBox;
use crate::fetch::{HttpClient, Unpack, Verifier};
use crate::job::{JobDescriptor, JobError};
use crate::raster::{ResampleFilter, Srs};
use crate::region::RegionTile;

use super::{SourceCatalog, SourceError, SourceFile};

/// Default directory for plain NED files and their cached index.
pub const DEFAULT_BASE_DIR: &str = "ned";

/// Default directory for topobathy files and their cached index.
pub const DEFAULT_TOPOBATHY_BASE_DIR: &str = "ned_topobathy";

/// Side of one NED cell, in degrees.
pub const CELL_SIZE: f64 = 0.25;

/// Native resolution of 1/9 arc-second data, in degrees per pixel.
pub const NATIVE_RESOLUTION: f64 = 1.0 / 32_400.0;

/// Coarsest tile resolution (degrees per pixel) NED is used for by default.
pub const DEFAULT_MAX_RESOLUTION: f64 = 10.0 * NATIVE_RESOLUTION;

const TOPOBATHY_SEGMENT: &str = "_topobathy";

/// Whether a NED source holds plain land surveys or topobathy projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NedVariant {
    Normal,
    Topobathy,
}

impl NedVariant {
    fn tag(&self) -> &'static str {
        match self {
            NedVariant::Normal => "ned",
            NedVariant::Topobathy => "ned_topobathy",
        }
    }

    /// Directory used when the configuration names none.
    pub fn default_base_dir(&self) -> &'static str {
        match self {
            NedVariant::Normal => DEFAULT_BASE_DIR,
            NedVariant::Topobathy => DEFAULT_TOPOBATHY_BASE_DIR,
        }
    }

    /// Cached index file name. Keyed by variant because the cache holds
    /// only the names this variant accepts.
    fn index_file(&self) -> String {
        format!("index_{}.txt", self.tag())
    }

    fn accepts(&self, name: &str) -> bool {
        let topobathy = name.contains(TOPOBATHY_SEGMENT);
        match self {
            NedVariant::Normal => !topobathy,
            NedVariant::Topobathy => topobathy,
        }
    }

    fn descriptor(&self, name: &str) -> JobDescriptor {
        match self {
            NedVariant::Normal => JobDescriptor::Ned {
                name: name.to_string(),
            },
            NedVariant::Topobathy => JobDescriptor::NedTopobathy {
                name: name.to_string(),
            },
        }
    }
}

/// Pattern for a complete NED file name.
///
/// Groups: 1 `n`/`s`, 2 degrees, 3 hundredths, 4 `e`/`w`, 5 degrees,
/// 6 hundredths, 7 survey year, 8 extension.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^ned19_([ns])([0-9]{2})x([0257][05])_([ew])([0-9]{3})x([0257][05])_[a-z]{2}(?:_[a-z0-9]+)+_(20[0-9]{2})\.(zip|img)$",
        )
        .unwrap()
    })
}

/// Pattern for NED names embedded in an HTML directory listing.
fn listing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ned19_[a-z0-9_]+\.(?:zip|img)").unwrap())
}

/// One published NED file.
#[derive(Debug, Clone, PartialEq)]
pub struct NedFile {
    pub name: String,
    pub bbox: BoundingBox,
    pub year: u16,
}

impl NedFile {
    /// Parses a published file name. Returns `None` for names that are not
    /// 1/9 arc-second cells.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = name_pattern().captures(name)?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

        let lat = part(2).parse::<f64>().ok()? + part(3).parse::<f64>().ok()? / 100.0;
        let lat = if part(1) == "s" { -lat } else { lat };
        let lon = part(5).parse::<f64>().ok()? + part(6).parse::<f64>().ok()? / 100.0;
        let lon = if part(4) == "w" { -lon } else { lon };
        let year = part(7).parse::<u16>().ok()?;

        Some(Self {
            name: name.to_string(),
            bbox: BoundingBox {
                minx: lon,
                miny: lat - CELL_SIZE,
                maxx: lon + CELL_SIZE,
                maxy: lat,
            },
            year,
        })
    }

    /// Name of the raster once unpacked.
    pub fn raster_name(&self) -> String {
        match self.name.strip_suffix(".zip") {
            Some(stem) => format!("{}.img", stem),
            None => self.name.clone(),
        }
    }
}

/// A NED source of one variant.
pub struct Ned {
    variant: NedVariant,
    index_url: String,
    base_dir: PathBuf,
    max_resolution: f64,
    client: Arc<dyn HttpClient>,
    index: RwLock<Option<Arc<Vec<NedFile>>>>,
}

impl Ned {
    pub fn new(
        variant: NedVariant,
        index_url: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            variant,
            index_url: index_url.into(),
            base_dir: base_dir.into(),
            max_resolution: DEFAULT_MAX_RESOLUTION,
            client,
            index: RwLock::new(None),
        }
    }

    /// Overrides the coarsest tile resolution this source is used for.
    pub fn with_max_resolution(mut self, max_resolution: f64) -> Self {
        self.max_resolution = max_resolution;
        self
    }

    pub fn variant(&self) -> NedVariant {
        self.variant
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(self.variant.index_file())
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.index_url.trim_end_matches('/'), name)
    }

    fn to_source_file(&self, file: &NedFile) -> SourceFile {
        let (verifier, unpack) = if file.name.ends_with(".zip") {
            (Verifier::Zip, Unpack::ZipMember(file.raster_name()))
        } else {
            (Verifier::NonEmpty, Unpack::Place)
        };
        SourceFile {
            name: file.name.clone(),
            urls: vec![self.file_url(&file.name)],
            output_file: self.base_dir.join(file.raster_name()),
            bbox: file.bbox,
            verifier,
            unpack,
            descriptor: self.variant.descriptor(&file.name),
        }
    }

    /// Parses, filters and orders names: newest survey first, then by name.
    fn build_index<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<NedFile> {
        let mut files: Vec<NedFile> = names
            .filter(|n| self.variant.accepts(n))
            .filter_map(NedFile::parse)
            .collect();
        files.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.name.cmp(&b.name)));
        files.dedup_by(|a, b| a.name == b.name);
        files
    }

    fn load_index(&self) -> Result<Vec<NedFile>, SourceError> {
        let index_path = self.index_path();
        if index_path.is_file() {
            let text = std::fs::read_to_string(&index_path).map_err(|e| SourceError::Io {
                path: index_path.clone(),
                source: e,
            })?;
            let files = self.build_index(text.lines().map(str::trim));
            if !files.is_empty() {
                debug!(source = self.name(), files = files.len(), "Loaded cached index");
                return Ok(files);
            }
            warn!(
                source = self.name(),
                path = %index_path.display(),
                "Cached index has no usable names, refetching"
            );
        }

        info!(source = self.name(), url = %self.index_url, "Fetching file index");
        let body = self.client.get(&self.index_url)?;
        let listing = String::from_utf8_lossy(&body);
        let files = self.build_index(listing_pattern().find_iter(&listing).map(|m| m.as_str()));
        if files.is_empty() {
            return Err(SourceError::Index {
                source_name: self.name().to_string(),
                reason: format!("no matching files listed at {}", self.index_url),
            });
        }

        std::fs::create_dir_all(&self.base_dir).map_err(|e| SourceError::Io {
            path: self.base_dir.clone(),
            source: e,
        })?;
        let text: String = files.iter().map(|f| format!("{}\n", f.name)).collect();
        std::fs::write(&index_path, text).map_err(|e| SourceError::Io {
            path: index_path.clone(),
            source: e,
        })?;
        info!(source = self.name(), files = files.len(), "Saved file index");
        Ok(files)
    }

    /// The loaded index, loading it on first use.
    pub fn index(&self) -> Result<Arc<Vec<NedFile>>, SourceError> {
        if let Some(index) = self.index.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        let mut guard = self.index.write();
        if let Some(index) = guard.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(self.load_index()?);
        *guard = Some(Arc::clone(&index));
        Ok(index)
    }
}

impl SourceCatalog for Ned {
    fn name(&self) -> &str {
        self.variant.tag()
    }

    fn tag(&self) -> &'static str {
        self.variant.tag()
    }

    fn get_index(&self) -> Result<(), SourceError> {
        self.index().map(|_| ())
    }

    fn existing_files(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        let pattern = self.base_dir.join("ned19_*.img");
        let paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(_) => return Box::new(std::iter::empty()),
        };
        let variant = self.variant;
        Box::new(paths.filter_map(Result::ok).filter(move |path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| variant.accepts(n) && NedFile::parse(n).is_some())
        }))
    }

    fn downloads_for(&self, tile: &RegionTile) -> Result<Vec<SourceFile>, SourceError> {
        if tile.resolution > self.max_resolution {
            return Ok(Vec::new());
        }
        let index = self.index()?;
        Ok(index
            .iter()
            .filter(|f| f.bbox.intersects(&tile.bbox))
            .map(|f| self.to_source_file(f))
            .collect())
    }

    fn srs(&self) -> Srs {
        Srs::Nad83
    }

    fn filter_type(&self, src_res: f64, dst_res: f64) -> ResampleFilter {
        if src_res < dst_res {
            ResampleFilter::Lanczos
        } else {
            ResampleFilter::Bilinear
        }
    }

    fn rehydrate(&self, descriptor: &JobDescriptor) -> Result<SourceFile, JobError> {
        descriptor.expect_tag(self.tag())?;
        let (JobDescriptor::Ned { name } | JobDescriptor::NedTopobathy { name }) = descriptor
        else {
            return Err(JobError::TagMismatch {
                expected: self.tag(),
                found: descriptor.tag(),
            });
        };
        let unknown = || JobError::UnknownFile {
            source_name: self.name().to_string(),
            name: name.clone(),
        };
        if !self.variant.accepts(name) {
            return Err(unknown());
        }
        let file = NedFile::parse(name).ok_or_else(unknown)?;
        Ok(self.to_source_file(&file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockHttpClient;
    use tempfile::TempDir;

    const LISTING: &str = r#"<html><body>
        <a href="ned19_n38x00_w122x50_ca_sanfrancisco_2010.zip">a</a>
        <a href="ned19_n38x00_w122x50_ca_bayarea_2013.zip">b</a>
        <a href="ned19_n38x00_w122x50_ca_sf_topobathy_2010.zip">c</a>
        <a href="ned19_n40x25_w105x75_co_denver_2008.img">d</a>
        <a href="ned19_n40x25_w105x75_co_denver_2008.xml">metadata</a>
        </body></html>"#;

    fn ned(dir: &Path, variant: NedVariant, listing: &str) -> Ned {
        let client = MockHttpClient::default().with("http://ned/19/", Ok(listing.as_bytes().to_vec()));
        Ned::new(variant, "http://ned/19/", dir.join("ned"), Arc::new(client))
    }

    fn tile(minx: f64, miny: f64, maxx: f64, maxy: f64) -> RegionTile {
        RegionTile {
            bbox: BoundingBox::new(minx, miny, maxx, maxy).unwrap(),
            resolution: NATIVE_RESOLUTION,
        }
    }

    #[test]
    fn test_parse_name_north_west_corner() {
        let file = NedFile::parse("ned19_n38x25_w122x50_ca_sanfrancisco_2010.zip").unwrap();
        assert_eq!(file.year, 2010);
        assert_eq!(
            file.bbox,
            BoundingBox {
                minx: -122.5,
                miny: 38.0,
                maxx: -122.25,
                maxy: 38.25,
            }
        );
        assert_eq!(file.raster_name(), "ned19_n38x25_w122x50_ca_sanfrancisco_2010.img");
    }

    #[test]
    fn test_parse_southern_eastern_hemispheres() {
        let file = NedFile::parse("ned19_s14x25_e170x75_as_samoa_2012.img").unwrap();
        assert_eq!(file.bbox.maxy, -14.25);
        assert_eq!(file.bbox.minx, 170.75);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(NedFile::parse("ned19_n38x10_w122x50_ca_sf_2010.zip").is_none());
        assert!(NedFile::parse("ned13_n38x00_w122x50_ca_sf_2010.zip").is_none());
        assert!(NedFile::parse("ned19_n38x00_w122x50_ca_sf_1999.zip").is_none());
    }

    #[test]
    fn test_variant_filters_topobathy() {
        let name = "ned19_n38x00_w122x50_ca_sf_topobathy_2010.zip";
        assert!(!NedVariant::Normal.accepts(name));
        assert!(NedVariant::Topobathy.accepts(name));
    }

    #[test]
    fn test_index_fetched_then_cached() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        source.get_index().unwrap();
        let index = source.index().unwrap();
        assert_eq!(index.len(), 3);
        // Newest survey first.
        assert_eq!(index[0].name, "ned19_n38x00_w122x50_ca_bayarea_2013.zip");
        assert!(source.base_dir().join("index_ned.txt").is_file());

        // A fresh source reads the cached index without touching the network.
        let offline = ned(temp.path(), NedVariant::Normal, "");
        assert_eq!(offline.index().unwrap().len(), 3);
    }

    #[test]
    fn test_variants_share_a_directory() {
        let temp = TempDir::new().unwrap();
        let normal = ned(temp.path(), NedVariant::Normal, LISTING);
        let topobathy = ned(temp.path(), NedVariant::Topobathy, LISTING);
        let area = tile(-122.4, 37.8, -122.3, 37.9);

        assert_eq!(normal.downloads_for(&area).unwrap().len(), 2);
        assert_eq!(topobathy.downloads_for(&area).unwrap().len(), 1);

        // Fresh sources over the same directory read their own caches.
        let normal = ned(temp.path(), NedVariant::Normal, "");
        let topobathy = ned(temp.path(), NedVariant::Topobathy, "");
        assert_eq!(topobathy.downloads_for(&area).unwrap().len(), 1);
        assert_eq!(normal.downloads_for(&area).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_cached_index_is_refetched() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Topobathy, LISTING);
        std::fs::create_dir_all(source.base_dir()).unwrap();
        let cache = source.base_dir().join("index_ned_topobathy.txt");
        std::fs::write(&cache, "ned19_n38x00_w122x50_ca_sanfrancisco_2010.zip\n").unwrap();

        assert_eq!(source.index().unwrap().len(), 1);
        let cached = std::fs::read_to_string(&cache).unwrap();
        assert_eq!(cached.trim(), "ned19_n38x00_w122x50_ca_sf_topobathy_2010.zip");
    }

    #[test]
    fn test_default_base_dirs_differ() {
        assert_eq!(NedVariant::Normal.default_base_dir(), "ned");
        assert_eq!(NedVariant::Topobathy.default_base_dir(), "ned_topobathy");
    }

    #[test]
    fn test_empty_listing_is_an_error() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, "<html></html>");
        assert!(matches!(
            source.get_index(),
            Err(SourceError::Index { .. })
        ));
    }

    #[test]
    fn test_downloads_for_intersecting_cells() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        let files = source
            .downloads_for(&tile(-122.4, 37.8, -122.3, 37.9))
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ned19_n38x00_w122x50_ca_bayarea_2013.zip",
                "ned19_n38x00_w122x50_ca_sanfrancisco_2010.zip",
            ]
        );
        assert_eq!(files[0].urls[0], "http://ned/19/ned19_n38x00_w122x50_ca_bayarea_2013.zip");
        assert_eq!(files[0].verifier, Verifier::Zip);

        // Same cell, so the two surveys must land in separate groups.
        let groups = source.vrts_for(&tile(-122.4, 37.8, -122.3, 37.9)).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_coarse_tiles_skip_ned() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        let mut coarse = tile(-123.0, 37.0, -122.0, 38.0);
        coarse.resolution = 0.01;
        assert!(source.downloads_for(&coarse).unwrap().is_empty());
    }

    #[test]
    fn test_filter_policy() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        assert_eq!(source.filter_type(0.0001, 0.001), ResampleFilter::Lanczos);
        assert_eq!(source.filter_type(0.001, 0.0001), ResampleFilter::Bilinear);
        assert_eq!(source.srs(), Srs::Nad83);
    }

    #[test]
    fn test_rehydrate_round_trip() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Topobathy, LISTING);
        let file = source
            .downloads_for(&tile(-122.4, 37.8, -122.3, 37.9))
            .unwrap()
            .remove(0);
        let frozen = file.freeze_dry();
        assert_eq!(frozen.tag(), "ned_topobathy");
        assert_eq!(source.rehydrate(&frozen).unwrap(), file);
    }

    #[test]
    fn test_rehydrate_rejects_foreign_names() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        let result = source.rehydrate(&JobDescriptor::Ned {
            name: "ned19_n38x00_w122x50_ca_sf_topobathy_2010.zip".to_string(),
        });
        assert!(matches!(result, Err(JobError::UnknownFile { .. })));
        let result = source.rehydrate(&JobDescriptor::NedTopobathy {
            name: "whatever".to_string(),
        });
        assert!(matches!(result, Err(JobError::TagMismatch { .. })));
    }

    #[test]
    fn test_existing_files_globs_base_dir() {
        let temp = TempDir::new().unwrap();
        let source = ned(temp.path(), NedVariant::Normal, LISTING);
        std::fs::create_dir_all(source.base_dir()).unwrap();
        assert_eq!(source.existing_files().count(), 0);

        std::fs::write(
            source.base_dir().join("ned19_n38x00_w122x50_ca_sanfrancisco_2010.img"),
            b"img",
        )
        .unwrap();
        std::fs::write(
            source.base_dir().join("ned19_n38x00_w122x50_ca_sf_topobathy_2010.img"),
            b"img",
        )
        .unwrap();
        assert_eq!(source.existing_files().count(), 1);
    }
}
