//! ETOPO1 global relief model: a single worldwide GeoTIFF.

use std::path::{Path, PathBuf};

use crate::coord::BoundingBox;
use crate::fetch::{Unpack, Verifier};
use crate::job::{JobDescriptor, JobError};
use crate::raster::{ResampleFilter, Srs};
use crate::region::RegionTile;

use super::{SourceCatalog, SourceError, SourceFile};

/// Name of the raster inside the published archive.
pub const TARGET_NAME: &str = "ETOPO1_Bed_g_geotiff.tif";

/// Default directory for the unpacked file.
pub const DEFAULT_BASE_DIR: &str = "etopo1";

const TAG: &str = "etopo1";

/// The ETOPO1 bedrock dataset.
#[derive(Debug, Clone)]
pub struct Etopo1 {
    url: String,
    base_dir: PathBuf,
}

impl Etopo1 {
    pub fn new(url: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn output_file(&self) -> PathBuf {
        self.base_dir.join(TARGET_NAME)
    }

    /// The one download handle this source ever produces.
    pub fn file(&self) -> SourceFile {
        SourceFile {
            name: TARGET_NAME.to_string(),
            urls: vec![self.url.clone()],
            output_file: self.output_file(),
            bbox: BoundingBox {
                minx: -180.0,
                miny: -90.0,
                maxx: 180.0,
                maxy: 90.0,
            },
            verifier: Verifier::Zip,
            unpack: Unpack::ZipMember(TARGET_NAME.to_string()),
            descriptor: JobDescriptor::Etopo1,
        }
    }
}

impl SourceCatalog for Etopo1 {
    fn name(&self) -> &str {
        TAG
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn get_index(&self) -> Result<(), SourceError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| SourceError::Io {
            path: self.base_dir.clone(),
            source: e,
        })
    }

    fn existing_files(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        let output = self.output_file();
        Box::new(std::iter::once(output).filter(|p| p.is_file()))
    }

    fn downloads_for(&self, _tile: &RegionTile) -> Result<Vec<SourceFile>, SourceError> {
        Ok(vec![self.file()])
    }

    fn srs(&self) -> Srs {
        Srs::Wgs84
    }

    fn filter_type(&self, _src_res: f64, _dst_res: f64) -> ResampleFilter {
        ResampleFilter::Lanczos
    }

    fn rehydrate(&self, descriptor: &JobDescriptor) -> Result<SourceFile, JobError> {
        descriptor.expect_tag(TAG)?;
        Ok(self.file())
    }
}
