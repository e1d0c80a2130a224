//! Download handles for individual source files.

use std::path::PathBuf;

use crate::coord::BoundingBox;
use crate::fetch::{Unpack, Verifier};
use crate::job::JobDescriptor;
use crate::vrt::Footprint;

/// One file a source needs on disk, and how to get it there.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// File name as published by the provider.
    pub name: String,
    /// Candidate download URLs, tried in order.
    pub urls: Vec<String>,
    /// Where the usable raster ends up.
    pub output_file: PathBuf,
    /// Geographic footprint in degrees.
    pub bbox: BoundingBox,
    pub verifier: Verifier,
    pub unpack: Unpack,
    pub(crate) descriptor: JobDescriptor,
}

impl SourceFile {
    /// Serializable descriptor from which the owning source can rebuild
    /// this handle.
    pub fn freeze_dry(&self) -> JobDescriptor {
        self.descriptor.clone()
    }
}

impl Footprint for SourceFile {
    fn footprint(&self) -> BoundingBox {
        self.bbox
    }
}
