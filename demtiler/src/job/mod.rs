//! Serializable job descriptors.
//!
//! Every unit of work (rendering a tile, fetching a source file) can be
//! "freeze-dried" into a small tagged JSON object, shipped to any worker and
//! "rehydrated" there against the same configuration. On the wire each
//! descriptor sits on its own line (JSON Lines).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::{CoordError, TileCoord};

/// Errors raised while decoding or rehydrating a descriptor.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unable to rehydrate job of type '{found}' as '{expected}'")]
    TagMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("malformed job descriptor: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid tile in job descriptor: {0}")]
    InvalidTile(#[from] CoordError),

    #[error("no configured {kind} handles job of type '{tag}'")]
    NoHandler { kind: &'static str, tag: &'static str },

    #[error("unknown {source_name} file '{name}'")]
    UnknownFile { source_name: String, name: String },
}

/// A frozen job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobDescriptor {
    /// 256px terrarium PNG tile.
    Terrarium { z: u8, x: u32, y: u32 },
    /// 512px int16 GeoTIFF tile.
    Tiff { z: u8, x: u32, y: u32 },
    /// The single global ETOPO1 file.
    Etopo1,
    /// One 1/9 arc-second NED file.
    Ned { name: String },
    /// One 1/9 arc-second NED topobathy file.
    NedTopobathy { name: String },
}

impl JobDescriptor {
    /// The `type` tag this descriptor serializes with.
    pub fn tag(&self) -> &'static str {
        match self {
            JobDescriptor::Terrarium { .. } => "terrarium",
            JobDescriptor::Tiff { .. } => "tiff",
            JobDescriptor::Etopo1 => "etopo1",
            JobDescriptor::Ned { .. } => "ned",
            JobDescriptor::NedTopobathy { .. } => "ned_topobathy",
        }
    }

    /// True for descriptors that render an output tile.
    pub fn is_tile(&self) -> bool {
        matches!(
            self,
            JobDescriptor::Terrarium { .. } | JobDescriptor::Tiff { .. }
        )
    }

    /// The tile a render descriptor refers to, validated against the grid.
    pub fn tile(&self) -> Result<Option<TileCoord>, JobError> {
        match *self {
            JobDescriptor::Terrarium { z, x, y } | JobDescriptor::Tiff { z, x, y } => {
                Ok(Some(TileCoord::new(z, x, y)?))
            }
            _ => Ok(None),
        }
    }

    /// Ensures this descriptor carries `expected` as its tag.
    pub fn expect_tag(&self, expected: &'static str) -> Result<(), JobError> {
        let found = self.tag();
        if found == expected {
            Ok(())
        } else {
            Err(JobError::TagMismatch { expected, found })
        }
    }

    pub fn to_json(&self) -> Result<String, JobError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, JobError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl std::fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobDescriptor::Terrarium { z, x, y } | JobDescriptor::Tiff { z, x, y } => {
                write!(f, "{} {}/{}/{}", self.tag(), z, x, y)
            }
            JobDescriptor::Etopo1 => write!(f, "etopo1"),
            JobDescriptor::Ned { name } | JobDescriptor::NedTopobathy { name } => {
                write!(f, "{} {}", self.tag(), name)
            }
        }
    }
}
