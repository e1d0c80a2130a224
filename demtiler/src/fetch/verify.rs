//! Integrity checks for downloaded source files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::FetchError;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// How to decide whether a download is intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verifier {
    /// The file opens as a zip archive with at least one entry.
    Zip,
    /// The file has at least one byte.
    NonEmpty,
    /// The file's SHA-256 matches this lowercase hex digest.
    Sha256(String),
}

impl Verifier {
    /// Checks `path`, returning `VerificationFailed` if it is not intact.
    pub fn verify(&self, path: &Path) -> Result<(), FetchError> {
        let fail = |reason: String| FetchError::VerificationFailed {
            path: path.to_path_buf(),
            reason,
        };

        match self {
            Verifier::Zip => {
                let file = open(path)?;
                let archive = zip::ZipArchive::new(file)
                    .map_err(|e| fail(format!("not a zip archive: {}", e)))?;
                if archive.len() == 0 {
                    return Err(fail("zip archive is empty".to_string()));
                }
                Ok(())
            }
            Verifier::NonEmpty => {
                let len = std::fs::metadata(path)
                    .map_err(|e| FetchError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })?
                    .len();
                if len == 0 {
                    return Err(fail("file is empty".to_string()));
                }
                Ok(())
            }
            Verifier::Sha256(expected) => {
                let actual = calculate_file_checksum(path)?;
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(fail(format!(
                        "checksum mismatch: expected {}, got {}",
                        expected, actual
                    )));
                }
                Ok(())
            }
        }
    }
}

fn open(path: &Path) -> Result<File, FetchError> {
    File::open(path).map_err(|e| FetchError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Calculate SHA-256 checksum of a file.
///
/// Returns the lowercase hexadecimal hash of the file contents.
pub fn calculate_file_checksum(path: &Path) -> Result<String, FetchError> {
    let mut file = open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| FetchError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
