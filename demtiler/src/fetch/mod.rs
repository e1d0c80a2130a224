//! Downloading, verifying and unpacking source files.
//!
//! A [`Fetcher`] turns a [`SourceFile`] handle into a file on disk. Each URL
//! is tried once, in order; there is no retry or backoff.

mod http;
mod unpack;
mod verify;

pub use http::{HttpClient, ReqwestClient};
pub use unpack::Unpack;
pub(crate) use unpack::make_published;
pub use verify::{calculate_file_checksum, Verifier};

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::source::SourceFile;

/// Errors raised while fetching a source file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("verification of {path} failed: {reason}")]
    VerificationFailed { path: PathBuf, reason: String },

    #[error("failed to unpack {path}: {reason}")]
    Unpack { path: PathBuf, reason: String },

    #[error("source file '{0}' has no download URLs")]
    NoUrls(String),
}

/// What a fetch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The output file was already on disk; nothing was downloaded.
    AlreadyPresent(PathBuf),
    /// The file was downloaded, verified and unpacked.
    Downloaded(PathBuf),
}

impl FetchOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            FetchOutcome::AlreadyPresent(p) | FetchOutcome::Downloaded(p) => p,
        }
    }
}

/// Downloads source files through an [`HttpClient`].
pub struct Fetcher<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Ensures `file`'s output exists on disk.
    ///
    /// Download failures fall through to the next URL. A download that fails
    /// verification aborts the fetch: the temporary file is removed and the
    /// output path is never created.
    pub fn fetch(&self, file: &SourceFile) -> Result<FetchOutcome, FetchError> {
        let output = &file.output_file;
        if is_present(output) {
            debug!(file = %file.name, "Source file already present");
            return Ok(FetchOutcome::AlreadyPresent(output.clone()));
        }

        let mut last_error = FetchError::NoUrls(file.name.clone());
        for url in &file.urls {
            let mut download = unpack::temp_beside(output)?;
            info!(file = %file.name, url = %url, "Downloading source file");

            let written = match self.client.download(url, download.as_file_mut()) {
                Ok(n) => n,
                Err(e) => {
                    warn!(file = %file.name, url = %url, error = %e, "Download failed");
                    last_error = e;
                    continue;
                }
            };
            download.as_file_mut().flush().map_err(|e| FetchError::Io {
                path: download.path().to_path_buf(),
                source: e,
            })?;
            debug!(file = %file.name, bytes = written, "Download complete");

            file.verifier.verify(download.path())?;
            file.unpack.apply(download, output)?;

            info!(file = %file.name, path = %output.display(), "Source file ready");
            return Ok(FetchOutcome::Downloaded(output.clone()));
        }

        Err(last_error)
    }
}

fn is_present(path: &std::path::Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
