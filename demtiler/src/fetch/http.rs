//! HTTP client abstraction for testability

use std::io::Write;
use std::time::Duration;

use super::FetchError;

/// Default request timeout. Source archives can be hundreds of megabytes.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Streams the response body of a GET request into `dest`.
    ///
    /// Returns the number of bytes written. The default implementation
    /// buffers the whole body through [`HttpClient::get`].
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        let body = self.get(url)?;
        dest.write_all(&body).map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: format!("failed to write body: {}", e),
        })?;
        Ok(body.len() as u64)
    }
}

impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).get(url)
    }

    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        (**self).download(url, dest)
    }
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let response = self.client.get(url).send().map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: format!("request failed: {}", e),
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.send(url)?
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }

    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        let mut response = self.send(url)?;
        response.copy_to(dest).map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: format!("failed to read response: {}", e),
        })
    }
}
