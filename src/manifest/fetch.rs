//! Byte fetching for manifests and build sources
//!
//! Locations are either `http(s)://` URLs, `file://` URLs, or bare filesystem
//! paths. There is no timeout or retry beyond what the transport provides.

use std::path::PathBuf;
use thiserror::Error;

/// A failed fetch, independent of what the bytes were for
#[derive(Error, Debug)]
#[error("{location}: {message}")]
pub struct FetchError {
    pub location: String,
    pub message: String,
}

impl FetchError {
    fn new(location: &str, message: impl std::fmt::Display) -> Self {
        Self {
            location: location.to_string(),
            message: message.to_string(),
        }
    }
}

/// Where a location string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Remote(String),
    Local(PathBuf),
}

impl Location {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Location::Remote(location.to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            Location::Local(PathBuf::from(path))
        } else {
            Location::Local(PathBuf::from(location))
        }
    }
}

/// HTTP and filesystem fetcher
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vuln-pkg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::new("http client", e))?;

        Ok(Self { client })
    }

    /// Fetch the raw bytes at `location`
    pub async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        match Location::parse(location) {
            Location::Local(path) => {
                tracing::debug!("Reading {}", path.display());
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| FetchError::new(location, e))
            }
            Location::Remote(url) => {
                tracing::debug!("Fetching {}", url);
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| FetchError::new(location, e))?;

                if !response.status().is_success() {
                    return Err(FetchError::new(
                        location,
                        format!("HTTP {}", response.status()),
                    ));
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::new(location, e))?;
                Ok(body.to_vec())
            }
        }
    }
}
