//! Origin fetch collaborator.
//!
//! The proxy engine only sees the [`Fetcher`] trait; [`CurlFetcher`] is the
//! libcurl implementation. Fetches are blocking; call from `spawn_blocking`
//! when used from async code.

mod client;
mod parse;

pub use client::CurlFetcher;

use thiserror::Error;

use crate::codec::TargetUrl;
use crate::headers::{header_value, HeaderList};

/// One outbound request to an origin.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: TargetUrl,
    pub headers: HeaderList,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn get(url: TargetUrl) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Raw origin response. Non-2xx statuses are ordinary responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    pub status: u16,
    /// Headers of the final response, after any redirects were followed.
    pub headers: HeaderList,
    pub body: Vec<u8>,
    /// Effective URL after redirects, when it differs from the request URL.
    pub final_url: Option<String>,
}

impl OriginResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported method {0:?}")]
    Method(String),
    #[error("transport error: {0}")]
    Transport(#[from] curl::Error),
    #[error("origin body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },
    #[error("origin returned no HTTP status")]
    NoStatus,
}

/// Retrieves origin resources as raw bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<OriginResponse, FetchError>;
}
