use thiserror::Error;

use crate::codec::CodecError;
use crate::fetch::FetchError;

/// Failure of one proxied request. Each maps to a client-visible status.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("not a proxy path: {0}")]
    NotProxyPath(String),
    #[error("bad proxy reference: {0}")]
    BadReference(#[from] CodecError),
    #[error("origin fetch failed: {0}")]
    Upstream(#[from] FetchError),
}

impl ProxyError {
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::NotProxyPath(_) => 404,
            ProxyError::BadReference(_) => 400,
            ProxyError::Upstream(_) => 502,
        }
    }
}
