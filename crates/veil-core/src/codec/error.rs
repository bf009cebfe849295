//! Codec and resolution errors.

use thiserror::Error;

/// Why a reference could not be decoded or resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// `data:`, `blob:`, `javascript:`, fragment-only or empty input.
    #[error("not a network reference")]
    NotNetwork,
    /// The text does not parse as a URL (alone or against the base).
    #[error("malformed URL: {0}")]
    Malformed(String),
    /// Parsed, but the scheme is not http or https.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// The encoded reference is not valid base64url or not UTF-8.
    #[error("invalid encoded reference")]
    InvalidEncoding,
    /// The prefix is unusable (see `UrlCodec::new`).
    #[error("invalid proxy prefix {0:?}: must start and end with '/' and contain no base64url characters")]
    InvalidPrefix(String),
}
