//! URL codec: resolution of document references and the reversible
//! TargetURL <-> EncodedReference mapping.
//!
//! Every rewritten reference has the shape `<prefix><encoded>[#fragment]`.
//! The encoded part is URL-safe base64 without padding over the UTF-8
//! serialization of the target (fragment removed), so it never contains a
//! character that needs escaping in a path segment, query value, or a
//! quoted script/style string.

mod error;
mod resolve;

pub use error::CodecError;
pub use resolve::{is_non_network, resolve};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;
use url::Url;

/// Default path prefix for rewritten references.
pub const DEFAULT_PREFIX: &str = "/~/";

/// An absolute http(s) URL: the real resource behind a rewritten reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUrl(Url);

impl TargetUrl {
    /// Parses an absolute http(s) URL.
    pub fn parse(input: &str) -> Result<Self, CodecError> {
        let url = Url::parse(input).map_err(|e| CodecError::Malformed(format!("{}: {}", input, e)))?;
        Self::try_from(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_url(self) -> Url {
        self.0
    }

    /// Replaces the query string (used for GET form submissions).
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.0.set_query(query);
        self
    }

    /// `scheme://host[:port]` of the target.
    pub fn origin(&self) -> String {
        self.0.origin().ascii_serialization()
    }
}

impl TryFrom<Url> for TargetUrl {
    type Error = CodecError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        match url.scheme() {
            "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(Self(url)),
            "http" | "https" => Err(CodecError::Malformed(format!("{}: missing host", url))),
            other => Err(CodecError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Opaque, embedding-safe form of a [`TargetUrl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedReference(String);

impl EncodedReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bidirectional mapping between target URLs and proxy paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCodec {
    prefix: String,
}

impl Default for UrlCodec {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

fn is_base64url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl UrlCodec {
    /// Builds a codec for `prefix`.
    ///
    /// The prefix must start and end with `/` and hold at least one character
    /// in between, none of them from the base64url alphabet, so a proxy path
    /// can never be confused with an ordinary application path.
    pub fn new(prefix: &str) -> Result<Self, CodecError> {
        let valid = prefix.len() >= 3
            && prefix.starts_with('/')
            && prefix.ends_with('/')
            && !prefix.chars().any(is_base64url_char)
            && prefix.is_ascii()
            && !prefix.chars().any(|c| c.is_ascii_whitespace() || c == '?' || c == '#');
        if !valid {
            return Err(CodecError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encodes the full serialization of `target`, fragment included.
    pub fn encode(&self, target: &TargetUrl) -> EncodedReference {
        EncodedReference(URL_SAFE_NO_PAD.encode(target.as_str().as_bytes()))
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(&self, encoded: &str) -> Result<TargetUrl, CodecError> {
        if encoded.is_empty() {
            return Err(CodecError::InvalidEncoding);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|_| CodecError::InvalidEncoding)?;
        let text = String::from_utf8(bytes).map_err(|_| CodecError::InvalidEncoding)?;
        let target = TargetUrl::parse(&text)?;
        // Only canonical serializations round-trip; anything else was not
        // produced by `encode`.
        if target.as_str() != text {
            return Err(CodecError::Malformed(text));
        }
        Ok(target)
    }

    /// Proxy path for `target`: prefix, encoded reference without the
    /// fragment, then the fragment verbatim.
    pub fn proxy_path(&self, target: &TargetUrl) -> String {
        let mut url = target.as_url().clone();
        let fragment = url.fragment().filter(|f| !f.is_empty()).map(str::to_string);
        url.set_fragment(None);
        let encoded = self.encode(&TargetUrl(url));
        match fragment {
            Some(f) => format!("{}{}#{}", self.prefix, encoded, f),
            None => format!("{}{}", self.prefix, encoded),
        }
    }

    /// Extracts and decodes the reference from a request path such as
    /// `/~/aHR0cHM6Ly9hLmNvbS8`. Returns `None` when `path` is not a proxy path.
    pub fn decode_path(&self, path: &str) -> Option<Result<TargetUrl, CodecError>> {
        let rest = path.strip_prefix(&self.prefix)?;
        let encoded = rest.split(['?', '#']).next().unwrap_or_default();
        Some(self.decode(encoded))
    }

    /// True when `value` already points into the proxy path space, either
    /// path-only or absolute on `proxy_origin`.
    pub fn is_encoded(&self, value: &str, proxy_origin: Option<&str>) -> bool {
        let v = value.trim();
        if v.starts_with(&self.prefix) {
            return true;
        }
        proxy_origin
            .and_then(|origin| v.strip_prefix(origin.trim_end_matches('/')))
            .is_some_and(|rest| rest.starts_with(&self.prefix))
    }

    /// Resolves `value` against `base` and returns its proxy path, or `None`
    /// when the value must be left as it is (already encoded, non-network,
    /// malformed, unsupported scheme).
    pub fn rewrite_reference(
        &self,
        value: &str,
        base: &Url,
        proxy_origin: Option<&str>,
    ) -> Option<String> {
        if self.is_encoded(value, proxy_origin) {
            return None;
        }
        match resolve(value, base) {
            Ok(target) => Some(self.proxy_path(&target)),
            Err(CodecError::NotNetwork) => None,
            Err(e) => {
                tracing::trace!("leaving reference {:?} unrewritten: {}", value, e);
                None
            }
        }
    }
}

/// Normalizes user-typed input (`example.com`, `http://x`) into a target URL.
pub fn normalize_user_input(input: &str) -> Result<TargetUrl, CodecError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(CodecError::Malformed("empty URL".to_string()));
    }
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        TargetUrl::parse(s)
    } else {
        TargetUrl::parse(&format!("https://{}", s))
    }
}
