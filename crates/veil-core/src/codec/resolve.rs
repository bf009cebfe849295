//! Resolution of document references into absolute target URLs.

use url::Url;

use super::error::CodecError;
use super::TargetUrl;

/// Schemes that never produce a network fetch through the proxy.
const NON_NETWORK_SCHEMES: &[&str] = &["data:", "blob:", "javascript:"];

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// True for references that must be left untouched: empty, fragment-only,
/// `data:`, `blob:` and `javascript:`.
pub fn is_non_network(reference: &str) -> bool {
    let s = reference.trim();
    s.is_empty()
        || s.starts_with('#')
        || NON_NETWORK_SCHEMES
            .iter()
            .any(|scheme| starts_with_ignore_case(s, scheme))
}

/// Resolves `reference` against `base` into an absolute http(s) URL.
///
/// - `http://` / `https://` pass through (parsed and normalized)
/// - `//host/path` becomes `https://host/path`, whatever the base scheme
/// - `/path` resolves against the origin of `base`
/// - anything else resolves against the full `base`, path included
pub fn resolve(reference: &str, base: &Url) -> Result<TargetUrl, CodecError> {
    let s = reference.trim();
    if is_non_network(s) {
        return Err(CodecError::NotNetwork);
    }

    let parsed = if starts_with_ignore_case(s, "http://") || starts_with_ignore_case(s, "https://")
    {
        Url::parse(s)
    } else if s.starts_with("//") {
        Url::parse(&format!("https:{}", s))
    } else {
        base.join(s)
    }
    .map_err(|e| CodecError::Malformed(format!("{}: {}", s, e)))?;

    TargetUrl::try_from(parsed)
}
