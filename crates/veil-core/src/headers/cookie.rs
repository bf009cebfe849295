//! Set-Cookie and Cookie header rewriting.

/// Attributes that tie a cookie to the origin's host or scheme.
const ORIGIN_SCOPED_ATTRIBUTES: &[&str] = &["domain", "secure", "samesite"];

/// Rewrites one origin `Set-Cookie` value for the proxy's own origin.
///
/// `Domain`, `Secure` and `SameSite` are removed (case-insensitive). With a
/// `prefix`, the cookie name is prefixed so it cannot collide with cookies
/// the proxy sets for itself.
pub fn rewrite_set_cookie(value: &str, prefix: Option<&str>) -> String {
    let mut parts = value.split(';');
    let pair = parts.next().unwrap_or_default().trim();
    let pair = match prefix {
        Some(p) if !pair.is_empty() => format!("{}{}", p, pair),
        _ => pair.to_string(),
    };

    let mut out = vec![pair];
    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let name = attr.split('=').next().unwrap_or_default().trim();
        if ORIGIN_SCOPED_ATTRIBUTES
            .iter()
            .any(|a| name.eq_ignore_ascii_case(a))
        {
            continue;
        }
        out.push(attr.to_string());
    }
    out.join("; ")
}

/// Keeps only the inbound cookie pairs carrying `prefix`, with the prefix
/// removed. Returns `None` when nothing is left to forward.
pub fn filter_request_cookies(header: &str, prefix: &str) -> Option<String> {
    let kept: Vec<&str> = header
        .split(';')
        .map(str::trim)
        .filter_map(|pair| pair.strip_prefix(prefix))
        .filter(|pair| !pair.is_empty())
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}
