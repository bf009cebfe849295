//! Origin response header sanitizing.
//!
//! Headers travel as ordered `(name, value)` pairs so repeated entries such as
//! `Set-Cookie` survive untouched in number and order.

mod cookie;

pub use cookie::{filter_request_cookies, rewrite_set_cookie};

use url::Url;

use crate::codec::UrlCodec;

/// Ordered header list; names keep the case the origin sent.
pub type HeaderList = Vec<(String, String)>;

/// Origin headers never forwarded to the client. The body is re-encoded and
/// re-sized, and the origin's framing and security policy do not apply to the
/// proxy's own origin.
pub const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "strict-transport-security",
    "access-control-allow-origin",
];

/// Per-response inputs for [`sanitize_response_headers`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy<'a> {
    pub codec: &'a UrlCodec,
    /// URL the response came from; `Location` resolves against it.
    pub base: &'a Url,
    pub proxy_origin: Option<&'a str>,
    pub cookie_prefix: Option<&'a str>,
}

/// Returns the first value of `name` (case-insensitive).
pub fn header_value<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Filters and rewrites origin response headers for the client.
///
/// Drops [`STRIPPED_RESPONSE_HEADERS`], rewrites each `Set-Cookie` and any
/// `Location` through the codec, and appends `Access-Control-Allow-Origin: *`.
pub fn sanitize_response_headers(headers: &[(String, String)], policy: &HeaderPolicy<'_>) -> HeaderList {
    let mut out = HeaderList::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        if STRIPPED_RESPONSE_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        match lower.as_str() {
            "set-cookie" => {
                out.push((name.clone(), rewrite_set_cookie(value, policy.cookie_prefix)));
            }
            "location" | "content-location" => {
                let rewritten = policy
                    .codec
                    .rewrite_reference(value, policy.base, policy.proxy_origin)
                    .unwrap_or_else(|| value.clone());
                out.push((name.clone(), rewritten));
            }
            _ => out.push((name.clone(), value.clone())),
        }
    }
    out.push(("Access-Control-Allow-Origin".to_string(), "*".to_string()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TargetUrl;

    fn h(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    fn sanitize(headers: &[(String, String)]) -> HeaderList {
        let codec = UrlCodec::default();
        let base = Url::parse("https://a.com/dir/page").unwrap();
        let policy = HeaderPolicy {
            codec: &codec,
            base: &base,
            proxy_origin: None,
            cookie_prefix: None,
        };
        sanitize_response_headers(headers, &policy)
    }

    #[test]
    fn csp_removed_and_cookie_rewritten() {
        let out = sanitize(&[
            h("Content-Security-Policy", "default-src 'self'"),
            h("Set-Cookie", "id=1; Domain=a.com; Secure"),
            h("Content-Type", "text/html"),
        ]);
        assert!(header_value(&out, "content-security-policy").is_none());
        assert_eq!(header_value(&out, "set-cookie"), Some("id=1"));
        assert_eq!(header_value(&out, "content-type"), Some("text/html"));
    }

    #[test]
    fn framing_and_transport_headers_removed() {
        let out = sanitize(&[
            h("Content-Encoding", "gzip"),
            h("Content-Length", "42"),
            h("Transfer-Encoding", "chunked"),
            h("X-Frame-Options", "DENY"),
            h("Strict-Transport-Security", "max-age=1"),
        ]);
        assert_eq!(out, vec![h("Access-Control-Allow-Origin", "*")]);
    }

    #[test]
    fn origin_cors_header_replaced() {
        let out = sanitize(&[h("access-control-allow-origin", "https://a.com")]);
        let values: Vec<_> = out
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("access-control-allow-origin"))
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(values, vec!["*"]);
    }

    #[test]
    fn repeated_set_cookie_kept_in_order() {
        let out = sanitize(&[h("Set-Cookie", "a=1; Secure"), h("Set-Cookie", "b=2; SameSite=Strict")]);
        let cookies: Vec<_> = out
            .iter()
            .filter(|(n, _)| n == "Set-Cookie")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn location_is_encoded() {
        let codec = UrlCodec::default();
        let out = sanitize(&[h("Location", "/login?next=1")]);
        let expected = codec.proxy_path(&TargetUrl::parse("https://a.com/login?next=1").unwrap());
        assert_eq!(header_value(&out, "location"), Some(expected.as_str()));
    }
}
