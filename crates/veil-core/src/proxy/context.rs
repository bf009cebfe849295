//! Per-request state derived from the inbound request.

use url::Url;

use crate::codec::{TargetUrl, UrlCodec};
use crate::headers::{filter_request_cookies, header_value};

use super::InboundRequest;

/// Decodes a `Referer` that points into the proxy path space back to the
/// page it names. Absolute referers are matched on their path only.
pub fn decode_referer(codec: &UrlCodec, referer: &str) -> Option<TargetUrl> {
    let path = match Url::parse(referer) {
        Ok(url) => url.path().to_string(),
        Err(_) => referer.to_string(),
    };
    codec.decode_path(&path)?.ok()
}

/// State for one proxied request; dropped with the response.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    /// Document URL; relative references resolve against it.
    pub base: TargetUrl,
    /// Origin the browser sees, e.g. `http://127.0.0.1:8080`.
    pub proxy_origin: Option<String>,
    /// Inbound `Cookie` header as received.
    pub cookie: Option<String>,
    /// Inbound `Referer` header as received.
    pub referer: Option<String>,
}

impl ProxyContext {
    pub fn new(base: TargetUrl, request: &InboundRequest) -> Self {
        Self {
            base,
            proxy_origin: request.proxy_origin.clone(),
            cookie: header_value(&request.headers, "cookie").map(str::to_string),
            referer: header_value(&request.headers, "referer").map(str::to_string),
        }
    }

    /// Real referer to send upstream: only proxy referers survive, decoded.
    pub fn origin_referer(&self, codec: &UrlCodec) -> Option<String> {
        let referer = self.referer.as_deref()?;
        decode_referer(codec, referer).map(|t| t.to_string())
    }

    /// Cookie header to send upstream. With a prefix only the pairs carrying
    /// it are forwarded, prefix removed.
    pub fn origin_cookie(&self, cookie_prefix: Option<&str>) -> Option<String> {
        let cookie = self.cookie.as_deref().filter(|c| !c.trim().is_empty())?;
        match cookie_prefix {
            Some(prefix) => filter_request_cookies(cookie, prefix),
            None => Some(cookie.to_string()),
        }
    }

    /// Base for rewriting once the origin answered: the effective URL after
    /// redirects when it is a valid target, else the requested URL.
    pub fn settle_base(&mut self, final_url: Option<&str>) {
        if let Some(next) = final_url.and_then(|u| TargetUrl::parse(u).ok()) {
            self.base = next;
        }
    }
}
