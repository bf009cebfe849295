//! Runtime shim: the script injected at the top of every rewritten HTML
//! document.
//!
//! It patches the browser APIs that can issue requests or change the
//! document URL (fetch, XHR, attribute and property setters, DOM insertion of
//! scripts and stylesheets, `Image`, history, `window.open`, `sendBeacon`,
//! `EventSource`) so targets created at runtime go through the same
//! resolve + encode rules as [`crate::codec`]. Every override calls the
//! captured original after substituting the URL.

use url::Url;

use crate::codec::UrlCodec;

/// Attribute carried by the injected `<script>`; its presence means a
/// document was already shimmed.
pub const SHIM_MARKER: &str = "data-veil-shim";

const TEMPLATE: &str = include_str!("runtime.js");

/// Values templated into the shim at render time.
#[derive(Debug, Clone, Copy)]
pub struct ShimConfig<'a> {
    pub prefix: &'a str,
    pub base: &'a Url,
    /// `None` lets the script fall back to `window.location.origin`.
    pub proxy_origin: Option<&'a str>,
}

impl<'a> ShimConfig<'a> {
    pub fn new(codec: &'a UrlCodec, base: &'a Url, proxy_origin: Option<&'a str>) -> Self {
        Self {
            prefix: codec.prefix(),
            base,
            proxy_origin,
        }
    }
}

/// Serializes `value` as a JS string literal that is also safe inside an
/// HTML `<script>` element.
pub(crate) fn js_string(value: &str) -> String {
    let quoted = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
    quoted
        .replace("</", "<\\/")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// The bare script source.
pub fn render_script(config: &ShimConfig<'_>) -> String {
    TEMPLATE
        .replace("__VEIL_PREFIX__", &js_string(config.prefix))
        .replace("__VEIL_ORIGIN__", &js_string(config.proxy_origin.unwrap_or("")))
        .replace("__VEIL_BASE__", &js_string(config.base.as_str()))
}

/// The script wrapped in a marked `<script>` element, ready to insert.
pub fn render_tag(config: &ShimConfig<'_>) -> String {
    format!("<script {}>{}</script>", SHIM_MARKER, render_script(config))
}

/// Inline script that moves the shim's resolution base, emitted in place of
/// a document's `<base href>`.
pub fn render_set_base(base: &Url) -> String {
    format!(
        "<script data-veil-base>window.__veilShim&&window.__veilShim.setBase({});</script>",
        js_string(base.as_str())
    )
}
