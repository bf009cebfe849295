//! Body rewriters: HTML, CSS and JavaScript/JSON.
//!
//! All three share one rule: a reference that resolves to an http(s) target
//! becomes the codec's proxy path; anything else is left exactly as written.
//! Rewriting never fails outward. On an internal error the input is returned
//! unchanged.

mod charset;
mod css;
mod html;
mod js;

pub use charset::decode_text;
pub use css::rewrite_css;
pub use html::{rewrite_html, URL_ATTRIBUTES};
pub use js::rewrite_js;

use url::Url;

use crate::codec::UrlCodec;
use crate::dispatch::ContentKind;

/// Everything a rewriter needs for one document.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub codec: &'a UrlCodec,
    /// URL of the document being rewritten.
    pub base: &'a Url,
    /// Origin the browser sees (`http://localhost:3000`), if known.
    pub proxy_origin: Option<&'a str>,
    /// Substrings that mark a `<script src>` as a tracker.
    pub trackers: &'a [String],
}

impl<'a> RewriteContext<'a> {
    pub fn new(codec: &'a UrlCodec, base: &'a Url) -> Self {
        Self {
            codec,
            base,
            proxy_origin: None,
            trackers: &[],
        }
    }

    pub fn with_proxy_origin(mut self, origin: Option<&'a str>) -> Self {
        self.proxy_origin = origin;
        self
    }

    pub fn with_trackers(mut self, trackers: &'a [String]) -> Self {
        self.trackers = trackers;
        self
    }

    /// Proxy path for `value` resolved against `base`, or `None` to keep it.
    pub(crate) fn rewrite_against(&self, value: &str, base: &Url) -> Option<String> {
        self.codec.rewrite_reference(value, base, self.proxy_origin)
    }

    pub(crate) fn rewrite(&self, value: &str) -> Option<String> {
        self.rewrite_against(value, self.base)
    }
}

/// Rewrites a decoded text body according to `kind`. Passthrough returns the
/// text as given.
pub fn rewrite_text(kind: ContentKind, text: &str, ctx: &RewriteContext<'_>) -> String {
    match kind {
        ContentKind::Html => rewrite_html(text, ctx),
        ContentKind::Css => rewrite_css(text, ctx),
        ContentKind::Script => rewrite_js(text, ctx),
        ContentKind::Passthrough => text.to_string(),
    }
}
