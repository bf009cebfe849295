//! CSS rewriting: `url(...)` values and `@import` strings.
//!
//! Textual, not a CSS parser. Quoting inside `url()` is normalized to single
//! quotes; encoded references never contain quotes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use url::Url;

use super::RewriteContext;

static URL_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"'\s)]*))\s*\)"#)
        .expect("css url() pattern")
});

static IMPORT_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).expect("css @import pattern")
});

fn captured<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Rewrites a stylesheet (or inline style) resolved against `ctx.base`.
pub fn rewrite_css(css: &str, ctx: &RewriteContext<'_>) -> String {
    rewrite_css_against(css, ctx, ctx.base).into_owned()
}

pub(crate) fn rewrite_css_against<'t>(
    css: &'t str,
    ctx: &RewriteContext<'_>,
    base: &Url,
) -> Cow<'t, str> {
    let after_urls = URL_FUNCTION.replace_all(css, |caps: &Captures<'_>| {
        match ctx.rewrite_against(captured(caps), base) {
            Some(path) => format!("url('{}')", path),
            None => caps[0].to_string(),
        }
    });
    let imports = match IMPORT_STRING.replace_all(&after_urls, |caps: &Captures<'_>| {
        match ctx.rewrite_against(captured(caps), base) {
            Some(path) => format!("@import '{}'", path),
            None => caps[0].to_string(),
        }
    }) {
        Cow::Borrowed(_) => None,
        Cow::Owned(s) => Some(s),
    };
    match imports {
        Some(s) => Cow::Owned(s),
        None => after_urls,
    }
}
