//! HTML rewriting on top of `lol_html`'s streaming rewriter.
//!
//! Handlers run in document order, so a `<base href>` updates the base for
//! every element after it. Unparseable markup is passed through by the
//! tokenizer; a rewriter error returns the input unchanged.

use html_escape::decode_html_entities;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use url::Url;

use super::css::rewrite_css_against;
use super::RewriteContext;
use crate::shim::{self, ShimConfig, SHIM_MARKER};

/// An already injected shim element, not a stray mention of its marker.
static SHIM_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)<script\s[^>]*\b{}\b", SHIM_MARKER)).expect("shim element pattern")
});

static LEADING_DOCTYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!doctype[^>]*>").expect("doctype pattern"));

/// Attributes whose whole value is a single URL.
pub const URL_ATTRIBUTES: &[&str] = &["src", "href", "action", "poster", "formaction"];

/// `http-equiv` values whose `<meta>` is dropped.
const BLOCKED_META: &[&str] = &["content-security-policy", "x-frame-options", "refresh"];

fn is_tracker(src: &str, trackers: &[String]) -> bool {
    let src = src.to_ascii_lowercase();
    trackers
        .iter()
        .filter(|t| !t.is_empty())
        .any(|t| src.contains(&t.to_ascii_lowercase()))
}

/// Splits a `srcset` value into `(url, descriptors)` candidates.
///
/// URLs run to the next whitespace, so commas inside them survive; a URL
/// ending in commas has no descriptors. Descriptors run to the next comma
/// outside parentheses.
fn srcset_candidates(value: &str) -> Vec<(&str, &str)> {
    let bytes = value.as_bytes();
    let mut candidates = Vec::new();
    let mut pos = 0;
    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        let url_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let url = &value[url_start..pos];
        if url.ends_with(',') {
            candidates.push((url.trim_end_matches(','), ""));
            continue;
        }
        let desc_start = pos;
        let mut depth = 0usize;
        while pos < bytes.len() {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => break,
                _ => {}
            }
            pos += 1;
        }
        candidates.push((url, value[desc_start..pos].trim()));
    }
    candidates
}

/// Rewrites each URL in a `srcset` list, keeping width/density descriptors.
fn rewrite_srcset(value: &str, ctx: &RewriteContext<'_>, base: &Url) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = srcset_candidates(value)
        .into_iter()
        .map(|(url, descriptor)| {
            let url = match ctx.rewrite_against(url, base) {
                Some(path) => {
                    changed = true;
                    path
                }
                None => url.to_string(),
            };
            if descriptor.is_empty() {
                url
            } else {
                format!("{} {}", url, descriptor)
            }
        })
        .collect();
    changed.then(|| candidates.join(", "))
}

/// Collects the `(attribute, new value)` pairs an element needs.
fn attribute_updates(
    get: impl Fn(&str) -> Option<String>,
    ctx: &RewriteContext<'_>,
    base: &Url,
) -> Vec<(&'static str, String)> {
    let mut updates = Vec::new();
    for &attr in URL_ATTRIBUTES {
        let decoded = get(attr).map(|v| decode_html_entities(&v).into_owned());
        if let Some(path) = decoded.and_then(|v| ctx.rewrite_against(&v, base)) {
            updates.push((attr, path));
        }
    }
    let srcset = get("srcset").map(|v| decode_html_entities(&v).into_owned());
    if let Some(rewritten) = srcset.and_then(|v| rewrite_srcset(&v, ctx, base)) {
        updates.push(("srcset", rewritten));
    }
    if let Some(style) = get("style") {
        let rewritten = rewrite_css_against(&style, ctx, base);
        if rewritten != style {
            updates.push(("style", rewritten.into_owned()));
        }
    }
    updates
}

fn try_rewrite(html: &str, ctx: &RewriteContext<'_>) -> Result<String, lol_html::errors::RewritingError> {
    let base = Rc::new(RefCell::new(ctx.base.clone()));
    let already_shimmed = SHIM_ELEMENT.is_match(html);
    let injected = Rc::new(Cell::new(already_shimmed));
    let shim_tag = shim::render_tag(&ShimConfig::new(ctx.codec, ctx.base, ctx.proxy_origin));

    let head_injected = Rc::clone(&injected);
    let head_shim = shim_tag.clone();
    let body_injected = Rc::clone(&injected);
    let body_shim = shim_tag.clone();
    let base_for_base = Rc::clone(&base);
    let base_for_attrs = Rc::clone(&base);
    let base_for_style = Rc::clone(&base);
    let mut style_buffer = String::new();

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script[src]", |el| {
                    if let Some(src) = el.get_attribute("src") {
                        if is_tracker(&src, ctx.trackers) {
                            tracing::debug!("dropping tracker script {}", src);
                            el.remove();
                        }
                    }
                    Ok(())
                }),
                element!("meta[http-equiv]", |el| {
                    let blocked = el.get_attribute("http-equiv").is_some_and(|v| {
                        BLOCKED_META.iter().any(|b| v.trim().eq_ignore_ascii_case(b))
                    });
                    if blocked {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("head", move |el| {
                    if !head_injected.get() {
                        el.prepend(&head_shim, ContentType::Html);
                        head_injected.set(true);
                    }
                    Ok(())
                }),
                element!("body", move |el| {
                    if !body_injected.get() {
                        el.before(&body_shim, ContentType::Html);
                        body_injected.set(true);
                    }
                    Ok(())
                }),
                element!("base[href]", move |el| {
                    let href = el.get_attribute("href").unwrap_or_default();
                    let href = decode_html_entities(&href);
                    let current = base_for_base.borrow().clone();
                    if let Ok(target) = crate::codec::resolve(&href, &current) {
                        let next = target.into_url();
                        el.replace(&shim::render_set_base(&next), ContentType::Html);
                        *base_for_base.borrow_mut() = next;
                    }
                    Ok(())
                }),
                element!("[integrity]", |el| {
                    el.remove_attribute("integrity");
                    Ok(())
                }),
                element!("*", move |el| {
                    if el.tag_name() == "base" {
                        return Ok(());
                    }
                    let current = base_for_attrs.borrow().clone();
                    for (name, value) in attribute_updates(|a| el.get_attribute(a), ctx, &current) {
                        el.set_attribute(name, &value)?;
                    }
                    Ok(())
                }),
                text!("style", move |chunk| {
                    style_buffer.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let current = base_for_style.borrow().clone();
                        let rewritten = rewrite_css_against(&style_buffer, ctx, &current).into_owned();
                        chunk.replace(&rewritten, ContentType::Html);
                        style_buffer.clear();
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    if injected.get() {
        return Ok(output);
    }
    // No head or body: the shim still has to run first, but after any doctype.
    let split = LEADING_DOCTYPE.find(&output).map_or(0, |m| m.end());
    Ok(format!("{}{}{}", &output[..split], shim_tag, &output[split..]))
}

/// Rewrites an HTML document for delivery through the proxy.
///
/// In order: tracker `<script src>` elements and blocking `<meta http-equiv>`
/// (CSP, X-Frame-Options, refresh) are dropped, the runtime shim becomes the
/// first child of `<head>`, URL attributes / `srcset` / `style` attributes and
/// `<style>` blocks are rewritten through the codec, and `integrity` is
/// removed. Running it again on its own output changes nothing.
pub fn rewrite_html(html: &str, ctx: &RewriteContext<'_>) -> String {
    match try_rewrite(html, ctx) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!("html rewrite failed for {}, serving original: {}", ctx.base, e);
            html.to_string()
        }
    }
}
