//! `veil decode <ref>` – print the target behind a proxy reference.

use anyhow::{Context, Result};
use url::Url;
use veil_core::codec::{TargetUrl, UrlCodec};
use veil_core::config::VeilConfig;

/// Accepts a full proxy URL, a proxy path, or a bare encoded reference.
pub(crate) fn decode_line(codec: &UrlCodec, reference: &str) -> Result<TargetUrl> {
    let reference = reference.trim();
    let path = match Url::parse(reference) {
        Ok(url) => url.path().to_string(),
        Err(_) => reference.to_string(),
    };
    let decoded = match codec.decode_path(&path) {
        Some(result) => result,
        None => codec.decode(path.split(['?', '#']).next().unwrap_or_default()),
    };
    decoded.with_context(|| format!("cannot decode {:?}", reference))
}

pub fn run_decode(cfg: &VeilConfig, reference: &str) -> Result<()> {
    println!("{}", decode_line(&cfg.codec()?, reference)?);
    Ok(())
}
