//! `veil encode <url>` – print the proxy path for a URL.

use anyhow::{Context, Result};
use veil_core::codec::{normalize_user_input, UrlCodec};
use veil_core::config::VeilConfig;

pub(crate) fn encode_line(codec: &UrlCodec, url: &str) -> Result<String> {
    let target = normalize_user_input(url).with_context(|| format!("cannot encode {:?}", url))?;
    Ok(codec.proxy_path(&target))
}

pub fn run_encode(cfg: &VeilConfig, url: &str) -> Result<()> {
    println!("{}", encode_line(&cfg.codec()?, url)?);
    Ok(())
}
