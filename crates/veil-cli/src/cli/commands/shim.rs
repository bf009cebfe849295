//! `veil shim --base <url>` – print the runtime shim for a document.

use anyhow::{Context, Result};
use veil_core::codec::TargetUrl;
use veil_core::config::VeilConfig;
use veil_core::shim::{render_script, ShimConfig};

pub fn run_shim(cfg: &VeilConfig, base: &str, proxy_origin: Option<&str>) -> Result<()> {
    let codec = cfg.codec()?;
    let base = TargetUrl::parse(base).with_context(|| format!("invalid --base {:?}", base))?;
    println!("{}", render_script(&ShimConfig::new(&codec, base.as_url(), proxy_origin)));
    Ok(())
}
