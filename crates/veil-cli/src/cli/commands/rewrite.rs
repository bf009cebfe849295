//! `veil rewrite --base <url> <file>` – rewrite a saved document offline.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use veil_core::codec::TargetUrl;
use veil_core::config::VeilConfig;
use veil_core::dispatch::ContentKind;
use veil_core::rewrite::{decode_text, rewrite_text, RewriteContext};

use crate::cli::KindArg;

fn kind_for(kind: Option<KindArg>, path: &Path) -> ContentKind {
    match kind {
        Some(KindArg::Html) => ContentKind::Html,
        Some(KindArg::Css) => ContentKind::Css,
        Some(KindArg::Js) => ContentKind::Script,
        None => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            match ext.as_str() {
                "html" | "htm" | "xhtml" => ContentKind::Html,
                "css" => ContentKind::Css,
                "js" | "mjs" | "json" => ContentKind::Script,
                _ => ContentKind::Passthrough,
            }
        }
    }
}

pub(crate) fn rewrite_file(cfg: &VeilConfig, base: &str, kind: Option<KindArg>, path: &Path) -> Result<String> {
    let base = TargetUrl::parse(base).with_context(|| format!("invalid --base {:?}", base))?;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let kind = kind_for(kind, path);
    if kind == ContentKind::Passthrough {
        anyhow::bail!(
            "cannot guess the content kind of {}; pass --kind",
            path.display()
        );
    }
    let codec = cfg.codec()?;
    let text = decode_text(&bytes, None);
    let ctx = RewriteContext::new(&codec, base.as_url()).with_trackers(&cfg.tracker_denylist);
    Ok(rewrite_text(kind, &text, &ctx))
}

pub fn run_rewrite(cfg: &VeilConfig, base: &str, kind: Option<KindArg>, path: &Path) -> Result<()> {
    print!("{}", rewrite_file(cfg, base, kind, path)?);
    Ok(())
}
