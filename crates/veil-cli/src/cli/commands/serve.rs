//! `veil serve` – run the proxy front-end.

use anyhow::Result;
use veil_core::config::VeilConfig;
use veil_core::proxy::ProxyEngine;

use crate::cli::server;

pub async fn run_serve(cfg: &VeilConfig, listen: Option<&str>) -> Result<()> {
    let engine = ProxyEngine::from_config(cfg)?;
    let addr = listen.unwrap_or(&cfg.listen);
    server::serve(engine, addr).await
}
