//! CLI for the Veil web proxy.

mod commands;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use veil_core::config;

use commands::{run_decode, run_encode, run_rewrite, run_serve, run_shim};

/// Top-level CLI for the Veil web proxy.
#[derive(Debug, Parser)]
#[command(name = "veil")]
#[command(about = "Veil: content-rewriting web proxy", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/veil/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Body kind forced on `veil rewrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Html,
    Css,
    Js,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the proxy HTTP server.
    Serve {
        /// Address to bind, overriding `listen` from the config.
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Print the proxy path for a URL.
    Encode {
        /// Target URL; a bare host such as `example.com` gets `https://`.
        url: String,
    },

    /// Print the target URL behind a proxy path or encoded reference.
    Decode {
        /// Proxy URL, proxy path, or bare encoded reference.
        reference: String,
    },

    /// Rewrite a saved HTML, CSS or JS file as if served from `--base`.
    Rewrite {
        /// URL the document was fetched from.
        #[arg(long)]
        base: String,
        /// Body kind; guessed from the file extension when omitted.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// File to rewrite.
        path: PathBuf,
    },

    /// Print the runtime shim script rendered for a document URL.
    Shim {
        /// Document URL the shim resolves against.
        #[arg(long)]
        base: String,
        /// Origin the browser sees, e.g. `http://127.0.0.1:8080`.
        #[arg(long, value_name = "ORIGIN")]
        proxy_origin: Option<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = match &cli.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { listen } => run_serve(&cfg, listen.as_deref()).await?,
            CliCommand::Encode { url } => run_encode(&cfg, &url)?,
            CliCommand::Decode { reference } => run_decode(&cfg, &reference)?,
            CliCommand::Rewrite { base, kind, path } => run_rewrite(&cfg, &base, kind, &path)?,
            CliCommand::Shim { base, proxy_origin } => {
                run_shim(&cfg, &base, proxy_origin.as_deref())?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
