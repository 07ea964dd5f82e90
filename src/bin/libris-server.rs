//! libris HTTP server.
//!
//! Serves the JSON API described in `libris::server` on
//! `LIBRIS_SERVER_BIND:LIBRIS_SERVER_PORT` (default `127.0.0.1:8200`).
//!
//! Build and run: `cargo run --bin libris-server`

use std::sync::Arc;

use miette::{IntoDiagnostic, Result};

use libris::config;
use libris::workbench::Workbench;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,pdf_extract=warn")),
        )
        .init();

    let (config, paths) = config::load_environment(None)?;
    if config.openai.api_key.is_none() {
        tracing::warn!("no OpenAI API key configured; analysis requests will fail");
    }
    let addr = config.server.address();

    let workbench = tokio::task::spawn_blocking(move || Workbench::open(&config, paths))
        .await
        .into_diagnostic()??;

    libris::server::serve(Arc::new(workbench), &addr)
        .await
        .into_diagnostic()
}
