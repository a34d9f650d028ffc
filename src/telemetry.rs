//! Logging/tracing bootstrap for embedding applications.

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;

/// Setup the tracing/logging system.
///
/// Intended to be called once at process startup by the embedding
/// application.
pub fn init() -> Result<()> {
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true).with_ansi(true))
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;
    Ok(())
}
