//! Observability for Lantern components
//!
//! Provides the tracing/logging bootstrap shared by every Lantern binary and
//! the audit log channel. Audit entries are regular tracing events on a
//! dedicated target so operators can route them to durable storage with a
//! filter directive rather than a separate sink.

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tracing target carrying audit events.
///
/// Audit events record security-relevant decisions (validation outcomes, CAA
/// checks) and must survive log-level tuning; subscribers should keep this
/// target at `info` or lower.
pub const AUDIT_TARGET: &str = "audit";

/// Initialize the tracing/logging subsystem.
///
/// Uses JSON output by default for structured logging in production; set
/// `LANTERN_LOG_FORMAT=pretty` for development. Log level comes from
/// `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() -> Result<()> {
    let format = std::env::var("LANTERN_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let json_layer = if format == "json" {
        Some(fmt::layer().json().with_target(true))
    } else {
        None
    };

    let pretty_layer = if format == "pretty" {
        Some(fmt::layer().pretty().with_target(true))
    } else {
        None
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    info!("Tracing initialized");
    Ok(())
}

/// Emit a labeled, serialized object on the audit target.
///
/// Serialization failures are logged rather than propagated; an audit sink
/// must never take down the operation it is auditing.
pub fn audit_object<T: Serialize>(label: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => info!(target: AUDIT_TARGET, object = %json, "{}", label),
        Err(e) => error!(target: AUDIT_TARGET, "Failed to serialize audit object '{}': {}", label, e),
    }
}
