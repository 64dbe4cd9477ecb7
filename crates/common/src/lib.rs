//! Common types shared across Lantern CA components
//!
//! This crate provides the pieces every Lantern component needs regardless of
//! its role in the issuance pipeline:
//!
//! - [`problems`]: the ACME problem-document taxonomy surfaced to clients
//! - [`observability`]: logging/tracing bootstrap and audit log emission

pub mod observability;
pub mod problems;

pub use observability::{audit_object, init_tracing, AUDIT_TARGET};
pub use problems::{ProblemDetails, ProblemType};
