//! ACME problem documents
//!
//! Validation failures travel to clients as RFC 7807-style problem documents
//! with a type drawn from the `urn:acme:error` namespace. The taxonomy here is
//! deliberately small: every failure the VA can produce maps onto one of these
//! types, and downstream components (RA, WFE) pass them through unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `urn:acme:error` type of a problem document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProblemType {
    /// Generic network failure while contacting the target.
    Connection,
    /// Definitive DNS non-existence (permanent DNS error).
    UnknownHost,
    /// TLS protocol or alert-level failure.
    Tls,
    /// Malformed input: bad identifier type, unsane challenge, invalid URL or port.
    Malformed,
    /// The endpoint was reached but the proof was absent or wrong.
    Unauthorized,
    /// A CA-side invariant was violated.
    ServerInternal,
}

impl ProblemType {
    /// The full `urn:acme:error` identifier for this type.
    pub fn as_urn(&self) -> &'static str {
        match self {
            ProblemType::Connection => "urn:acme:error:connection",
            ProblemType::UnknownHost => "urn:acme:error:unknownHost",
            ProblemType::Tls => "urn:acme:error:tls",
            ProblemType::Malformed => "urn:acme:error:malformed",
            ProblemType::Unauthorized => "urn:acme:error:unauthorized",
            ProblemType::ServerInternal => "urn:acme:error:serverInternal",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_urn())
    }
}

/// A problem document: a typed, human-readable description of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{problem_type} :: {detail}")]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    pub detail: String,
}

impl ProblemDetails {
    pub fn new(problem_type: ProblemType, detail: impl Into<String>) -> Self {
        Self {
            problem_type,
            detail: detail.into(),
        }
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Connection, detail)
    }

    pub fn unknown_host(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::UnknownHost, detail)
    }

    pub fn tls(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Tls, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Malformed, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Unauthorized, detail)
    }

    pub fn server_internal(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::ServerInternal, detail)
    }
}
