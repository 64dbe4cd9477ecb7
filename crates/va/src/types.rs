//! Core data types flowing through a validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::challenge::Challenge;

/// The kind of identifier a validation targets. Only DNS names are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Dns,
    /// Any identifier type this VA does not recognize.
    #[serde(other)]
    Unknown,
}

/// A validation target: an identifier type plus its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeIdentifier {
    #[serde(rename = "type")]
    pub identifier_type: IdentifierType,
    /// A lowercase DNS name.
    pub value: String,
}

impl AcmeIdentifier {
    /// A DNS identifier for the given name.
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            identifier_type: IdentifierType::Dns,
            value: value.into(),
        }
    }

    /// Whether this identifier names a wildcard domain.
    pub fn is_wildcard(&self) -> bool {
        self.value.starts_with("*.")
    }
}

impl fmt::Display for AcmeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Audit artifact describing one network hop the VA performed.
///
/// The first record of a probe is created before any I/O so that DNS failures
/// remain visible in the audit trail; each HTTP redirect appends another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub hostname: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses_resolved: Vec<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_used: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ValidationRecord {
    /// Whether this record is internally consistent: a named host, and an
    /// address that was actually among those resolved.
    pub fn is_sane(&self) -> bool {
        if self.hostname.is_empty() || self.port == 0 {
            return false;
        }
        match self.address_used {
            Some(addr) => self.addresses_resolved.contains(&addr),
            None => false,
        }
    }
}

/// An authorization under validation.
///
/// Only the challenge selected by index is ever mutated; the remaining
/// entries are immutable to the VA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub id: String,
    #[serde(rename = "regID")]
    pub registration_id: i64,
    pub identifier: AcmeIdentifier,
    pub challenges: Vec<Challenge>,
}

/// Audit record for one verification request, serialized with omit-empty
/// semantics for the optional fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequestEvent {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub requester: i64,
    pub challenge: Challenge,
    pub request_time: DateTime<Utc>,
    pub response_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
