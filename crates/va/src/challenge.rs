//! Challenges, key authorizations, and account keys

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

use lantern_common::ProblemDetails;

use crate::types::ValidationRecord;

/// Compare two byte strings without leaking the position of the first
/// difference. Used for every comparison involving challenge responses.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// The proof-of-control mechanisms this VA knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "tls-sni-01")]
    TlsSni01,
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::TlsSni01 => "tls-sni-01",
            ChallengeType::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Valid,
    Invalid,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Valid => "valid",
            ChallengeStatus::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account public key as a JWK.
///
/// Only the public parameters participate in the RFC 7638 thumbprint, and
/// the canonical form orders members lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    #[serde(rename = "RSA")]
    Rsa { e: String, n: String },
    #[serde(rename = "EC")]
    Ec { crv: String, x: String, y: String },
}

impl Jwk {
    /// The base64url-encoded SHA-256 JWK thumbprint (RFC 7638).
    pub fn thumbprint(&self) -> String {
        let canonical = match self {
            Jwk::Rsa { e, n } => format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n),
            Jwk::Ec { crv, x, y } => {
                format!(r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#, crv, x, y)
            }
        };
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Failure to parse a key authorization string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyAuthorizationError {
    #[error("key authorization must be of the form token.thumbprint")]
    MalformedInput,
}

/// The canonical binding of a challenge token to an account key:
/// `token "." base64url(thumbprint(accountKey))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAuthorization {
    pub token: String,
    pub thumbprint: String,
}

impl KeyAuthorization {
    /// The key authorization the CA expects for a token and account key.
    pub fn new(token: impl Into<String>, key: &Jwk) -> Self {
        Self {
            token: token.into(),
            thumbprint: key.thumbprint(),
        }
    }

    /// Whether this authorization binds `token` to `key`: both halves must
    /// match what the CA expects, compared in constant time.
    pub fn matches(&self, token: &str, key: &Jwk) -> bool {
        let token_ok = constant_time_eq(self.token.as_bytes(), token.as_bytes());
        let thumb_ok = constant_time_eq(self.thumbprint.as_bytes(), key.thumbprint().as_bytes());
        token_ok && thumb_ok
    }
}

impl FromStr for KeyAuthorization {
    type Err = KeyAuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((token, thumbprint))
                if !token.is_empty() && !thumbprint.is_empty() && !thumbprint.contains('.') =>
            {
                Ok(Self {
                    token: token.to_string(),
                    thumbprint: thumbprint.to_string(),
                })
            }
            _ => Err(KeyAuthorizationError::MalformedInput),
        }
    }
}

impl fmt::Display for KeyAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.token, self.thumbprint)
    }
}

impl Serialize for KeyAuthorization {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyAuthorization {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn is_url_safe_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A single challenge within an authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub status: ChallengeStatus,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_authorization: Option<KeyAuthorization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDetails>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_record: Vec<ValidationRecord>,
}

impl Challenge {
    /// A pending challenge carrying everything the VA needs to validate it.
    pub fn pending(challenge_type: ChallengeType, token: impl Into<String>, key: Jwk) -> Self {
        let token = token.into();
        let key_authorization = KeyAuthorization::new(token.clone(), &key);
        Self {
            challenge_type,
            status: ChallengeStatus::Pending,
            token,
            account_key: Some(key),
            key_authorization: Some(key_authorization),
            error: None,
            validation_record: vec![],
        }
    }

    /// Whether the challenge is well-formed enough to act on. With
    /// `completed`, the recorded hops must also pass [`Self::records_sane`].
    pub fn is_sane(&self, completed: bool) -> bool {
        if !is_url_safe_token(&self.token) {
            return false;
        }
        if self.account_key.is_none() || self.key_authorization.is_none() {
            return false;
        }
        if completed && !self.records_sane() {
            return false;
        }
        true
    }

    /// Whether the validation records have the shape this challenge type
    /// produces. HTTP-01 leaves at least one URL-bearing record, TLS-SNI-01
    /// exactly one record for the probe connection, and DNS-01 performs no
    /// socket-level hops at all.
    pub fn records_sane(&self) -> bool {
        match self.challenge_type {
            ChallengeType::Http01 => {
                !self.validation_record.is_empty()
                    && self
                        .validation_record
                        .iter()
                        .all(|r| r.is_sane() && r.url.is_some())
            }
            ChallengeType::TlsSni01 => {
                self.validation_record.len() == 1 && self.validation_record[0].is_sane()
            }
            ChallengeType::Dns01 => self.validation_record.is_empty(),
        }
    }
}
