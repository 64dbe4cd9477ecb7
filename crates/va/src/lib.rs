//! Lantern Validation Authority
//!
//! The VA decides whether a certificate applicant actually controls a DNS
//! name. Given an authorization carrying a challenge and an account key, it
//! performs one of the ACME proofs of control (HTTP-01, TLS-SNI-01, DNS-01)
//! and, in parallel, consults the name's CAA records to confirm the CA is
//! permitted to issue. The outcome is stamped onto the challenge together
//! with an audit trail of every network hop, and reported back to the
//! Registration Authority.
//!
//! Two properties drive the design:
//!
//! - **The VA resolves names itself.** Outbound connections are pinned to an
//!   address the VA chose, never one an HTTP client library resolved
//!   internally, so the audit trail records exactly which IP answered and
//!   redirects cannot silently switch hosts.
//! - **Untrusted endpoints.** The applicant does not yet hold a trusted
//!   certificate, so TLS peer verification is deliberately disabled on every
//!   probe.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lantern_va::{PortConfig, VaConfig, ValidationAuthority};
//! use lantern_va::resolver::HickoryDnsResolver;
//!
//! let va = Arc::new(ValidationAuthority::new(
//!     VaConfig {
//!         ports: PortConfig::default(),
//!         issuer_domain: "ca.example".to_string(),
//!         user_agent: Some("lantern-va/0.2".to_string()),
//!     },
//!     ra,
//!     Arc::new(HickoryDnsResolver::from_system_conf()?),
//!     public_suffix,
//! ));
//! va.update_validations(authz, 0)?;
//! ```

pub mod authority;
pub mod caa;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod http;
pub mod metrics;
mod net;
pub mod resolver;
pub mod tls;
pub mod types;

pub use authority::{Clock, RegistrationAuthority, SafeBrowsing, SystemClock, VaError, ValidationAuthority};
pub use caa::{CaaSet, PublicSuffixOracle, SuffixError};
pub use challenge::{Challenge, ChallengeStatus, ChallengeType, Jwk, KeyAuthorization};
pub use config::{PortConfig, VaConfig, MAX_REDIRECT, VALIDATION_TIMEOUT};
pub use resolver::{CaaRecord, DnsError, DnsResolver};
pub use types::{AcmeIdentifier, Authorization, IdentifierType, ValidationRecord, VerificationRequestEvent};
