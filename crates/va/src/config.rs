//! VA configuration and protocol constants

use std::time::Duration;

/// Budget for a single validation probe, end to end. For HTTP this spans
/// connect, TLS handshake, request write, headers, body, and every redirect
/// hop; DNS and TLS probes are bounded by the same figure.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of HTTP redirects followed during an HTTP-01 fetch.
pub const MAX_REDIRECT: usize = 10;

/// Characters trimmed from both ends of an HTTP-01 response body before the
/// key-authorization comparison. Exactly newline, tab, and space.
pub const WHITESPACE_CUTSET: &[char] = &['\n', '\t', ' '];

/// Label prefix under which DNS-01 TXT records are published.
pub const DNS_PREFIX: &str = "_acme-challenge";

/// Suffix of the synthetic SNI name used by TLS-SNI-01.
pub const TLS_SNI_SUFFIX: &str = "acme.invalid";

/// Path prefix of the HTTP-01 well-known resource.
pub const WELL_KNOWN_PATH: &str = ".well-known/acme-challenge";

/// Ports the VA dials on the remote host when performing its checks.
///
/// The defaults are the conventional 80/443/443; test environments override
/// them to point probes at local listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub http: u16,
    pub https: u16,
    pub tls: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            http: 80,
            https: 443,
            tls: 443,
        }
    }
}

/// Construction-time configuration for the VA.
#[derive(Debug, Clone)]
pub struct VaConfig {
    /// Remote ports for outbound probes.
    pub ports: PortConfig,
    /// The domain this CA expects to find in CAA `issue`/`issuewild` values.
    pub issuer_domain: String,
    /// Optional `User-Agent` header for HTTP probes.
    pub user_agent: Option<String>,
}
