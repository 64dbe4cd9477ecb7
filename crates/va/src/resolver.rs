//! DNS resolution seam
//!
//! The VA never resolves names through an HTTP client library; every lookup
//! goes through the [`DnsResolver`] trait so the audit trail can record what
//! was resolved and tests can inject answers. The production implementation
//! is backed by hickory-resolver, configured like our other outbound DNS
//! consumers: plain UDP nameservers, a five second timeout, caching off.

use async_trait::async_trait;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::rdata::caa::Value;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use lantern_common::ProblemDetails;

/// A CAA record as the policy evaluator consumes it.
///
/// `flag` is the raw RFC 6844 flag byte; any non-zero value is treated as
/// critical. `tag` is the property name verbatim so unrecognized tags are
/// preserved for the critical-unknown check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaaRecord {
    pub flag: u8,
    pub tag: String,
    pub value: String,
}

impl CaaRecord {
    pub fn new(flag: u8, tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag,
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// Failures surfaced by a [`DnsResolver`].
#[derive(Debug, Error)]
pub enum DnsError {
    /// The query did not complete within the resolver's timeout.
    #[error("DNS query for '{name}' timed out")]
    Timeout { name: String },

    /// The name definitively does not exist (NXDOMAIN).
    #[error("No such domain '{name}'")]
    Nxdomain { name: String },

    /// The authoritative or recursive server reported SERVFAIL.
    #[error("DNS server failure looking up '{name}'")]
    ServFail { name: String },

    /// Transport-level or protocol failure.
    #[error("DNS failure looking up '{name}': {message}")]
    Network { name: String, message: String },
}

impl DnsError {
    /// Map a DNS failure onto the client-facing problem taxonomy. Definitive
    /// non-existence is an `unknownHost` problem; timeouts and transient
    /// server failures are `connection` problems.
    pub fn to_problem(&self) -> ProblemDetails {
        match self {
            DnsError::Nxdomain { .. } => ProblemDetails::unknown_host(self.to_string()),
            DnsError::Timeout { .. } => ProblemDetails::connection("DNS query timed out"),
            DnsError::ServFail { .. } | DnsError::Network { .. } => {
                ProblemDetails::connection(self.to_string())
            }
        }
    }
}

/// The DNS operations the VA performs.
///
/// Implementations must be safe for concurrent use and are expected to snap
/// CNAME/DNAME chains during lookup. Empty answers are `Ok(vec![])`, never an
/// error; callers decide what absence means for their protocol.
#[async_trait]
pub trait DnsResolver: Send + Sync + Debug {
    /// All IPv4 addresses for a hostname (A records only).
    async fn lookup_host(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError>;

    /// All TXT strings published at a name, with multi-segment records joined.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;

    /// All CAA records published at a name.
    async fn lookup_caa(&self, name: &str) -> Result<Vec<CaaRecord>, DnsError>;
}

/// Production resolver backed by hickory-resolver.
#[derive(Debug)]
pub struct HickoryDnsResolver {
    inner: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    /// A resolver querying the given nameservers over UDP.
    ///
    /// Caching is disabled: validation must observe the live state of the
    /// applicant's zone, not a stale answer.
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let mut config = ResolverConfig::new();
        for ip in nameservers {
            config.add_name_server(NameServerConfig::new(
                SocketAddr::new(*ip, 53),
                Protocol::Udp,
            ));
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        opts.cache_size = 0;

        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// A resolver configured from the host's `/etc/resolv.conf`.
    pub fn from_system_conf() -> Result<Self, DnsError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| map_resolve_error("system configuration", e))?;
        Ok(Self { inner })
    }
}

/// Classify a hickory failure. NXDOMAIN and SERVFAIL are pulled out of the
/// negative-answer variant; everything else degrades to a network failure.
fn map_resolve_error(name: &str, err: ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match response_code {
            ResponseCode::NXDomain => DnsError::Nxdomain {
                name: name.to_string(),
            },
            ResponseCode::ServFail => DnsError::ServFail {
                name: name.to_string(),
            },
            _ => DnsError::Network {
                name: name.to_string(),
                message: err.to_string(),
            },
        },
        ResolveErrorKind::Timeout => DnsError::Timeout {
            name: name.to_string(),
        },
        _ => DnsError::Network {
            name: name.to_string(),
            message: err.to_string(),
        },
    }
}

/// A negative answer with NOERROR is an empty result set, not a failure.
fn empty_or_err<T>(name: &str, err: ResolveError) -> Result<Vec<T>, DnsError> {
    if let ResolveErrorKind::NoRecordsFound { response_code, .. } = err.kind() {
        if *response_code == ResponseCode::NoError {
            return Ok(vec![]);
        }
    }
    Err(map_resolve_error(name, err))
}

fn caa_value_string(value: &Value) -> String {
    match value {
        Value::Issuer(Some(name), _params) => {
            name.to_string().trim_end_matches('.').to_lowercase()
        }
        // An empty issuer name (";") authorizes nobody.
        Value::Issuer(None, _params) => String::new(),
        Value::Url(url) => url.to_string(),
        Value::Unknown(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn lookup_host(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        match self.inner.ipv4_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().map(|a| a.0).collect()),
            Err(e) => empty_or_err(name, e),
        }
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        match self.inner.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect()
                })
                .collect()),
            Err(e) => empty_or_err(name, e),
        }
    }

    async fn lookup_caa(&self, name: &str) -> Result<Vec<CaaRecord>, DnsError> {
        let lookup = match self.inner.lookup(name, RecordType::CAA).await {
            Ok(lookup) => lookup,
            Err(e) => return empty_or_err(name, e),
        };

        let records: Vec<CaaRecord> = lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::CAA(caa) => Some(CaaRecord {
                    // hickory models only the issuer-critical bit of the
                    // flag byte.
                    flag: if caa.issuer_critical() { 128 } else { 0 },
                    tag: caa.tag().as_str().to_string(),
                    value: caa_value_string(caa.value()),
                }),
                _ => None,
            })
            .collect();

        trace!(name = %name, count = records.len(), "CAA lookup complete");
        Ok(records)
    }
}
