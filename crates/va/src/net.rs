//! Pinned outbound connections
//!
//! All name-to-address mapping happens inside the VA. The HTTP client used
//! for a hop is built around a DNS override pinning the URL's host to the
//! address the VA resolved, so the client's own resolver is never consulted
//! and the audit trail records exactly which IP answered.

use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use lantern_common::ProblemType;

/// Build an HTTP client for a single pinned hop.
///
/// The URL's hostname is overridden to dial `addr`; the port always comes
/// from the URL, which the fetcher constructs to match the probe port.
/// Keep-alives are off (one request per endpoint), redirects are handled by
/// the fetcher itself, and TLS peer verification is disabled because the
/// applicant does not yet hold a trusted certificate.
pub(crate) fn pinned_http_client(
    hostname: &str,
    addr: Ipv4Addr,
    port: u16,
    timeout: Duration,
    user_agent: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .resolve(hostname, SocketAddr::new(IpAddr::V4(addr), port))
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .timeout(timeout);

    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }

    builder.build()
}

/// Classify a network-level failure into the problem taxonomy.
///
/// Walks the error source chain looking for a TLS-layer failure; anything
/// else is a generic connection problem. DNS problems never reach this
/// classifier because resolution happens before any connection is attempted.
pub(crate) fn classify_net_error(err: &(dyn StdError + 'static)) -> ProblemType {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return ProblemType::Tls;
        }
        current = e.source();
    }
    ProblemType::Connection
}
