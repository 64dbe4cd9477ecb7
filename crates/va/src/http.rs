//! HTTP-01: well-known resource fetch over pinned connections
//!
//! The fetcher builds the target URL itself, creates the first validation
//! record before any I/O, and walks redirects manually: every hop re-resolves
//! the new host through the VA's resolver, rebuilds the pinned client, and
//! appends a record before the hop is taken so even a failed hop is
//! auditable. All hops share one five second budget.

use reqwest::header::{ACCEPT, LOCATION};
use reqwest::StatusCode;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

use lantern_common::{ProblemDetails, AUDIT_TARGET};

use crate::authority::ValidationAuthority;
use crate::challenge::{Challenge, KeyAuthorization};
use crate::config::{MAX_REDIRECT, VALIDATION_TIMEOUT, WELL_KNOWN_PATH, WHITESPACE_CUTSET};
use crate::net::{classify_net_error, pinned_http_client};
use crate::types::{AcmeIdentifier, ValidationRecord};

/// `scheme://host[:port]/path`, eliding the port when it matches the scheme
/// default so recorded URLs look the way subscribers wrote them.
fn build_url(scheme: &str, host: &str, port: u16, path: &str) -> String {
    let default_port = if scheme == "https" { 443 } else { 80 };
    if port == default_port {
        format!("{}://{}/{}", scheme, host, path)
    } else {
        format!("{}://{}:{}/{}", scheme, host, port, path)
    }
}

/// Destination of one redirect hop.
struct RedirectTarget {
    url: Url,
    host: String,
    port: u16,
}

/// Parse a Location header against the current URL. The new port must be an
/// explicit integer in range or the scheme default; anything else is a
/// malformed redirect.
fn parse_redirect(current: &Url, location: &str) -> Result<RedirectTarget, ProblemDetails> {
    let next = current
        .join(location)
        .map_err(|_| ProblemDetails::malformed("Invalid redirect URL"))?;

    let scheme = next.scheme().to_string();
    if scheme != "http" && scheme != "https" {
        return Err(ProblemDetails::malformed(format!(
            "Invalid redirect scheme '{}'",
            scheme
        )));
    }

    let host = next
        .host_str()
        .ok_or_else(|| ProblemDetails::malformed("Redirect URL is missing a host"))?
        .to_string();

    let port = match next.port() {
        Some(0) => {
            return Err(ProblemDetails::malformed(
                "Invalid port number 0 in redirect",
            ))
        }
        Some(port) => port,
        None => {
            if scheme == "https" {
                443
            } else {
                80
            }
        }
    };

    Ok(RedirectTarget {
        url: next,
        host,
        port,
    })
}

impl ValidationAuthority {
    /// Fetch `path` from the identifier's host over HTTP or HTTPS.
    ///
    /// Returns every hop's validation record alongside the body or problem.
    /// Only HTTP 200 is success; any other terminal status is an
    /// authorization failure, not a retryable transport error.
    pub(crate) async fn fetch_http(
        &self,
        identifier: &AcmeIdentifier,
        path: &str,
        use_tls: bool,
        challenge: &Challenge,
    ) -> (Vec<ValidationRecord>, Result<Vec<u8>, ProblemDetails>) {
        let (scheme, port) = if use_tls {
            ("https", self.ports.https)
        } else {
            ("http", self.ports.http)
        };

        let url_str = build_url(scheme, &identifier.value, port, path);
        let url = match Url::parse(&url_str) {
            Ok(url) => url,
            Err(_) => {
                return (
                    vec![],
                    Err(ProblemDetails::malformed("URL provided for HTTP was invalid")),
                )
            }
        };

        info!(
            target: AUDIT_TARGET,
            challenge_type = %challenge.challenge_type,
            url = %url,
            "Attempting to validate"
        );

        let deadline = Instant::now() + VALIDATION_TIMEOUT;
        let mut records: Vec<ValidationRecord> = Vec::new();
        let mut current_url = url;
        let mut current_host = identifier.value.clone();
        let mut current_port = port;

        loop {
            let mut record = ValidationRecord {
                hostname: current_host.clone(),
                port: current_port,
                url: Some(current_url.to_string()),
                ..Default::default()
            };

            let (addr, all_addrs) = match self.resolve_addr(&current_host).await {
                Ok(resolved) => resolved,
                Err(problem) => {
                    records.push(record);
                    return (records, Err(problem));
                }
            };
            record.addresses_resolved = all_addrs;
            record.address_used = Some(addr);
            records.push(record);

            let now = Instant::now();
            if now >= deadline {
                return (
                    records,
                    Err(ProblemDetails::connection(format!(
                        "Could not connect to {}: validation timed out",
                        current_url
                    ))),
                );
            }

            let client = match pinned_http_client(
                &current_host,
                addr,
                current_port,
                deadline - now,
                self.user_agent.as_deref(),
            ) {
                Ok(client) => client,
                Err(e) => {
                    debug!(error = %e, "Failed to construct pinned HTTP client");
                    return (
                        records,
                        Err(ProblemDetails::server_internal(
                            "Failed to construct HTTP client",
                        )),
                    );
                }
            };

            let response = match client
                .get(current_url.clone())
                .header(ACCEPT, "*/*")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!(
                        challenge_type = %challenge.challenge_type,
                        identifier = %identifier,
                        error = %e,
                        "HTTP fetch failure"
                    );
                    let problem_type = classify_net_error(&e);
                    return (
                        records,
                        Err(ProblemDetails::new(
                            problem_type,
                            format!("Could not connect to {}", current_url),
                        )),
                    );
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let location = match response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                {
                    Some(location) => location.to_string(),
                    None => {
                        return (
                            records,
                            Err(ProblemDetails::unauthorized(format!(
                                "Invalid response from {} [{}]: {}",
                                current_url,
                                addr,
                                status.as_u16()
                            ))),
                        )
                    }
                };

                if records.len() > MAX_REDIRECT {
                    return (records, Err(ProblemDetails::connection("Too many redirects")));
                }

                let target = match parse_redirect(&current_url, &location) {
                    Ok(target) => target,
                    Err(problem) => return (records, Err(problem)),
                };

                info!(
                    challenge_type = %challenge.challenge_type,
                    identifier = %identifier,
                    from = %current_url,
                    to = %target.url,
                    "Following redirect"
                );

                current_url = target.url;
                current_host = target.host;
                current_port = target.port;
                continue;
            }

            if status != StatusCode::OK {
                return (
                    records,
                    Err(ProblemDetails::unauthorized(format!(
                        "Invalid response from {} [{}]: {}",
                        current_url,
                        addr,
                        status.as_u16()
                    ))),
                );
            }

            return match response.bytes().await {
                Ok(body) => (records, Ok(body.to_vec())),
                Err(e) => (
                    records,
                    Err(ProblemDetails::unauthorized(format!(
                        "Error reading HTTP response body: {}",
                        e
                    ))),
                ),
            };
        }
    }

    /// HTTP-01: fetch the well-known resource and require its trimmed body
    /// to be a key authorization matching this challenge.
    pub(crate) async fn validate_http01(
        &self,
        identifier: &AcmeIdentifier,
        challenge: &Challenge,
    ) -> (Vec<ValidationRecord>, Option<ProblemDetails>) {
        let path = format!("{}/{}", WELL_KNOWN_PATH, challenge.token);
        let (records, fetched) = self.fetch_http(identifier, &path, false, challenge).await;
        let body = match fetched {
            Ok(body) => body,
            Err(problem) => return (records, Some(problem)),
        };

        let raw = String::from_utf8_lossy(&body).into_owned();
        let payload = raw.trim_matches(WHITESPACE_CUTSET);

        let server_authorization: KeyAuthorization = match payload.parse() {
            Ok(authorization) => authorization,
            Err(e) => {
                debug!(identifier = %identifier, error = %e, "Unparseable key authorization file");
                return (
                    records,
                    Some(ProblemDetails::unauthorized(format!(
                        "Error parsing key authorization file: {}",
                        e
                    ))),
                );
            }
        };

        let account_key = match &challenge.account_key {
            Some(key) => key,
            None => {
                return (
                    records,
                    Some(ProblemDetails::malformed("Challenge is missing an account key")),
                )
            }
        };

        if !server_authorization.matches(&challenge.token, account_key) {
            let expected = challenge
                .key_authorization
                .as_ref()
                .map(|authorization| authorization.to_string())
                .unwrap_or_default();
            let detail = format!(
                "The key authorization file from the server did not match this challenge [{}] != [{}]",
                expected, raw
            );
            debug!(identifier = %identifier, "{}", detail);
            return (records, Some(ProblemDetails::unauthorized(detail)));
        }

        (records, None)
    }
}
