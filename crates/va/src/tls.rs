//! TLS-SNI-01: probe a TLS endpoint with a synthetic SNI
//!
//! The prober dials the resolved address directly, offers the zName as SNI,
//! and succeeds iff the peer's first certificate carries a matching DNS SAN.
//! Certificate chains are deliberately not verified: the applicant is in the
//! middle of obtaining their first trusted certificate.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use lantern_common::ProblemDetails;

use crate::authority::ValidationAuthority;
use crate::challenge::{constant_time_eq, Challenge};
use crate::config::{TLS_SNI_SUFFIX, VALIDATION_TIMEOUT};
use crate::net::classify_net_error;
use crate::types::{AcmeIdentifier, ValidationRecord};

/// The synthetic SNI name for a key authorization:
/// `hex(sha256(ka))[0:32] "." hex[32:64] "." <suffix>`, lowercase hex.
pub(crate) fn z_name(key_authorization: &str) -> String {
    let digest = hex::encode(Sha256::digest(key_authorization.as_bytes()));
    format!("{}.{}.{}", &digest[..32], &digest[32..], TLS_SNI_SUFFIX)
}

/// Accepts any peer certificate. Signature checks still run so the handshake
/// is a real one; only chain and hostname validation are skipped.
#[derive(Debug)]
struct InsecureVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn insecure_client_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// DNS SANs of a DER certificate, in presented order.
fn dns_sans(der: &CertificateDer<'_>) -> Result<Vec<String>, ProblemDetails> {
    let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|_| {
        ProblemDetails::unauthorized("Failed to parse certificate presented for TLS SNI challenge")
    })?;

    let san = cert.subject_alternative_name().map_err(|_| {
        ProblemDetails::unauthorized("Invalid subjectAltName in certificate presented for TLS SNI challenge")
    })?;

    Ok(san
        .map(|extension| {
            extension
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default())
}

impl ValidationAuthority {
    /// Probe the identifier's host with `server_name` as SNI and require a
    /// matching DNS SAN in the first peer certificate.
    pub(crate) async fn validate_tls_with_z_name(
        &self,
        identifier: &AcmeIdentifier,
        challenge: &Challenge,
        server_name: &str,
    ) -> (Vec<ValidationRecord>, Option<ProblemDetails>) {
        let mut record = ValidationRecord {
            hostname: identifier.value.clone(),
            port: self.ports.tls,
            ..Default::default()
        };

        let (addr, all_addrs) = match self.resolve_addr(&identifier.value).await {
            Ok(resolved) => resolved,
            Err(problem) => return (vec![record], Some(problem)),
        };
        record.addresses_resolved = all_addrs;
        record.address_used = Some(addr);
        let records = vec![record];

        info!(
            challenge_type = %challenge.challenge_type,
            identifier = %identifier,
            address = %addr,
            port = self.ports.tls,
            server_name,
            "Attempting TLS SNI validation"
        );

        let config = match insecure_client_config() {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "Failed to build TLS client configuration");
                return (
                    records,
                    Some(ProblemDetails::server_internal(
                        "Failed to construct TLS client",
                    )),
                );
            }
        };

        let sni = match ServerName::try_from(server_name.to_string()) {
            Ok(sni) => sni,
            Err(_) => {
                return (
                    records,
                    Some(ProblemDetails::malformed("Computed SNI name was invalid")),
                )
            }
        };

        let connect = async {
            let tcp = TcpStream::connect((addr, self.ports.tls)).await?;
            TlsConnector::from(Arc::new(config)).connect(sni, tcp).await
        };

        let stream = match timeout(VALIDATION_TIMEOUT, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(
                    challenge_type = %challenge.challenge_type,
                    identifier = %identifier,
                    error = %e,
                    "TLS connection failure"
                );
                return (
                    records,
                    Some(ProblemDetails::new(
                        classify_net_error(&e),
                        "Failed to connect to host for TLS SNI challenge",
                    )),
                );
            }
            Err(_) => {
                return (
                    records,
                    Some(ProblemDetails::connection(
                        "Timed out connecting to host for TLS SNI challenge",
                    )),
                )
            }
        };

        let (_, session) = stream.get_ref();
        let peer_certs = match session.peer_certificates() {
            Some(certs) if !certs.is_empty() => certs,
            _ => {
                return (
                    records,
                    Some(ProblemDetails::unauthorized(
                        "No certs presented for TLS SNI challenge",
                    )),
                )
            }
        };

        let names = match dns_sans(&peer_certs[0]) {
            Ok(names) => names,
            Err(problem) => return (records, Some(problem)),
        };

        for name in &names {
            if constant_time_eq(name.as_bytes(), server_name.as_bytes()) {
                return (records, None);
            }
        }

        (
            records,
            Some(ProblemDetails::unauthorized(format!(
                "Correct zName not found for TLS SNI challenge. Found '{}'",
                names.join(", ")
            ))),
        )
    }

    /// TLS-SNI-01: derive the zName from the key authorization and probe.
    pub(crate) async fn validate_tls_sni01(
        &self,
        identifier: &AcmeIdentifier,
        challenge: &Challenge,
    ) -> (Vec<ValidationRecord>, Option<ProblemDetails>) {
        let key_authorization = match &challenge.key_authorization {
            Some(authorization) => authorization.to_string(),
            None => {
                return (
                    vec![],
                    Some(ProblemDetails::malformed(
                        "Challenge is missing a key authorization",
                    )),
                )
            }
        };

        let server_name = z_name(&key_authorization);
        self.validate_tls_with_z_name(identifier, challenge, &server_name)
            .await
    }
}
