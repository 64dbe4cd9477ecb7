//! TLS-SNI-01 validation against a local TLS listener

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;

use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use lantern_common::ProblemType;
use lantern_va::{
    AcmeIdentifier, Authorization, Challenge, ChallengeStatus, ChallengeType, Jwk, PortConfig,
};

use common::{build_va, MockResolver};

const LOCALHOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

fn account_key() -> Jwk {
    Jwk::Rsa {
        e: "AQAB".to_string(),
        n: "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86z".to_string(),
    }
}

fn tls_sni_authz(token: &str) -> (Authorization, String) {
    let challenge = Challenge::pending(ChallengeType::TlsSni01, token, account_key());
    let key_authorization = challenge.key_authorization.as_ref().unwrap().to_string();
    let authz = Authorization {
        id: "authz-sni".to_string(),
        registration_id: 9,
        identifier: AcmeIdentifier::dns("example.com"),
        challenges: vec![challenge],
    };
    (authz, key_authorization)
}

/// The SNI name a validator derives from a key authorization.
fn expected_z_name(key_authorization: &str) -> String {
    let digest = hex::encode(Sha256::digest(key_authorization.as_bytes()));
    format!("{}.{}.acme.invalid", &digest[..32], &digest[32..])
}

/// Serve a freshly generated self-signed certificate carrying the given SANs
/// on an ephemeral port, returning the port.
async fn start_tls_server(san_names: Vec<String>) -> u16 {
    let key_pair = KeyPair::generate().unwrap();
    let params = CertificateParams::new(san_names).unwrap();
    let cert = params.self_signed(&key_pair).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        )
        .unwrap();

    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(stream).await;
            });
        }
    });

    port
}

#[tokio::test]
async fn tls_sni_success_with_matching_san() {
    let (authz, key_authorization) = tls_sni_authz("tok");
    let port = start_tls_server(vec![expected_z_name(&key_authorization)]).await;

    let resolver = MockResolver::new().with_host("example.com", vec![LOCALHOST]);
    let ports = PortConfig {
        tls: port,
        ..PortConfig::default()
    };
    let (va, mut rx) = build_va(ports, resolver);

    va.update_validations(authz, 0).unwrap();
    let authz = rx.recv().await.unwrap();
    let challenge = &authz.challenges[0];

    assert_eq!(challenge.status, ChallengeStatus::Valid);
    assert!(challenge.error.is_none());
    assert_eq!(challenge.validation_record.len(), 1);

    let record = &challenge.validation_record[0];
    assert_eq!(record.hostname, "example.com");
    assert_eq!(record.port, port);
    assert_eq!(record.address_used, Some(LOCALHOST));
    assert!(record.url.is_none());
}

#[tokio::test]
async fn tls_sni_mismatched_san_lists_what_was_seen() {
    let (authz, _) = tls_sni_authz("tok");
    let port = start_tls_server(vec!["wrong.acme.invalid".to_string()]).await;

    let resolver = MockResolver::new().with_host("example.com", vec![LOCALHOST]);
    let ports = PortConfig {
        tls: port,
        ..PortConfig::default()
    };
    let (va, mut rx) = build_va(ports, resolver);

    va.update_validations(authz, 0).unwrap();
    let authz = rx.recv().await.unwrap();
    let challenge = &authz.challenges[0];

    assert_eq!(challenge.status, ChallengeStatus::Invalid);
    let problem = challenge.error.as_ref().unwrap();
    assert_eq!(problem.problem_type, ProblemType::Unauthorized);
    assert!(problem.detail.contains("wrong.acme.invalid"));
}

#[tokio::test]
async fn tls_sni_connection_refused_is_a_connection_problem() {
    let (authz, _) = tls_sni_authz("tok");

    // Bind and immediately drop a listener to find a port nobody serves.
    let port = {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let resolver = MockResolver::new().with_host("example.com", vec![LOCALHOST]);
    let ports = PortConfig {
        tls: port,
        ..PortConfig::default()
    };
    let (va, mut rx) = build_va(ports, resolver);

    va.update_validations(authz, 0).unwrap();
    let authz = rx.recv().await.unwrap();
    let challenge = &authz.challenges[0];

    assert_eq!(challenge.status, ChallengeStatus::Invalid);
    let problem = challenge.error.as_ref().unwrap();
    assert_eq!(problem.problem_type, ProblemType::Connection);
    // The resolution hop is still recorded for audit.
    assert_eq!(challenge.validation_record.len(), 1);
    assert_eq!(
        challenge.validation_record[0].address_used,
        Some(LOCALHOST)
    );
}
