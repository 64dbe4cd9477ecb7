//! End-to-end validation flows: CAA policy interacting with challenge proofs

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lantern_common::ProblemType;
use lantern_va::caa::PslOracle;
use lantern_va::{
    AcmeIdentifier, Authorization, CaaRecord, Challenge, ChallengeStatus, ChallengeType, Jwk,
    PortConfig, VaConfig, ValidationAuthority,
};

use common::{build_va, CapturingRa, MockResolver};

const LOCALHOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

const PSL_SNIPPET: &str = "// ===BEGIN ICANN DOMAINS===\ncom\n// ===END ICANN DOMAINS===\n";

fn account_key() -> Jwk {
    Jwk::Ec {
        crv: "P-256".to_string(),
        x: "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".to_string(),
        y: "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".to_string(),
    }
}

fn va_for_caa(resolver: MockResolver) -> Arc<ValidationAuthority> {
    let (ra, _rx) = CapturingRa::new();
    Arc::new(
        ValidationAuthority::new(
            VaConfig {
                ports: PortConfig::default(),
                issuer_domain: "ca.example".to_string(),
                user_agent: None,
            },
            Arc::new(ra),
            Arc::new(resolver),
            Arc::new(PslOracle::from_list_data(PSL_SNIPPET).unwrap()),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn caa_allow_found_on_parent_domain() {
    // sub.example.com publishes nothing; example.com allows us.
    let resolver = MockResolver::new()
        .with_caa("example.com", vec![CaaRecord::new(0, "issue", "ca.example")]);
    let va = va_for_caa(resolver);

    let (present, valid) = va
        .check_caa_records(&AcmeIdentifier::dns("sub.example.com"))
        .await
        .unwrap();
    assert!(present);
    assert!(valid);
}

#[tokio::test]
async fn caa_critical_unknown_refuses_issuance() {
    let resolver = MockResolver::new()
        .with_caa("example.com", vec![CaaRecord::new(128, "unknown", "x")]);
    let va = va_for_caa(resolver);

    let (present, valid) = va
        .check_caa_records(&AcmeIdentifier::dns("example.com"))
        .await
        .unwrap();
    assert!(present);
    assert!(!valid);
}

#[tokio::test]
async fn caa_wildcard_consults_issuewild() {
    let resolver = MockResolver::new().with_caa(
        "example.com",
        vec![
            CaaRecord::new(0, "issue", "other.example"),
            CaaRecord::new(0, "issuewild", "ca.example"),
        ],
    );
    let va = va_for_caa(resolver);

    let (_, wildcard_valid) = va
        .check_caa_records(&AcmeIdentifier::dns("*.example.com"))
        .await
        .unwrap();
    assert!(wildcard_valid);

    let (_, plain_valid) = va
        .check_caa_records(&AcmeIdentifier::dns("www.example.com"))
        .await
        .unwrap();
    assert!(!plain_valid);
}

#[tokio::test]
async fn caa_absent_everywhere_permits_issuance() {
    let va = va_for_caa(MockResolver::new());

    let (present, valid) = va
        .check_caa_records(&AcmeIdentifier::dns("unrestricted.example.com"))
        .await
        .unwrap();
    assert!(!present);
    assert!(valid);
}

async fn run_http01_with_caa(caa: Vec<CaaRecord>) -> Authorization {
    let server = MockServer::start().await;
    let challenge = Challenge::pending(ChallengeType::Http01, "tok", account_key());
    let key_authorization = challenge.key_authorization.as_ref().unwrap().to_string();

    Mock::given(method("GET"))
        .and(path("/.well-known/acme-challenge/tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(key_authorization))
        .mount(&server)
        .await;

    let resolver = MockResolver::new()
        .with_host("example.com", vec![LOCALHOST])
        .with_caa("example.com", caa);
    let ports = PortConfig {
        http: server.address().port(),
        ..PortConfig::default()
    };
    let (va, mut rx) = build_va(ports, resolver);

    let authz = Authorization {
        id: "authz-e2e".to_string(),
        registration_id: 11,
        identifier: AcmeIdentifier::dns("example.com"),
        challenges: vec![challenge],
    };
    va.update_validations(authz, 0).unwrap();
    rx.recv().await.unwrap()
}

#[tokio::test]
async fn valid_proof_with_caa_allow_is_valid() {
    let authz = run_http01_with_caa(vec![CaaRecord::new(0, "issue", "ca.example")]).await;
    assert_eq!(authz.challenges[0].status, ChallengeStatus::Valid);
}

#[tokio::test]
async fn valid_proof_with_caa_deny_is_invalid() {
    let authz = run_http01_with_caa(vec![CaaRecord::new(0, "issue", "other.example")]).await;

    let challenge = &authz.challenges[0];
    assert_eq!(challenge.status, ChallengeStatus::Invalid);
    let problem = challenge.error.as_ref().unwrap();
    assert_eq!(problem.problem_type, ProblemType::Connection);
    assert!(problem.detail.contains("CAA"));
    // The successful fetch's audit trail is preserved alongside the CAA failure.
    assert_eq!(challenge.validation_record.len(), 1);
}
