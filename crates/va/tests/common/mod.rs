//! Shared mock collaborators for VA integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;

use lantern_va::{
    Authorization, CaaRecord, DnsError, DnsResolver, PortConfig, PublicSuffixOracle,
    RegistrationAuthority, SuffixError, VaConfig, ValidationAuthority,
};

/// Resolver answering from fixed tables; anything unlisted resolves empty.
#[derive(Debug, Default)]
pub struct MockResolver {
    hosts: HashMap<String, Vec<Ipv4Addr>>,
    txts: HashMap<String, Vec<String>>,
    caas: HashMap<String, Vec<CaaRecord>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: &str, addrs: Vec<Ipv4Addr>) -> Self {
        self.hosts.insert(name.to_string(), addrs);
        self
    }

    pub fn with_txt(mut self, name: &str, values: Vec<String>) -> Self {
        self.txts.insert(name.to_string(), values);
        self
    }

    pub fn with_caa(mut self, name: &str, records: Vec<CaaRecord>) -> Self {
        self.caas.insert(name.to_string(), records);
        self
    }
}

#[async_trait]
impl DnsResolver for MockResolver {
    async fn lookup_host(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        Ok(self.hosts.get(name).cloned().unwrap_or_default())
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        Ok(self.txts.get(name).cloned().unwrap_or_default())
    }

    async fn lookup_caa(&self, name: &str) -> Result<Vec<CaaRecord>, DnsError> {
        Ok(self.caas.get(name).cloned().unwrap_or_default())
    }
}

/// Oracle treating one label as the only ICANN TLD.
#[derive(Debug)]
pub struct StaticSuffixOracle {
    tld: String,
}

impl StaticSuffixOracle {
    pub fn icann(tld: &str) -> Self {
        Self {
            tld: tld.to_string(),
        }
    }
}

impl PublicSuffixOracle for StaticSuffixOracle {
    fn icann_tld(&self, name: &str) -> Result<String, SuffixError> {
        if name == self.tld || name.ends_with(&format!(".{}", self.tld)) {
            Ok(self.tld.clone())
        } else {
            Err(SuffixError::NotUnderSuffix {
                name: name.to_string(),
            })
        }
    }
}

/// RA forwarding completed authorizations to the test body.
#[derive(Debug)]
pub struct CapturingRa {
    tx: mpsc::UnboundedSender<Authorization>,
}

impl CapturingRa {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Authorization>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RegistrationAuthority for CapturingRa {
    async fn on_validation_update(&self, authz: Authorization) {
        let _ = self.tx.send(authz);
    }
}

/// A VA wired to mocks, plus the channel its RA reports on.
pub fn build_va(
    ports: PortConfig,
    resolver: MockResolver,
) -> (
    Arc<ValidationAuthority>,
    mpsc::UnboundedReceiver<Authorization>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let va = ValidationAuthority::new(
        VaConfig {
            ports,
            issuer_domain: "ca.example".to_string(),
            user_agent: Some("lantern-va-test/0.2".to_string()),
        },
        Arc::new(CapturingRa { tx }),
        Arc::new(resolver),
        Arc::new(StaticSuffixOracle::icann("com")),
    )
    .unwrap();
    (Arc::new(va), rx)
}
