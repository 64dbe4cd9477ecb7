//! The Validation Authority: orchestration of challenge and CAA checks
//!
//! `update_validations` is fire-and-forget: each call spawns an independent
//! task that runs the selected challenge probe concurrently with the CAA
//! policy check, joins both outcomes, stamps the challenge, emits an audit
//! event and a timing metric, and reports the finished authorization to the
//! Registration Authority exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use lantern_common::{audit_object, ProblemDetails};

use crate::caa::PublicSuffixOracle;
use crate::challenge::{Challenge, ChallengeStatus, ChallengeType};
use crate::config::{PortConfig, VaConfig};
use crate::metrics::VaMetrics;
use crate::resolver::DnsResolver;
use crate::types::{
    AcmeIdentifier, Authorization, IdentifierType, ValidationRecord, VerificationRequestEvent,
};

/// Sink for completed authorizations.
#[async_trait]
pub trait RegistrationAuthority: Send + Sync + Debug {
    async fn on_validation_update(&self, authz: Authorization);
}

/// Domain reputation oracle. Held for issuance-time policy queries; the
/// validation path itself never consults it.
#[async_trait]
pub trait SafeBrowsing: Send + Sync + Debug {
    async fn is_listed(&self, name: &str) -> bool;
}

/// Process-wide clock, injected so tests control recorded timestamps.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Errors surfaced directly to the VA's caller. Validation failures are not
/// errors; they travel inside the authorization as problem documents.
#[derive(Debug, Error)]
pub enum VaError {
    #[error("metrics initialization failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("challenge index {index} out of range for authorization '{authz}'")]
    ChallengeIndexOutOfRange { authz: String, index: usize },
}

/// The Validation Authority.
///
/// Holds no mutable state beyond construction-time configuration; all
/// request-scoped state lives on the stack of the per-validation task. The
/// injected collaborators must be safe for concurrent use.
#[derive(Debug)]
pub struct ValidationAuthority {
    pub(crate) ra: Arc<dyn RegistrationAuthority>,
    pub(crate) resolver: Arc<dyn DnsResolver>,
    pub(crate) public_suffix: Arc<dyn PublicSuffixOracle>,
    pub(crate) safe_browsing: Option<Arc<dyn SafeBrowsing>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: VaMetrics,
    pub(crate) issuer_domain: String,
    pub(crate) user_agent: Option<String>,
    pub(crate) ports: PortConfig,
}

impl ValidationAuthority {
    pub fn new(
        config: VaConfig,
        ra: Arc<dyn RegistrationAuthority>,
        resolver: Arc<dyn DnsResolver>,
        public_suffix: Arc<dyn PublicSuffixOracle>,
    ) -> Result<Self, VaError> {
        info!("Validation Authority starting");
        Ok(Self {
            ra,
            resolver,
            public_suffix,
            safe_browsing: None,
            clock: Arc::new(SystemClock),
            metrics: VaMetrics::new()?,
            issuer_domain: config.issuer_domain,
            user_agent: config.user_agent,
            ports: config.ports,
        })
    }

    /// Replace the wall clock (tests pin timestamps with this).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_safe_browsing(mut self, safe_browsing: Arc<dyn SafeBrowsing>) -> Self {
        self.safe_browsing = Some(safe_browsing);
        self
    }

    /// Expose the VA's metrics on a registry.
    pub fn register_metrics(&self, registry: &prometheus::Registry) -> Result<(), VaError> {
        self.metrics.register(registry)?;
        Ok(())
    }

    /// Whether issuance policy considers this domain safe. Open when no
    /// safe-browsing collaborator is configured.
    pub async fn is_safe_domain(&self, name: &str) -> bool {
        match &self.safe_browsing {
            Some(safe_browsing) => !safe_browsing.is_listed(name).await,
            None => true,
        }
    }

    /// Resolve a hostname to its A records and pick the preferred address:
    /// the first entry, leaving any shuffling or ordering policy to the
    /// resolver.
    pub(crate) async fn resolve_addr(
        &self,
        hostname: &str,
    ) -> Result<(Ipv4Addr, Vec<Ipv4Addr>), ProblemDetails> {
        let addrs = match self.resolver.lookup_host(hostname).await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(hostname, error = %e, "DNS failure");
                return Err(e.to_problem());
            }
        };

        match addrs.first().copied() {
            Some(preferred) => {
                debug!(hostname, address = %preferred, resolved = ?addrs, "Resolved addresses");
                Ok((preferred, addrs))
            }
            None => Err(ProblemDetails::unknown_host(format!(
                "No IPv4 addresses found for {}",
                hostname
            ))),
        }
    }

    /// Dispatch a challenge to its protocol probe after gating on identifier
    /// type and challenge sanity.
    pub(crate) async fn validate_challenge(
        &self,
        identifier: &AcmeIdentifier,
        challenge: &Challenge,
    ) -> (Vec<ValidationRecord>, Option<ProblemDetails>) {
        if identifier.identifier_type != IdentifierType::Dns {
            debug!(
                challenge_type = %challenge.challenge_type,
                identifier = %identifier,
                "Identifier failure"
            );
            return (
                vec![],
                Some(ProblemDetails::malformed(format!(
                    "Identifier type for {} validation was not DNS",
                    challenge.challenge_type
                ))),
            );
        }

        if !challenge.is_sane(false) {
            return (
                vec![],
                Some(ProblemDetails::malformed("Challenge failed sanity check")),
            );
        }

        match challenge.challenge_type {
            ChallengeType::Http01 => self.validate_http01(identifier, challenge).await,
            ChallengeType::TlsSni01 => self.validate_tls_sni01(identifier, challenge).await,
            ChallengeType::Dns01 => self.validate_dns01(identifier, challenge).await,
        }
    }

    /// Run the challenge probe and the CAA check concurrently and join the
    /// outcomes. The CAA task is always drained before returning. A
    /// challenge failure takes precedence (it is what the subscriber
    /// directly controls); a successful challenge with failing CAA yields
    /// the CAA problem.
    async fn validate_challenge_and_caa(
        self: &Arc<Self>,
        identifier: &AcmeIdentifier,
        challenge: &Challenge,
        registration_id: i64,
    ) -> (Vec<ValidationRecord>, Option<ProblemDetails>) {
        let (tx, rx) = oneshot::channel();
        {
            let va = Arc::clone(self);
            let identifier = identifier.clone();
            tokio::spawn(async move {
                let _ = tx.send(va.check_caa(&identifier, registration_id).await);
            });
        }

        let (records, challenge_problem) = self.validate_challenge(identifier, challenge).await;

        let caa_problem = match rx.await {
            Ok(problem) => problem,
            Err(_) => {
                warn!(identifier = %identifier, "CAA check task did not complete");
                Some(ProblemDetails::server_internal("CAA check failed to complete"))
            }
        };

        (records, challenge_problem.or(caa_problem))
    }

    /// One full validation: probe, join with CAA, stamp the challenge, emit
    /// audit and metrics, and report to the RA.
    async fn validate(self: Arc<Self>, mut authz: Authorization, challenge_index: usize) {
        let request_time = self.clock.now();
        let started = Instant::now();
        let identifier = authz.identifier.clone();
        let registration_id = authz.registration_id;

        let challenge_snapshot = authz.challenges[challenge_index].clone();
        let (records, problem) = self
            .validate_challenge_and_caa(&identifier, &challenge_snapshot, registration_id)
            .await;

        let error_string;
        {
            let challenge = &mut authz.challenges[challenge_index];
            challenge.validation_record = records;
            if let Some(problem) = problem {
                challenge.status = ChallengeStatus::Invalid;
                error_string = Some(problem.to_string());
                challenge.error = Some(problem);
            } else if !challenge.records_sane() {
                let problem =
                    ProblemDetails::server_internal("Records for validation failed sanity check");
                challenge.status = ChallengeStatus::Invalid;
                error_string = Some(problem.to_string());
                challenge.error = Some(problem);
            } else {
                challenge.status = ChallengeStatus::Valid;
                challenge.error = None;
                error_string = None;
            }
        }

        let challenge = &authz.challenges[challenge_index];
        self.metrics.observe_validation(
            challenge.challenge_type.as_str(),
            challenge.status.as_str(),
            started.elapsed(),
        );

        let event = VerificationRequestEvent {
            id: authz.id.clone(),
            requester: registration_id,
            challenge: challenge.clone(),
            request_time,
            response_time: self.clock.now(),
            error: error_string,
        };
        audit_object("Validation result", &event);

        info!(
            authz = %authz.id,
            identifier = %identifier,
            challenge_type = %challenge.challenge_type,
            status = %challenge.status,
            "Validation complete"
        );

        self.ra.on_validation_update(authz).await;
    }

    /// Begin validating the indexed challenge. Returns immediately; the
    /// outcome is delivered through the Registration Authority callback.
    pub fn update_validations(
        self: &Arc<Self>,
        authz: Authorization,
        challenge_index: usize,
    ) -> Result<(), VaError> {
        if challenge_index >= authz.challenges.len() {
            return Err(VaError::ChallengeIndexOutOfRange {
                authz: authz.id,
                index: challenge_index,
            });
        }

        let va = Arc::clone(self);
        tokio::spawn(async move {
            va.validate(authz, challenge_index).await;
        });
        Ok(())
    }
}
