//! DNS-01: TXT record probe
//!
//! The applicant publishes `hex(sha256(keyAuthorization))` in a TXT record at
//! `_acme-challenge.<name>`. No socket-level hops are performed, so this
//! probe produces no validation records; the resolver's audit logging covers
//! the lookup itself.

use sha2::{Digest, Sha256};
use tracing::debug;

use lantern_common::ProblemDetails;

use crate::authority::ValidationAuthority;
use crate::challenge::{constant_time_eq, Challenge};
use crate::config::DNS_PREFIX;
use crate::types::{AcmeIdentifier, ValidationRecord};

impl ValidationAuthority {
    /// DNS-01: look for a TXT record equal to the key authorization digest.
    pub(crate) async fn validate_dns01(
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

        let expected = hex::encode(Sha256::digest(key_authorization.as_bytes()));
        let challenge_subdomain = format!("{}.{}", DNS_PREFIX, identifier.value);

        let found = match self.resolver.lookup_txt(&challenge_subdomain).await {
            Ok(values) => values,
            Err(e) => {
                debug!(
                    challenge_type = %challenge.challenge_type,
                    identifier = %identifier,
                    error = %e,
                    "DNS failure"
                );
                return (vec![], Some(e.to_problem()));
            }
        };

        for value in &found {
            if constant_time_eq(value.as_bytes(), expected.as_bytes()) {
                return (vec![], None);
            }
        }

        (
            vec![],
            Some(ProblemDetails::unauthorized(
                "Correct value not found for DNS challenge",
            )),
        )
    }
}
