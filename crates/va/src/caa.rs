//! CAA policy evaluation (RFC 6844)
//!
//! The evaluator walks the label hierarchy from the validated name toward
//! the root, stopping at the public-suffix boundary, and interprets the
//! first non-empty CAA record set it finds. The walk is driven by a
//! [`PublicSuffixOracle`] so the VA never queries CAA on an ICANN TLD,
//! which could implicate unrelated registries.

use publicsuffix::{List, Psl, Type};
use std::fmt::Debug;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use lantern_common::{ProblemDetails, AUDIT_TARGET};

use crate::authority::ValidationAuthority;
use crate::resolver::{CaaRecord, DnsError};
use crate::types::AcmeIdentifier;

/// Failures from a public-suffix lookup.
#[derive(Debug, Error)]
pub enum SuffixError {
    #[error("'{name}' is not under an ICANN public suffix")]
    NotUnderSuffix { name: String },

    #[error("public suffix data is invalid: {message}")]
    InvalidList { message: String },
}

/// Answers "what is the ICANN TLD of this name?".
///
/// Errors terminate the CAA walk as if a TLD had been reached; see the
/// policy note on `caa_set_for`.
pub trait PublicSuffixOracle: Send + Sync + Debug {
    fn icann_tld(&self, name: &str) -> Result<String, SuffixError>;
}

/// Oracle backed by a parsed public-suffix-list snapshot.
pub struct PslOracle {
    list: List,
}

impl Debug for PslOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PslOracle").finish_non_exhaustive()
    }
}

impl PslOracle {
    /// Parse an oracle from public-suffix-list text (the caller decides how
    /// fresh a snapshot to supply).
    pub fn from_list_data(data: &str) -> Result<Self, SuffixError> {
        let list = List::from_str(data).map_err(|e| SuffixError::InvalidList {
            message: e.to_string(),
        })?;
        Ok(Self { list })
    }
}

impl PublicSuffixOracle for PslOracle {
    fn icann_tld(&self, name: &str) -> Result<String, SuffixError> {
        let mut candidate = name.trim_end_matches('.').to_string();
        loop {
            let suffix = self
                .list
                .suffix(candidate.as_bytes())
                .ok_or_else(|| SuffixError::NotUnderSuffix {
                    name: name.to_string(),
                })?;
            let suffix_str = String::from_utf8_lossy(suffix.as_bytes()).into_owned();
            if suffix.typ() == Some(Type::Icann) {
                return Ok(suffix_str);
            }
            // A private suffix (or an unknown label): climb above it and
            // look for the ICANN suffix it hangs off.
            match suffix_str.split_once('.') {
                Some((_, parent)) => candidate = parent.to_string(),
                None => {
                    return Err(SuffixError::NotUnderSuffix {
                        name: name.to_string(),
                    })
                }
            }
        }
    }
}

/// CAA records of one domain, filtered by property tag.
#[derive(Debug, Default, Clone)]
pub struct CaaSet {
    pub issue: Vec<CaaRecord>,
    pub issuewild: Vec<CaaRecord>,
    pub iodef: Vec<CaaRecord>,
    pub unknown: Vec<CaaRecord>,
}

impl CaaSet {
    pub fn from_records(records: Vec<CaaRecord>) -> Self {
        let mut set = CaaSet::default();
        for record in records {
            match record.tag.as_str() {
                "issue" => set.issue.push(record),
                "issuewild" => set.issuewild.push(record),
                "iodef" => set.iodef.push(record),
                _ => set.unknown.push(record),
            }
        }
        set
    }

    /// True if any unrecognized-tag record carries a non-zero flag. RFC 6844
    /// reserves the critical bit, but all non-zero flags are currently
    /// interpreted as critical.
    pub fn critical_unknown(&self) -> bool {
        self.unknown.iter().any(|record| record.flag > 0)
    }

    /// Whether the set restricts issuance at all.
    pub fn restricts_issuance(&self) -> bool {
        !self.issue.is_empty() || !self.issuewild.is_empty()
    }
}

impl ValidationAuthority {
    /// Find the CAA set governing `hostname`: the first non-empty answer on
    /// the path from the name to (but excluding) its ICANN TLD. The resolver
    /// is trusted to snap CNAME/DNAME chains during lookup.
    ///
    /// An oracle error terminates the walk as if a TLD were reached,
    /// yielding "no CAA found". NXDOMAIN at one level is an empty answer;
    /// the parent may still publish policy.
    pub(crate) async fn caa_set_for(&self, hostname: &str) -> Result<Option<CaaSet>, DnsError> {
        let hostname = hostname.trim_end_matches('.');
        let labels: Vec<&str> = hostname.split('.').collect();

        for i in 0..labels.len() {
            let name = labels[i..].join(".");
            match self.public_suffix.icann_tld(&name) {
                Err(e) => {
                    debug!(name = %name, error = %e, "Public suffix lookup ended CAA walk");
                    break;
                }
                Ok(tld) if tld == name => break,
                Ok(_) => {}
            }

            match self.resolver.lookup_caa(&name).await {
                Ok(records) if !records.is_empty() => {
                    return Ok(Some(CaaSet::from_records(records)));
                }
                Ok(_) | Err(DnsError::Nxdomain { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Decide whether CAA permits this CA to issue for `identifier`.
    ///
    /// Returns `(present, valid)`: whether any CAA set governs the name, and
    /// whether issuance is permitted. An explicit allow for our issuer
    /// domain always wins; in its absence, a critical record for another CA
    /// blocks us.
    pub async fn check_caa_records(
        &self,
        identifier: &AcmeIdentifier,
    ) -> Result<(bool, bool), DnsError> {
        let hostname = identifier.value.to_lowercase();
        let set = match self.caa_set_for(&hostname).await? {
            // No CAA records found anywhere: free to issue.
            None => return Ok((false, true)),
            Some(set) => set,
        };

        if set.critical_unknown() {
            return Ok((true, false));
        }
        if !set.restricts_issuance() {
            // Only iodef (or nothing actionable): no restriction on issuance.
            return Ok((true, true));
        }

        let relevant = if hostname.starts_with("*.") {
            &set.issuewild
        } else {
            &set.issue
        };

        for record in relevant {
            if record.value == self.issuer_domain {
                return Ok((true, true));
            }
            if record.flag > 0 {
                return Ok((true, false));
            }
        }
        Ok((true, false))
    }

    /// CAA half of a validation: evaluate policy and map the outcome to a
    /// problem. `registration_id` participates only in the audit trail.
    pub(crate) async fn check_caa(
        &self,
        identifier: &AcmeIdentifier,
        registration_id: i64,
    ) -> Option<ProblemDetails> {
        let (present, valid) = match self.check_caa_records(identifier).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Problem checking CAA");
                return Some(e.to_problem());
            }
        };

        info!(
            target: AUDIT_TARGET,
            identifier = %identifier,
            registration_id,
            present,
            valid,
            "Checked CAA records"
        );

        if !valid {
            return Some(ProblemDetails::connection(format!(
                "CAA check for {} failed",
                identifier.value
            )));
        }
        None
    }
}
