use crate::config::OnboardingConfig;
use crate::error::{BifrostError, Result};
use crate::model::{CertStatus, Certificate};
use crate::retry::poll_until;
use crate::routing::RuleManager;
use crate::traits::{CertificateAuthority, RoutingControlPlane};
use crate::validation::Domain;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of an idempotent certificate request.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// A certificate already covers the domain and is issued.
    AlreadyIssued(Certificate),
    /// Pending validation; the caller must publish the validation record.
    PendingValidation(Certificate),
}

/// Outcome of an idempotent delete.
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted { certificate_id: String },
    AlreadyAbsent,
}

/// Drives the certificate lifecycle on the external authority. Holds no
/// certificate state of its own: every operation re-queries the authority.
pub struct CertificateOrchestrator {
    ca: Arc<dyn CertificateAuthority>,
    plane: Arc<dyn RoutingControlPlane>,
    config: OnboardingConfig,
}

impl CertificateOrchestrator {
    pub fn new(
        ca: Arc<dyn CertificateAuthority>,
        plane: Arc<dyn RoutingControlPlane>,
        config: OnboardingConfig,
    ) -> Self {
        Self { ca, plane, config }
    }

    /// Request a certificate for `domain` and `*.domain`, idempotently,
    /// registering `contact_email` as the issuance contact.
    ///
    /// An existing certificate is reused, never duplicated: calling this
    /// twice returns the same identity both times.
    pub async fn request(&self, domain: &Domain, contact_email: &str) -> Result<RequestOutcome> {
        if let Some(existing) = self.ca.find_by_domain(domain.as_str()).await? {
            return match existing.status {
                CertStatus::Issued => {
                    info!(domain = %domain, certificate = %existing.id, "certificate already issued");
                    Ok(RequestOutcome::AlreadyIssued(existing))
                }
                _ => {
                    debug!(domain = %domain, certificate = %existing.id, "certificate already pending");
                    let cert = self.await_validation_record(&existing.id, domain).await?;
                    Ok(RequestOutcome::PendingValidation(cert))
                }
            };
        }

        let alt_names = vec![format!("*.{domain}")];
        let id = self
            .ca
            .request(domain.as_str(), &alt_names, contact_email)
            .await?;
        info!(domain = %domain, certificate = %id, "certificate requested");

        let cert = self.await_validation_record(&id, domain).await?;
        Ok(RequestOutcome::PendingValidation(cert))
    }

    /// The authority populates validation-record metadata shortly after a
    /// request; "not yet populated" is retried here, never surfaced as a
    /// user error.
    async fn await_validation_record(&self, id: &str, domain: &Domain) -> Result<Certificate> {
        let found = poll_until(
            self.config.cert_poll_attempts,
            self.config.cert_poll_interval,
            || async {
                match self.ca.describe(id).await {
                    Ok(cert) if cert.status == CertStatus::Issued => Some(Ok(cert)),
                    Ok(cert) if cert.validation_record.is_some() => Some(Ok(cert)),
                    Ok(_) => None,
                    Err(e) if e.is_retryable() => None,
                    Err(e) => Some(Err(e)),
                }
            },
        )
        .await;

        match found {
            Some(result) => result,
            None => Err(BifrostError::ValidationRecordPending(
                domain.as_str().to_string(),
            )),
        }
    }

    /// Current certificate for `domain`, if any. `PendingValidation` is an
    /// expected intermediate state, not a failure.
    pub async fn find(&self, domain: &Domain) -> Result<Option<Certificate>> {
        self.ca.find_by_domain(domain.as_str()).await
    }

    /// Tear down the certificate for `domain`: detach from the listener,
    /// drop the routing rules, wait for in-use references to drain, then
    /// delete. Absence at any step is success.
    pub async fn delete(&self, domain: &Domain, rules: &RuleManager) -> Result<DeleteOutcome> {
        let Some(cert) = self.ca.find_by_domain(domain.as_str()).await? else {
            debug!(domain = %domain, "no certificate to delete");
            return Ok(DeleteOutcome::AlreadyAbsent);
        };

        // "Not attached" errors are swallowed by the control plane contract
        self.plane
            .detach_certificate(rules.listener_id(), &cert.id)
            .await?;
        rules.remove_rules_for(domain).await?;

        let drained = poll_until(
            self.config.detach_poll_attempts,
            self.config.detach_poll_interval,
            || async {
                match self.ca.describe(&cert.id).await {
                    Ok(current) if current.in_use_by.is_empty() => Some(()),
                    Ok(current) => {
                        debug!(
                            certificate = %cert.id,
                            in_use_by = ?current.in_use_by,
                            "certificate still referenced"
                        );
                        None
                    }
                    // The authority may already report it gone
                    Err(BifrostError::CertificateNotFound(_)) => Some(()),
                    Err(_) => None,
                }
            },
        )
        .await;

        if drained.is_none() {
            let waited = self.config.detach_poll_attempts as u64
                * self.config.detach_poll_interval.as_secs();
            warn!(domain = %domain, certificate = %cert.id, waited_secs = waited, "disassociation timed out");
            return Err(BifrostError::DisassociationTimeout {
                domain: domain.as_str().to_string(),
                waited_secs: waited,
            });
        }

        self.ca.delete(&cert.id).await?;
        info!(domain = %domain, certificate = %cert.id, "certificate deleted");
        Ok(DeleteOutcome::Deleted {
            certificate_id: cert.id,
        })
    }
}
