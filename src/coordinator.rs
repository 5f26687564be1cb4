use crate::certificate::{CertificateOrchestrator, DeleteOutcome, RequestOutcome};
use crate::config::OnboardingConfig;
use crate::error::{BifrostError, Result};
use crate::model::ValidationRecord;
use crate::provider::DnsProvider;
use crate::routing::RuleManager;
use crate::traits::RoutingControlPlane;
use crate::validation::Domain;
use crate::verify::{VerificationEngine, VerificationVerdict};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Sequences the certificate orchestrator, rule manager, and verification
/// engine behind the three external actions `request`, `check`, `delete`
/// (plus standalone `verify` and `list`).
pub struct Coordinator {
    certificates: CertificateOrchestrator,
    rules: RuleManager,
    verifier: VerificationEngine,
    plane: Arc<dyn RoutingControlPlane>,
    config: OnboardingConfig,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub message: String,
    pub status: CertificateState,
    pub certificate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_record: Option<ValidationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateState {
    Issued,
    PendingValidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Certificate issued, attached, and the domain already resolves to the
    /// expected addresses.
    Matched,
    /// Certificate still pending validation; retry later.
    PendingIssuance,
    /// Certificate attached but DNS not pointed yet; follow the
    /// instructions.
    InstructionsProvided,
    /// No certificate exists for the domain.
    NotFound,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub message: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// A-record targets the customer should publish
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns_targets: Vec<String>,
    #[serde(rename = "dnsProvider", skip_serializing_if = "Option::is_none")]
    pub dns_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub status: DeleteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

/// Field names mirror the operator tooling this replaces.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub message: String,
    #[serde(rename = "dnsProvider")]
    pub dns_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloudflare_proxy: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub observed: Vec<String>,
}

impl VerifyResponse {
    pub fn matched(&self) -> bool {
        self.message == "matched"
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub domains: Vec<String>,
}

impl Coordinator {
    pub fn new(
        certificates: CertificateOrchestrator,
        rules: RuleManager,
        verifier: VerificationEngine,
        plane: Arc<dyn RoutingControlPlane>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            certificates,
            rules,
            verifier,
            plane,
            config,
        }
    }

    /// Request a certificate for the domain. No routing rule is created at
    /// this stage; that happens on `check`.
    pub async fn request(&self, domain: &Domain, email: Option<&str>) -> Result<RequestResponse> {
        let contact = email.unwrap_or(&self.config.contact_email);
        info!(domain = %domain, contact, "onboarding request");

        match self.certificates.request(domain, contact).await? {
            RequestOutcome::AlreadyIssued(cert) => Ok(RequestResponse {
                message: format!("certificate for {domain} is already issued"),
                status: CertificateState::Issued,
                certificate_id: cert.id,
                validation_record: None,
                instructions: None,
            }),
            RequestOutcome::PendingValidation(cert) => {
                let instructions = cert.validation_record.as_ref().map(|record| {
                    format!(
                        "Create a DNS record of type {} with name {} and value {} \
                         to prove control of {domain}. Issuance completes once the \
                         record is visible.",
                        record.record_type, record.name, record.value
                    )
                });
                Ok(RequestResponse {
                    message: format!("certificate for {domain} is pending validation"),
                    status: CertificateState::PendingValidation,
                    certificate_id: cert.id,
                    validation_record: cert.validation_record,
                    instructions,
                })
            }
        }
    }

    /// Ensure routing is provisioned, attach the certificate once issued,
    /// and report whether the domain already points at the service.
    pub async fn check(&self, domain: &Domain) -> Result<CheckResponse> {
        self.rules.ensure_rule(domain, &self.config.target_id).await?;
        let endpoint = self.plane.listener_endpoint(self.rules.listener_id()).await?;

        let Some(cert) = self.certificates.find(domain).await? else {
            return Ok(CheckResponse {
                message: format!("no certificate found for {domain}; run request first"),
                status: CheckStatus::NotFound,
                certificate_id: None,
                endpoint: Some(endpoint),
                dns_targets: vec![],
                dns_provider: None,
                reason: None,
            });
        };

        if cert.status != crate::model::CertStatus::Issued {
            return Ok(CheckResponse {
                message: format!("certificate for {domain} is not yet issued, retry later"),
                status: CheckStatus::PendingIssuance,
                certificate_id: Some(cert.id),
                endpoint: Some(endpoint),
                dns_targets: vec![],
                dns_provider: None,
                reason: None,
            });
        }

        self.plane
            .attach_certificate(self.rules.listener_id(), &cert.id)
            .await?;

        let report = self
            .verifier
            .verify(domain, &self.config.expected_addresses)
            .await?;
        let targets: Vec<String> = self
            .config
            .expected_addresses
            .iter()
            .map(|ip| ip.to_string())
            .collect();

        let response = match report.verdict {
            VerificationVerdict::Matched => CheckResponse {
                message: format!("{domain} already points at the service"),
                status: CheckStatus::Matched,
                certificate_id: Some(cert.id),
                endpoint: Some(endpoint),
                dns_targets: vec![],
                dns_provider: Some(report.provider.to_string()),
                reason: None,
            },
            VerificationVerdict::ProxiedNeedsDisable => CheckResponse {
                message: format!(
                    "disable the Cloudflare proxy for {domain}, then create A records \
                     pointing at: {}",
                    targets.join(", ")
                ),
                status: CheckStatus::InstructionsProvided,
                certificate_id: Some(cert.id),
                endpoint: Some(endpoint),
                dns_targets: targets,
                dns_provider: Some(report.provider.to_string()),
                reason: Some("cloudflare proxy enabled".to_string()),
            },
            VerificationVerdict::NotMatched { reason, .. } => CheckResponse {
                message: format!(
                    "create A records for {domain} and www.{domain} pointing at: {}{}",
                    targets.join(", "),
                    self.publish_hint()
                ),
                status: CheckStatus::InstructionsProvided,
                certificate_id: Some(cert.id),
                endpoint: Some(endpoint),
                dns_targets: targets,
                dns_provider: Some(report.provider.to_string()),
                reason: Some(reason),
            },
            VerificationVerdict::ConfigError(_) => {
                return Err(BifrostError::NoExpectedAddresses);
            }
        };
        Ok(response)
    }

    /// Alternative to raw A records for providers that prefer aliasing.
    fn publish_hint(&self) -> String {
        if self.config.public_endpoint.is_empty() {
            String::new()
        } else {
            format!(", or a CNAME to {}", self.config.public_endpoint)
        }
    }

    /// Tear down the certificate and routing for the domain. Absence is a
    /// non-error terminal state.
    pub async fn delete(&self, domain: &Domain) -> Result<DeleteResponse> {
        match self.certificates.delete(domain, &self.rules).await? {
            DeleteOutcome::Deleted { certificate_id } => Ok(DeleteResponse {
                message: format!("domain {domain} deleted"),
                status: DeleteStatus::Deleted,
                certificate_id: Some(certificate_id),
            }),
            DeleteOutcome::AlreadyAbsent => {
                // A rule can outlive its certificate after a partial failure;
                // reconcile it here so delete stays idempotent
                self.rules.remove_rules_for(domain).await?;
                Ok(DeleteResponse {
                    message: format!("nothing to delete for {domain}"),
                    status: DeleteStatus::NotFound,
                    certificate_id: None,
                })
            }
        }
    }

    /// Standalone DNS verification with an explicit expected-address set.
    pub async fn verify(
        &self,
        domain: &Domain,
        expected: &[std::net::Ipv4Addr],
    ) -> Result<VerifyResponse> {
        let report = self.verifier.verify(domain, expected).await?;

        let cloudflare_proxy = match (&report.provider, &report.verdict) {
            (_, VerificationVerdict::ProxiedNeedsDisable) => Some("enabled".to_string()),
            (DnsProvider::Cloudflare, _) => Some("disabled".to_string()),
            _ => None,
        };

        let response = match report.verdict {
            VerificationVerdict::Matched => VerifyResponse {
                message: "matched".to_string(),
                dns_provider: report.provider.to_string(),
                reason: None,
                cloudflare_proxy,
                observed: vec![],
            },
            VerificationVerdict::NotMatched { reason, observed } => VerifyResponse {
                message: "not matched".to_string(),
                dns_provider: report.provider.to_string(),
                reason: Some(reason),
                cloudflare_proxy,
                observed,
            },
            VerificationVerdict::ProxiedNeedsDisable => VerifyResponse {
                message: "Please disable the proxy in Cloudflare to match SSL certificate"
                    .to_string(),
                dns_provider: report.provider.to_string(),
                reason: None,
                cloudflare_proxy,
                observed: vec![],
            },
            VerificationVerdict::ConfigError(_) => {
                return Err(BifrostError::NoExpectedAddresses);
            }
        };
        Ok(response)
    }

    /// Domains currently routed on the configured listener.
    pub async fn list(&self) -> Result<ListResponse> {
        Ok(ListResponse {
            domains: self.rules.list_domains().await?,
        })
    }
}
