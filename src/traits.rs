use crate::error::Result;
use crate::model::{Certificate, RoutingRule};
use async_trait::async_trait;

/// Certificate-issuing service, consumed at its interface boundary.
///
/// The authority owns every certificate; this crate only drives lifecycle
/// transitions and re-queries current state on every operation.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Find the certificate covering `domain`, if one exists.
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Certificate>>;

    /// Current state of a certificate by identity.
    async fn describe(&self, id: &str) -> Result<Certificate>;

    /// Request a DNS-validated certificate for `domain` plus `alt_names`,
    /// with `contact_email` as the issuance contact. Returns the new
    /// certificate's identity.
    async fn request(
        &self,
        domain: &str,
        alt_names: &[String],
        contact_email: &str,
    ) -> Result<String>;

    /// Delete a certificate. Deleting an unknown id is success.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Routing/load-balancing control plane, consumed at its interface boundary.
#[async_trait]
pub trait RoutingControlPlane: Send + Sync {
    async fn list_rules(&self, listener_id: &str) -> Result<Vec<RoutingRule>>;

    async fn create_rule(
        &self,
        listener_id: &str,
        host_headers: &[String],
        target: &str,
        priority: u32,
    ) -> Result<RoutingRule>;

    /// Delete a rule. Deleting an unknown rule is success.
    async fn delete_rule(&self, listener_id: &str, rule_id: &str) -> Result<()>;

    /// Attach a certificate to the listener. Attaching twice is success.
    async fn attach_certificate(&self, listener_id: &str, certificate_id: &str) -> Result<()>;

    /// Detach a certificate from the listener. "Not attached" is success.
    async fn detach_certificate(&self, listener_id: &str, certificate_id: &str) -> Result<()>;

    /// Public endpoint (DNS name) of the listener.
    async fn listener_endpoint(&self, listener_id: &str) -> Result<String>;
}
