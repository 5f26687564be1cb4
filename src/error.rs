use thiserror::Error;

/// Unified error type for the Bifrost onboarding orchestrator.
#[derive(Debug, Clone, Error)]
pub enum BifrostError {
    // Configuration errors: surfaced immediately, never retried
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("Invalid resolver endpoint: {0}")]
    InvalidResolverEndpoint(String),
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("Invalid retry count: {0}")]
    InvalidRetryCount(String),
    #[error("Invalid control plane URL: {0}")]
    InvalidControlPlaneUrl(String),
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),
    #[error("Configuration parse error: {0}")]
    ConfigParseError(String),
    #[error("No valid expected addresses configured")]
    NoExpectedAddresses,

    // Transient network errors: retried internally up to a bounded limit
    #[error("DNS query failed: {0}")]
    Dns(String),
    #[error("Operation timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Http(String),

    // External control plane rejected a request for a reason other than
    // "already exists" / "already absent"
    #[error("Control plane error ({code}): {message}")]
    ExternalService { code: String, message: String },

    // Certificate lifecycle
    #[error("Certificate not found for domain: {0}")]
    CertificateNotFound(String),
    #[error("Validation record for {0} not yet available, retry later")]
    ValidationRecordPending(String),
    #[error("Certificate for {domain} still in use after {waited_secs}s, retry later")]
    DisassociationTimeout { domain: String, waited_secs: u64 },
}

impl BifrostError {
    /// Whether a later retry of the same call can be expected to succeed
    /// without the caller changing its input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BifrostError::Dns(_)
                | BifrostError::Timeout
                | BifrostError::Http(_)
                | BifrostError::ValidationRecordPending(_)
                | BifrostError::DisassociationTimeout { .. }
        )
    }
}

impl From<reqwest::Error> for BifrostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BifrostError::Timeout
        } else {
            BifrostError::Http(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, BifrostError>;
