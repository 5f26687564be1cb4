use crate::error::{BifrostError, Result};
use crate::validation::parse_ipv4;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Late-bound configuration for one onboarding invocation.
///
/// Everything is resolved from the environment at call time rather than
/// baked into a deployed artifact, since onboarding is a multi-tenant,
/// per-call operation.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Listener on the routing control plane that carries customer traffic
    pub listener_id: String,

    /// Default forwarding target for new host-header rules
    pub target_id: String,

    /// Public endpoint customers are told to point their DNS at
    pub public_endpoint: String,

    /// A-record addresses the customer domain should resolve to
    pub expected_addresses: Vec<Ipv4Addr>,

    /// Escape hatch for providers whose DNS cannot be queried externally:
    /// verification reports Matched without touching the network
    pub force_dns_success: bool,

    /// Public resolver endpoints used for verification, consulted round-robin
    pub resolvers: Vec<IpAddr>,

    /// Per-query DNS timeout
    pub dns_timeout: Duration,

    /// Verification attempts before giving up
    pub dns_retries: u32,

    /// Base delay for exponential backoff between verification attempts
    pub dns_backoff_base: Duration,

    /// Whether an A record inside the CDN's published ranges counts as a
    /// match for a non-Cloudflare-proxied domain
    pub treat_cdn_as_match: bool,

    /// URL of the CDN's published IP-range endpoint
    pub cdn_ranges_url: String,

    /// Polling budget for validation-record metadata after a new request
    pub cert_poll_attempts: u32,
    pub cert_poll_interval: Duration,

    /// Polling budget for in-use references to drain before deletion
    pub detach_poll_attempts: u32,
    pub detach_poll_interval: Duration,

    /// Default contact email for certificate requests
    pub contact_email: String,

    /// Base URL of the certificate/routing control-plane API
    pub control_plane_url: String,

    /// Bearer token for the control-plane API, if it requires one
    pub control_plane_token: Option<String>,

    /// Timeout for control-plane and CDN-range HTTP calls
    pub http_timeout: Duration,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            listener_id: String::new(),
            target_id: String::new(),
            public_endpoint: String::new(),
            expected_addresses: vec![],
            force_dns_success: false,
            resolvers: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
            ],
            dns_timeout: Duration::from_secs(30),
            dns_retries: 3,
            dns_backoff_base: Duration::from_secs(2),
            treat_cdn_as_match: true,
            cdn_ranges_url: "https://api.cloudflare.com/client/v4/ips".to_string(),
            cert_poll_attempts: 10,
            cert_poll_interval: Duration::from_secs(3),
            detach_poll_attempts: 10,
            detach_poll_interval: Duration::from_secs(3),
            contact_email: String::new(),
            control_plane_url: String::new(),
            control_plane_token: None,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl OnboardingConfig {
    /// Build a configuration from `BIFROST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(listener_id) = std::env::var("BIFROST_LISTENER_ID") {
            config.listener_id = listener_id;
        }

        if let Ok(target_id) = std::env::var("BIFROST_TARGET_ID") {
            config.target_id = target_id;
        }

        if let Ok(endpoint) = std::env::var("BIFROST_PUBLIC_ENDPOINT") {
            config.public_endpoint = endpoint;
        }

        if let Ok(addrs) = std::env::var("BIFROST_EXPECTED_ADDRESSES") {
            config.expected_addresses = addrs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_ipv4)
                .collect::<Result<Vec<_>>>()?;
        }

        if let Ok(force) = std::env::var("BIFROST_FORCE_DNS_SUCCESS") {
            config.force_dns_success = parse_bool(&force, false);
        }

        if let Ok(resolvers) = std::env::var("BIFROST_DNS_RESOLVERS") {
            let parsed: Result<Vec<IpAddr>> = resolvers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>()
                        .map_err(|_| BifrostError::InvalidResolverEndpoint(s.to_string()))
                })
                .collect();
            let parsed = parsed?;
            if parsed.is_empty() {
                return Err(BifrostError::InvalidResolverEndpoint(
                    "no resolver endpoints provided".to_string(),
                ));
            }
            config.resolvers = parsed;
        }

        if let Ok(timeout) = std::env::var("BIFROST_DNS_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|_| BifrostError::InvalidTimeout(timeout.clone()))?;
            if secs == 0 {
                return Err(BifrostError::InvalidTimeout(
                    "DNS timeout must be greater than 0".to_string(),
                ));
            }
            config.dns_timeout = Duration::from_secs(secs);
        }

        if let Ok(retries) = std::env::var("BIFROST_DNS_RETRIES") {
            let n = retries
                .parse::<u32>()
                .map_err(|_| BifrostError::InvalidRetryCount(retries.clone()))?;
            config.dns_retries = n.max(1);
        }

        if let Ok(base) = std::env::var("BIFROST_DNS_BACKOFF_BASE_MS") {
            let ms = base
                .parse::<u64>()
                .map_err(|_| BifrostError::ConfigParseError(format!("Invalid backoff base: {base}")))?;
            config.dns_backoff_base = Duration::from_millis(ms);
        }

        if let Ok(lenient) = std::env::var("BIFROST_TREAT_CDN_AS_MATCH") {
            config.treat_cdn_as_match = parse_bool(&lenient, true);
        }

        if let Ok(url) = std::env::var("BIFROST_CDN_RANGES_URL") {
            if !url.is_empty() {
                config.cdn_ranges_url = url;
            }
        }

        if let Ok(attempts) = std::env::var("BIFROST_CERT_POLL_ATTEMPTS") {
            config.cert_poll_attempts = attempts.parse::<u32>().map_err(|_| {
                BifrostError::ConfigParseError(format!("Invalid cert poll attempts: {attempts}"))
            })?;
        }

        if let Ok(interval) = std::env::var("BIFROST_CERT_POLL_INTERVAL") {
            let secs = interval
                .parse::<u64>()
                .map_err(|_| BifrostError::InvalidTimeout(interval.clone()))?;
            config.cert_poll_interval = Duration::from_secs(secs);
        }

        if let Ok(attempts) = std::env::var("BIFROST_DETACH_POLL_ATTEMPTS") {
            config.detach_poll_attempts = attempts.parse::<u32>().map_err(|_| {
                BifrostError::ConfigParseError(format!("Invalid detach poll attempts: {attempts}"))
            })?;
        }

        if let Ok(interval) = std::env::var("BIFROST_DETACH_POLL_INTERVAL") {
            let secs = interval
                .parse::<u64>()
                .map_err(|_| BifrostError::InvalidTimeout(interval.clone()))?;
            config.detach_poll_interval = Duration::from_secs(secs);
        }

        if let Ok(email) = std::env::var("BIFROST_CONTACT_EMAIL") {
            config.contact_email = email;
        }

        if let Ok(url) = std::env::var("BIFROST_CONTROL_PLANE_URL") {
            config.control_plane_url = url;
        }

        if let Ok(token) = std::env::var("BIFROST_CONTROL_PLANE_TOKEN") {
            if !token.is_empty() {
                config.control_plane_token = Some(token);
            }
        }

        if let Ok(timeout) = std::env::var("BIFROST_HTTP_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|_| BifrostError::InvalidTimeout(timeout.clone()))?;
            if secs == 0 {
                return Err(BifrostError::InvalidTimeout(
                    "HTTP timeout must be greater than 0".to_string(),
                ));
            }
            config.http_timeout = Duration::from_secs(secs);
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate bounds that keep every retry loop finite.
    pub fn validate(&self) -> Result<()> {
        if self.resolvers.is_empty() {
            return Err(BifrostError::InvalidResolverEndpoint(
                "resolver list must not be empty".to_string(),
            ));
        }

        if self.dns_retries == 0 {
            return Err(BifrostError::InvalidRetryCount(
                "DNS retries must be at least 1".to_string(),
            ));
        }

        if self.dns_timeout.as_secs() > 300 {
            return Err(BifrostError::InvalidTimeout(
                "DNS timeout too large (max 300 seconds)".to_string(),
            ));
        }

        if self.cert_poll_attempts == 0 || self.detach_poll_attempts == 0 {
            return Err(BifrostError::ConfigParseError(
                "Polling attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Fail early when an action requires the control plane but none is
    /// configured.
    pub fn require_control_plane(&self) -> Result<()> {
        if self.control_plane_url.is_empty() {
            return Err(BifrostError::MissingConfig(
                "BIFROST_CONTROL_PLANE_URL".to_string(),
            ));
        }
        if self.listener_id.is_empty() {
            return Err(BifrostError::MissingConfig("BIFROST_LISTENER_ID".to_string()));
        }
        Ok(())
    }
}

/// Parse a boolean from a string, with a default value for invalid input
pub(crate) fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OnboardingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolvers.len(), 4);
        assert_eq!(config.dns_retries, 3);
        assert_eq!(config.dns_backoff_base, Duration::from_secs(2));
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let config = OnboardingConfig {
            dns_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_timeout_is_rejected() {
        let config = OnboardingConfig {
            dns_timeout: Duration::from_secs(400),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_resolver_list_is_rejected() {
        let config = OnboardingConfig {
            resolvers: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn control_plane_requirement() {
        let mut config = OnboardingConfig::default();
        assert!(config.require_control_plane().is_err());
        config.control_plane_url = "https://edge.internal".to_string();
        assert!(config.require_control_plane().is_err());
        config.listener_id = "listener-1".to_string();
        assert!(config.require_control_plane().is_ok());
    }

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("YES", false));
        assert!(parse_bool("1", false));
        assert!(!parse_bool("off", true));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("garbage", true));
        assert!(!parse_bool("garbage", false));
    }
}
