use crate::cdn::{CdnRangeClient, CdnRanges};
use crate::config::OnboardingConfig;
use crate::error::{BifrostError, Result};
use crate::provider::{DnsProvider, ProviderFingerprint};
use crate::resolver::{DnsLookup, RecordKind};
use crate::retry::verification_delays;
use crate::validation::Domain;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one verification attempt. Produced fresh per call, never
/// persisted: each check recomputes from live DNS state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationVerdict {
    Matched,
    NotMatched {
        reason: String,
        /// Last-observed A records, for diagnostics
        observed: Vec<String>,
    },
    /// The domain sits behind the Cloudflare proxy; the certificate's SNI
    /// binding cannot be validated until the proxy is disabled.
    ProxiedNeedsDisable,
    ConfigError(String),
}

impl VerificationVerdict {
    fn not_matched(reason: &str, observed: Vec<String>) -> Self {
        VerificationVerdict::NotMatched {
            reason: reason.to_string(),
            observed,
        }
    }
}

/// Decides whether a domain currently resolves to the service's expected
/// addresses, tolerating propagation delay, multiple resolvers, CDN
/// proxying, and provider quirks.
pub struct VerificationEngine {
    lookup: Arc<dyn DnsLookup>,
    fingerprint: ProviderFingerprint,
    cdn: CdnRangeClient,
    config: OnboardingConfig,
}

/// Verdict plus the provider context the caller reports.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub verdict: VerificationVerdict,
    pub provider: DnsProvider,
}

impl VerificationEngine {
    pub fn new(
        lookup: Arc<dyn DnsLookup>,
        cdn: CdnRangeClient,
        config: OnboardingConfig,
    ) -> Self {
        let fingerprint = ProviderFingerprint::new(lookup.clone(), config.resolvers.clone());
        Self {
            lookup,
            fingerprint,
            cdn,
            config,
        }
    }

    pub async fn verify(
        &self,
        domain: &Domain,
        expected: &[Ipv4Addr],
    ) -> Result<VerificationReport> {
        // Configs built directly, bypassing validate(), must still not be
        // able to reach the resolver indexing below
        if self.config.resolvers.is_empty() {
            return Err(BifrostError::InvalidResolverEndpoint(
                "resolver list must not be empty".to_string(),
            ));
        }

        if expected.is_empty() {
            return Ok(VerificationReport {
                verdict: VerificationVerdict::ConfigError(
                    "no valid expected addresses configured".to_string(),
                ),
                provider: DnsProvider::Unknown,
            });
        }

        if self.config.force_dns_success {
            info!(domain = %domain, "force-success override set, skipping DNS verification");
            return Ok(VerificationReport {
                verdict: VerificationVerdict::Matched,
                provider: DnsProvider::Unknown,
            });
        }

        // Independent reads, fetched concurrently; neither changes the
        // other's outcome
        let (provider, ranges) =
            tokio::join!(self.fingerprint.identify(domain), self.cdn.get_ranges());
        let provider = provider?;
        info!(domain = %domain, provider = %provider, "DNS provider identified");

        if provider == DnsProvider::Cloudflare
            && self.cloudflare_proxied(domain, &ranges).await?
        {
            warn!(domain = %domain, "domain is behind the Cloudflare proxy");
            return Ok(VerificationReport {
                verdict: VerificationVerdict::ProxiedNeedsDisable,
                provider,
            });
        }

        let verdict = self.verify_a_records(domain, expected, &ranges).await?;
        Ok(VerificationReport { verdict, provider })
    }

    /// A Cloudflare-hosted domain is proxied when any of its A records falls
    /// inside the CDN's published IPv4 ranges.
    async fn cloudflare_proxied(&self, domain: &Domain, ranges: &CdnRanges) -> Result<bool> {
        let endpoint = self.config.resolvers[0];
        let records = self
            .lookup
            .resolve(domain.as_str(), RecordKind::A, endpoint)
            .await?;
        for record in &records {
            if let Ok(addr) = record.parse::<Ipv4Addr>() {
                if ranges.contains_v4(addr) {
                    debug!(domain = %domain, address = %addr, "A record inside CDN range");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Retry loop over the configured resolvers with exponential backoff.
    async fn verify_a_records(
        &self,
        domain: &Domain,
        expected: &[Ipv4Addr],
        ranges: &CdnRanges,
    ) -> Result<VerificationVerdict> {
        let attempts = self.config.dns_retries.max(1);
        let mut delays = verification_delays(self.config.dns_backoff_base, attempts).into_iter();
        let expected_strs: Vec<String> = expected.iter().map(|ip| ip.to_string()).collect();

        for attempt in 0..attempts {
            if attempt > 0 {
                if let Some(delay) = delays.next() {
                    debug!(domain = %domain, attempt, delay_secs = delay.as_secs(), "retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
            let last_attempt = attempt + 1 == attempts;
            // Round-robin across the resolver list so one lagging resolver
            // cannot starve the whole verification
            let endpoint: IpAddr =
                self.config.resolvers[attempt as usize % self.config.resolvers.len()];

            let a_records = self
                .lookup
                .resolve(domain.as_str(), RecordKind::A, endpoint)
                .await?;

            if a_records.is_empty() {
                let cnames = self
                    .lookup
                    .resolve(domain.as_str(), RecordKind::Cname, endpoint)
                    .await?;
                if !cnames.is_empty() {
                    // Provider quirk: some hosts publish the literal target
                    // address as a CNAME
                    if cnames.iter().any(|c| expected_strs.contains(c)) {
                        info!(domain = %domain, "CNAME target matches an expected address");
                        return Ok(VerificationVerdict::Matched);
                    }
                    if last_attempt {
                        return Ok(VerificationVerdict::not_matched(
                            "cname points elsewhere",
                            cnames,
                        ));
                    }
                    debug!(domain = %domain, attempt, "CNAME present, records may still be propagating");
                    continue;
                }
                if last_attempt {
                    return Ok(VerificationVerdict::not_matched("no records", vec![]));
                }
                debug!(domain = %domain, attempt, %endpoint, "no A or CNAME records yet");
                continue;
            }

            debug!(domain = %domain, resolved = ?a_records, "resolved A records");

            let addrs: Vec<Ipv4Addr> = a_records
                .iter()
                .filter_map(|r| r.parse::<Ipv4Addr>().ok())
                .collect();

            if addrs.iter().any(|a| expected.contains(a)) {
                info!(domain = %domain, "domain points at an expected address");
                return Ok(VerificationVerdict::Matched);
            }

            // Being fronted by a recognized CDN edge is acceptable: the edge
            // owns the visible A records while the origin stays expected
            if self.config.treat_cdn_as_match && addrs.iter().any(|a| ranges.contains_v4(*a)) {
                info!(domain = %domain, "domain resolves into the configured CDN ranges");
                return Ok(VerificationVerdict::Matched);
            }

            if last_attempt {
                warn!(domain = %domain, observed = ?a_records, expected = ?expected_strs, "addresses differ from expected");
                return Ok(VerificationVerdict::not_matched(
                    "addresses differ from expected",
                    a_records,
                ));
            }
        }

        // attempts >= 1, so the loop always returns on its last pass
        Ok(VerificationVerdict::not_matched("no records", vec![]))
    }
}
