use crate::error::Result;
use crate::resolver::{DnsLookup, RecordKind};
use crate::validation::Domain;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// DNS-hosting providers recognized by nameserver fingerprinting.
///
/// Best-effort classification: nothing downstream depends on it except the
/// Cloudflare proxy special case, and absence of data degrades to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DnsProvider {
    Route53,
    Cloudflare,
    GoDaddy,
    GoogleCloudDns,
    DnsMadeEasy,
    Namecheap,
    NetworkSolutions,
    AzureDns,
    DigitalOcean,
    Ns1,
    UltraDns,
    YahooSmallBusiness,
    Akamai,
    RackspaceCloudDns,
    OracleCloudDns,
    Unknown,
}

impl fmt::Display for DnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DnsProvider::Route53 => "Route 53",
            DnsProvider::Cloudflare => "Cloudflare",
            DnsProvider::GoDaddy => "GoDaddy",
            DnsProvider::GoogleCloudDns => "Google Cloud DNS",
            DnsProvider::DnsMadeEasy => "DNS Made Easy",
            DnsProvider::Namecheap => "Namecheap",
            DnsProvider::NetworkSolutions => "Network Solutions",
            DnsProvider::AzureDns => "Microsoft Azure DNS",
            DnsProvider::DigitalOcean => "DigitalOcean",
            DnsProvider::Ns1 => "NS1",
            DnsProvider::UltraDns => "UltraDNS",
            DnsProvider::YahooSmallBusiness => "Yahoo Small Business",
            DnsProvider::Akamai => "Akamai",
            DnsProvider::RackspaceCloudDns => "Rackspace Cloud DNS",
            DnsProvider::OracleCloudDns => "Oracle Cloud DNS",
            DnsProvider::Unknown => "Unknown provider",
        };
        f.write_str(name)
    }
}

/// Ordered substring signatures. First match wins per nameserver, so the
/// more specific substrings must precede the generic ones ("ns.digitalocean"
/// before "ns1").
const SIGNATURES: &[(&str, DnsProvider)] = &[
    ("awsdns", DnsProvider::Route53),
    ("cloudflare", DnsProvider::Cloudflare),
    ("godaddy", DnsProvider::GoDaddy),
    ("dns.google", DnsProvider::GoogleCloudDns),
    ("dnsmadeeasy", DnsProvider::DnsMadeEasy),
    ("registrar-servers", DnsProvider::Namecheap),
    ("networksolutions", DnsProvider::NetworkSolutions),
    ("azure-dns", DnsProvider::AzureDns),
    ("ns.digitalocean", DnsProvider::DigitalOcean),
    ("ns1", DnsProvider::Ns1),
    ("ultradns", DnsProvider::UltraDns),
    ("yahoo", DnsProvider::YahooSmallBusiness),
    ("akamai", DnsProvider::Akamai),
    ("rackspace", DnsProvider::RackspaceCloudDns),
    ("oraclecloud", DnsProvider::OracleCloudDns),
];

/// Classify a single nameserver host name.
pub fn classify_nameserver(ns: &str) -> DnsProvider {
    let ns = ns.to_ascii_lowercase();
    for (needle, provider) in SIGNATURES {
        if ns.contains(needle) {
            return *provider;
        }
    }
    DnsProvider::Unknown
}

/// Fingerprints a domain's DNS-hosting provider from its authoritative
/// nameservers.
pub struct ProviderFingerprint {
    lookup: Arc<dyn DnsLookup>,
    resolvers: Vec<IpAddr>,
}

impl ProviderFingerprint {
    pub fn new(lookup: Arc<dyn DnsLookup>, resolvers: Vec<IpAddr>) -> Self {
        Self { lookup, resolvers }
    }

    /// Identify the hosting provider for `domain`'s base domain.
    ///
    /// Walks the configured resolvers until one returns NS records, then
    /// scans each nameserver against the signature table; the first
    /// matching nameserver wins. Never fails: any absence of data is
    /// `Unknown`.
    pub async fn identify(&self, domain: &Domain) -> Result<DnsProvider> {
        let base = domain.base_domain();
        debug!(domain = %domain, base, "identifying DNS provider");

        let mut nameservers = vec![];
        for &endpoint in &self.resolvers {
            let records = self
                .lookup
                .resolve(base, RecordKind::Ns, endpoint)
                .await?;
            if !records.is_empty() {
                nameservers = records;
                break;
            }
        }

        for ns in &nameservers {
            let provider = classify_nameserver(ns);
            if provider != DnsProvider::Unknown {
                debug!(nameserver = %ns, provider = %provider, "provider identified");
                return Ok(provider);
            }
        }

        debug!(domain = %domain, "no signature matched, provider unknown");
        Ok(DnsProvider::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_signatures() {
        assert_eq!(
            classify_nameserver("ns-1024.awsdns-10.org"),
            DnsProvider::Route53
        );
        assert_eq!(
            classify_nameserver("ADA.NS.CLOUDFLARE.COM"),
            DnsProvider::Cloudflare
        );
        assert_eq!(
            classify_nameserver("ns73.domaincontrol.godaddy.com"),
            DnsProvider::GoDaddy
        );
        assert_eq!(
            classify_nameserver("ns-cloud-a1.dns.google"),
            DnsProvider::GoogleCloudDns
        );
        assert_eq!(
            classify_nameserver("dns1.registrar-servers.com"),
            DnsProvider::Namecheap
        );
        assert_eq!(
            classify_nameserver("ns1-01.azure-dns.com"),
            DnsProvider::AzureDns
        );
        assert_eq!(
            classify_nameserver("ns1.digitalocean.com"),
            DnsProvider::Ns1,
            "bare ns1 wins unless the digitalocean form is ns.digitalocean"
        );
        assert_eq!(
            classify_nameserver("ns.digitalocean.com"),
            DnsProvider::DigitalOcean
        );
        assert_eq!(
            classify_nameserver("pdns1.ultradns.net"),
            DnsProvider::UltraDns
        );
        assert_eq!(classify_nameserver("a1-1.akamai.net"), DnsProvider::Akamai);
    }

    #[test]
    fn unmatched_nameserver_is_unknown() {
        assert_eq!(classify_nameserver("ns.example-host.net"), DnsProvider::Unknown);
        assert_eq!(classify_nameserver(""), DnsProvider::Unknown);
    }

    #[test]
    fn specific_signatures_precede_generic_ones() {
        let ns1_pos = SIGNATURES.iter().position(|(s, _)| *s == "ns1").unwrap();
        let do_pos = SIGNATURES
            .iter()
            .position(|(s, _)| *s == "ns.digitalocean")
            .unwrap();
        assert!(do_pos < ns1_pos);
    }

    #[test]
    fn display_matches_operator_facing_names() {
        assert_eq!(DnsProvider::Route53.to_string(), "Route 53");
        assert_eq!(DnsProvider::Unknown.to_string(), "Unknown provider");
    }
}
