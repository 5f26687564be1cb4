use crate::error::{BifrostError, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::{debug, warn};

/// An IPv4 network in CIDR notation with proper containment arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: u32,
    prefix: u8,
}

impl Cidr {
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        };
        (u32::from(addr) & mask) == (self.network & mask)
    }
}

impl FromStr for Cidr {
    type Err = BifrostError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr_str, prefix_str) = s
            .split_once('/')
            .ok_or_else(|| BifrostError::ConfigParseError(format!("Invalid CIDR: {s}")))?;
        let addr = Ipv4Addr::from_str(addr_str)
            .map_err(|_| BifrostError::ConfigParseError(format!("Invalid CIDR: {s}")))?;
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| BifrostError::ConfigParseError(format!("Invalid CIDR: {s}")))?;
        if prefix > 32 {
            return Err(BifrostError::ConfigParseError(format!("Invalid CIDR: {s}")));
        }
        Ok(Cidr {
            network: u32::from(addr),
            prefix,
        })
    }
}

/// Last-known-good Cloudflare IPv4 ranges, used when the live endpoint is
/// unreachable so verification degrades instead of failing outright.
const FALLBACK_V4: &[&str] = &[
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "103.31.4.0/22",
    "141.101.64.0/18",
    "108.162.192.0/18",
    "190.93.240.0/20",
    "188.114.96.0/20",
    "197.234.240.0/22",
    "198.41.128.0/17",
    "162.158.0.0/15",
    "104.16.0.0/13",
    "104.24.0.0/14",
    "172.64.0.0/13",
    "131.0.72.0/22",
];

/// The CDN's published IP ranges, valid for the lifetime of one
/// verification call.
#[derive(Debug, Clone)]
pub struct CdnRanges {
    pub ipv4: Vec<Cidr>,
    pub ipv6: Vec<String>,
}

impl CdnRanges {
    pub fn fallback() -> Self {
        let ipv4 = FALLBACK_V4
            .iter()
            .map(|s| s.parse().expect("fallback CIDR list is well-formed"))
            .collect();
        Self { ipv4, ipv6: vec![] }
    }

    pub fn contains_v4(&self, addr: Ipv4Addr) -> bool {
        self.ipv4.iter().any(|cidr| cidr.contains(addr))
    }
}

#[derive(Debug, Deserialize)]
struct CdnIpsResponse {
    #[serde(default)]
    result: CdnIpsResult,
}

#[derive(Debug, Default, Deserialize)]
struct CdnIpsResult {
    #[serde(default)]
    ipv4_cidrs: Vec<String>,
    #[serde(default)]
    ipv6_cidrs: Vec<String>,
}

/// Fetches the CDN's published ranges from its public endpoint.
pub struct CdnRangeClient {
    http: reqwest::Client,
    url: String,
}

impl CdnRangeClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    /// Fetch current ranges. Never fails: any fetch or parse problem falls
    /// back to the compiled-in list, since a stale range set is acceptable.
    pub async fn get_ranges(&self) -> CdnRanges {
        match self.fetch().await {
            Ok(ranges) if !ranges.ipv4.is_empty() => ranges,
            Ok(_) => {
                warn!("CDN range endpoint returned no IPv4 ranges, using fallback");
                CdnRanges::fallback()
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch CDN IP ranges, using fallback");
                CdnRanges::fallback()
            }
        }
    }

    async fn fetch(&self) -> Result<CdnRanges> {
        debug!(url = %self.url, "fetching CDN IP ranges");
        let response = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()
            .map_err(BifrostError::from)?;
        let body: CdnIpsResponse = response.json().await?;

        let mut ipv4 = Vec::with_capacity(body.result.ipv4_cidrs.len());
        for cidr in &body.result.ipv4_cidrs {
            match cidr.parse::<Cidr>() {
                Ok(parsed) => ipv4.push(parsed),
                Err(_) => warn!(cidr = %cidr, "skipping malformed CDN range"),
            }
        }

        Ok(CdnRanges {
            ipv4,
            ipv6: body.result.ipv6_cidrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_containment_is_range_arithmetic_not_prefix_match() {
        let cidr: Cidr = "104.16.0.0/13".parse().unwrap();
        assert!(cidr.contains(Ipv4Addr::new(104, 16, 0, 1)));
        assert!(cidr.contains(Ipv4Addr::new(104, 23, 255, 255)));
        assert!(!cidr.contains(Ipv4Addr::new(104, 24, 0, 0)));
        // String-prefix matching would accept this one
        assert!(!cidr.contains(Ipv4Addr::new(10, 41, 6, 0)));
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let cidr: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(cidr.contains(Ipv4Addr::new(203, 0, 113, 10)));
    }

    #[test]
    fn host_route_matches_only_itself() {
        let cidr: Cidr = "203.0.113.10/32".parse().unwrap();
        assert!(cidr.contains(Ipv4Addr::new(203, 0, 113, 10)));
        assert!(!cidr.contains(Ipv4Addr::new(203, 0, 113, 11)));
    }

    #[test]
    fn rejects_malformed_cidrs() {
        assert!("104.16.0.0".parse::<Cidr>().is_err());
        assert!("104.16.0.0/33".parse::<Cidr>().is_err());
        assert!("not/24".parse::<Cidr>().is_err());
    }

    #[test]
    fn fallback_list_parses_and_covers_known_edges() {
        let ranges = CdnRanges::fallback();
        assert_eq!(ranges.ipv4.len(), FALLBACK_V4.len());
        assert!(ranges.contains_v4(Ipv4Addr::new(104, 16, 132, 229)));
        assert!(ranges.contains_v4(Ipv4Addr::new(172, 67, 68, 228)));
        assert!(!ranges.contains_v4(Ipv4Addr::new(203, 0, 113, 10)));
    }

    #[test]
    fn ips_response_tolerates_missing_fields() {
        let body: CdnIpsResponse = serde_json::from_str("{}").unwrap();
        assert!(body.result.ipv4_cidrs.is_empty());
        let body: CdnIpsResponse =
            serde_json::from_str(r#"{"result":{"ipv4_cidrs":["1.2.3.0/24"]}}"#).unwrap();
        assert_eq!(body.result.ipv4_cidrs.len(), 1);
    }
}
