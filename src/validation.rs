use crate::error::{BifrostError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A fully-qualified customer domain, validated at construction.
///
/// Invariant: dot-separated labels of 1-63 alphanumerics/hyphens with no
/// leading or trailing hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim().trim_end_matches('.');
        if name.is_empty() || name.len() > 253 {
            return Err(BifrostError::InvalidDomainName(name.to_string()));
        }
        for label in name.split('.') {
            if !valid_label(label) {
                return Err(BifrostError::InvalidDomainName(name.to_string()));
            }
        }
        Ok(Domain(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last two labels, used for authoritative-nameserver lookup.
    pub fn base_domain(&self) -> &str {
        let mut dots = self.0.rmatch_indices('.');
        dots.next();
        match dots.next() {
            Some((idx, _)) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// The `www.` variant that routing rules match alongside the apex.
    pub fn www_variant(&self) -> String {
        format!("www.{}", self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = BifrostError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::new(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = BifrostError;

    fn try_from(s: String) -> Result<Self> {
        Domain::new(&s)
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> String {
        d.0
    }
}

fn valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Parse a strict dotted-quad IPv4 literal.
///
/// `Ipv4Addr::from_str` already rejects anything that is not four decimal
/// octets, which is the grammar the expected-address set requires.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    let s = s.trim();
    Ipv4Addr::from_str(s).map_err(|_| BifrostError::InvalidAddress(s.to_string()))
}
