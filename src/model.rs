use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the certificate authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertStatus {
    PendingValidation,
    Issued,
    #[serde(other)]
    Other,
}

/// The DNS record a customer must publish to prove domain control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

/// A certificate as the issuing service reports it. Never cached: every
/// operation re-queries the authority for current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub domain: String,
    pub status: CertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_record: Option<ValidationRecord>,
    /// Listener/resource identifiers still referencing this certificate.
    #[serde(default)]
    pub in_use_by: Vec<String>,
}

/// A host-header routing rule on a listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    /// Host-header match values, e.g. `example.com` and `www.example.com`.
    pub host_headers: Vec<String>,
    pub target: String,
    pub priority: u32,
}

impl RoutingRule {
    pub fn matches_host(&self, host: &str) -> bool {
        self.host_headers.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_host_match_is_case_insensitive() {
        let rule = RoutingRule {
            id: "rule-1".into(),
            host_headers: vec!["example.com".into(), "www.example.com".into()],
            target: "tg-1".into(),
            priority: 1,
        };
        assert!(rule.matches_host("Example.COM"));
        assert!(rule.matches_host("www.example.com"));
        assert!(!rule.matches_host("other.example.com"));
    }

    #[test]
    fn cert_status_deserializes_unknown_as_other() {
        let s: CertStatus = serde_json::from_str("\"REVOKED\"").unwrap();
        assert_eq!(s, CertStatus::Other);
        let s: CertStatus = serde_json::from_str("\"PENDING_VALIDATION\"").unwrap();
        assert_eq!(s, CertStatus::PendingValidation);
    }
}
