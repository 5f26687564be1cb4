use crate::error::{BifrostError, Result};
use crate::model::RoutingRule;
use crate::traits::RoutingControlPlane;
use crate::validation::Domain;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates and removes host-header routing rules on the configured
/// listener, idempotently.
///
/// State is never held here: every call re-reads the listener's rules from
/// the control plane (read-then-act), with the plane's uniqueness checks
/// arbitrating concurrent creators.
pub struct RuleManager {
    plane: Arc<dyn RoutingControlPlane>,
    listener_id: String,
}

impl RuleManager {
    pub fn new(plane: Arc<dyn RoutingControlPlane>, listener_id: String) -> Self {
        Self { plane, listener_id }
    }

    pub fn listener_id(&self) -> &str {
        &self.listener_id
    }

    /// Ensure a rule forwarding `domain` (and its `www.` variant) to
    /// `target` exists. An existing rule for the host is returned unchanged.
    pub async fn ensure_rule(&self, domain: &Domain, target: &str) -> Result<RoutingRule> {
        let rules = self.plane.list_rules(&self.listener_id).await?;

        if let Some(existing) = rules.iter().find(|r| r.matches_host(domain.as_str())) {
            debug!(domain = %domain, rule = %existing.id, "routing rule already exists");
            return Ok(existing.clone());
        }

        let priority = next_priority(&rules);
        let hosts = vec![domain.as_str().to_string(), domain.www_variant()];

        match self
            .plane
            .create_rule(&self.listener_id, &hosts, target, priority)
            .await
        {
            Ok(rule) => {
                info!(domain = %domain, rule = %rule.id, priority, "routing rule created");
                Ok(rule)
            }
            // Two concurrent calls can both observe "no rule" and race to
            // create; the control plane's uniqueness check is the arbiter,
            // and losing that race means the rule now exists
            Err(BifrostError::ExternalService { code, .. })
                if code == "DuplicateRule" || code == "PriorityInUse" =>
            {
                let rules = self.plane.list_rules(&self.listener_id).await?;
                rules
                    .into_iter()
                    .find(|r| r.matches_host(domain.as_str()))
                    .ok_or(BifrostError::ExternalService {
                        code,
                        message: format!("rule for {domain} rejected but not present"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every rule whose host-header condition includes `domain`.
    /// Nothing to delete is success.
    pub async fn remove_rules_for(&self, domain: &Domain) -> Result<Vec<RoutingRule>> {
        let rules = self.plane.list_rules(&self.listener_id).await?;
        let mut removed = vec![];

        for rule in rules {
            if rule.matches_host(domain.as_str()) {
                self.plane.delete_rule(&self.listener_id, &rule.id).await?;
                info!(domain = %domain, rule = %rule.id, "routing rule removed");
                removed.push(rule);
            }
        }

        if removed.is_empty() {
            debug!(domain = %domain, "no routing rules to remove");
        }
        Ok(removed)
    }

    /// Domains currently routed on the listener, one entry per rule.
    pub async fn list_domains(&self) -> Result<Vec<String>> {
        let rules = self.plane.list_rules(&self.listener_id).await?;
        Ok(rules
            .into_iter()
            .filter_map(|r| r.host_headers.into_iter().next())
            .collect())
    }
}

/// Next free priority: max existing + 1, starting at 1 on an empty listener.
fn next_priority(rules: &[RoutingRule]) -> u32 {
    rules.iter().map(|r| r.priority).max().unwrap_or(0) + 1
}
