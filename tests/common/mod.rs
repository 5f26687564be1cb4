//! Shared fakes for integration tests: scripted DNS answers plus in-memory
//! certificate-authority and routing-plane implementations.
#![allow(dead_code)]

use async_trait::async_trait;
use bifrost::error::{BifrostError, Result};
use bifrost::model::{CertStatus, Certificate, RoutingRule, ValidationRecord};
use bifrost::resolver::{DnsLookup, RecordKind};
use bifrost::traits::{CertificateAuthority, RoutingControlPlane};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

/// DNS lookup that replays scripted answers per (name, record kind).
/// Successive calls consume successive answers; the last one repeats.
#[derive(Default)]
pub struct ScriptedDns {
    answers: Mutex<HashMap<(String, RecordKind), (usize, Vec<Vec<String>>)>>,
    pub calls: Mutex<Vec<(String, RecordKind)>>,
}

impl ScriptedDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same answer on every call.
    pub fn with_answer(self, name: &str, kind: RecordKind, records: &[&str]) -> Self {
        self.with_sequence(name, kind, &[records])
    }

    /// One answer per call, the last repeating once exhausted.
    pub fn with_sequence(self, name: &str, kind: RecordKind, sequence: &[&[&str]]) -> Self {
        let scripted: Vec<Vec<String>> = sequence
            .iter()
            .map(|records| records.iter().map(|s| s.to_string()).collect())
            .collect();
        self.answers
            .lock()
            .unwrap()
            .insert((name.to_string(), kind), (0, scripted));
        self
    }

    pub fn call_count(&self, name: &str, kind: RecordKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, k)| n == name && *k == kind)
            .count()
    }
}

#[async_trait]
impl DnsLookup for ScriptedDns {
    async fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        _endpoint: IpAddr,
    ) -> Result<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), kind));

        let mut answers = self.answers.lock().unwrap();
        match answers.get_mut(&(name.to_string(), kind)) {
            Some((cursor, scripted)) => {
                let index = (*cursor).min(scripted.len().saturating_sub(1));
                *cursor += 1;
                Ok(scripted.get(index).cloned().unwrap_or_default())
            }
            None => Ok(vec![]),
        }
    }
}

#[derive(Default)]
struct CaState {
    certs: HashMap<String, Certificate>,
    next_id: u32,
    request_calls: u32,
    describe_calls: u32,
    last_contact: Option<String>,
}

/// In-memory certificate authority. New certificates start pending with a
/// populated validation record; tests flip state through the helpers.
#[derive(Default)]
pub struct InMemoryCa {
    state: Mutex<CaState>,
    /// Number of describe calls before the validation record appears on a
    /// freshly requested certificate (0 = immediately).
    pub record_after_describes: u32,
}

impl InMemoryCa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authority that publishes validation records only after `n` describe
    /// calls, for exercising the poll loop.
    pub fn with_record_delay(n: u32) -> Self {
        Self {
            record_after_describes: n,
            ..Self::default()
        }
    }

    pub fn insert(&self, cert: Certificate) {
        self.state.lock().unwrap().certs.insert(cert.id.clone(), cert);
    }

    pub fn issue(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(cert) = state.certs.get_mut(id) {
            cert.status = CertStatus::Issued;
        }
    }

    pub fn set_in_use(&self, id: &str, refs: &[&str]) {
        let mut state = self.state.lock().unwrap();
        if let Some(cert) = state.certs.get_mut(id) {
            cert.in_use_by = refs.iter().map(|s| s.to_string()).collect();
        }
    }

    pub fn request_calls(&self) -> u32 {
        self.state.lock().unwrap().request_calls
    }

    /// Contact email the last request call carried.
    pub fn last_contact(&self) -> Option<String> {
        self.state.lock().unwrap().last_contact.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().certs.contains_key(id)
    }

    pub fn cert_count(&self) -> usize {
        self.state.lock().unwrap().certs.len()
    }
}

pub fn pending_record(domain: &str) -> ValidationRecord {
    ValidationRecord {
        name: format!("_validate.{domain}"),
        record_type: "CNAME".to_string(),
        value: format!("{domain}.validations.ca.example"),
    }
}

#[async_trait]
impl CertificateAuthority for InMemoryCa {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Certificate>> {
        let state = self.state.lock().unwrap();
        Ok(state.certs.values().find(|c| c.domain == domain).cloned())
    }

    async fn describe(&self, id: &str) -> Result<Certificate> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        let describe_calls = state.describe_calls;
        let record_due = describe_calls > self.record_after_describes;
        match state.certs.get_mut(id) {
            Some(cert) => {
                if cert.validation_record.is_none()
                    && cert.status == CertStatus::PendingValidation
                    && record_due
                {
                    cert.validation_record = Some(pending_record(&cert.domain));
                }
                Ok(cert.clone())
            }
            None => Err(BifrostError::CertificateNotFound(id.to_string())),
        }
    }

    async fn request(
        &self,
        domain: &str,
        _alt_names: &[String],
        contact_email: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.request_calls += 1;
        state.last_contact = Some(contact_email.to_string());
        state.next_id += 1;
        let id = format!("cert-{}", state.next_id);
        state.certs.insert(
            id.clone(),
            Certificate {
                id: id.clone(),
                domain: domain.to_string(),
                status: CertStatus::PendingValidation,
                validation_record: None,
                in_use_by: vec![],
            },
        );
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().certs.remove(id);
        Ok(())
    }
}

#[derive(Default)]
struct PlaneState {
    rules: Vec<RoutingRule>,
    attached: Vec<String>,
    next_id: u32,
}

/// In-memory routing control plane with per-listener rule uniqueness on
/// priority, mirroring the real plane's arbitration of creation races.
pub struct InMemoryPlane {
    state: Mutex<PlaneState>,
    pub endpoint: String,
    /// When set, the next create is rejected as a priority conflict after a
    /// simulated competitor wins the race with the same hosts.
    pub lose_next_create_race: Mutex<bool>,
}

impl Default for InMemoryPlane {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            endpoint: "edge.service.example".to_string(),
            lose_next_create_race: Mutex::new(false),
        }
    }
}

impl InMemoryPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_rule(&self, host: &str, priority: u32) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("rule-{}", state.next_id);
        state.rules.push(RoutingRule {
            id,
            host_headers: vec![host.to_string(), format!("www.{host}")],
            target: "tg-default".to_string(),
            priority,
        });
    }

    pub fn rule_count(&self) -> usize {
        self.state.lock().unwrap().rules.len()
    }

    pub fn attached(&self) -> Vec<String> {
        self.state.lock().unwrap().attached.clone()
    }
}

#[async_trait]
impl RoutingControlPlane for InMemoryPlane {
    async fn list_rules(&self, _listener_id: &str) -> Result<Vec<RoutingRule>> {
        Ok(self.state.lock().unwrap().rules.clone())
    }

    async fn create_rule(
        &self,
        _listener_id: &str,
        host_headers: &[String],
        target: &str,
        priority: u32,
    ) -> Result<RoutingRule> {
        let mut state = self.state.lock().unwrap();
        let mut lose = self.lose_next_create_race.lock().unwrap();
        if *lose {
            *lose = false;
            state.next_id += 1;
            let id = format!("rule-{}", state.next_id);
            state.rules.push(RoutingRule {
                id,
                host_headers: host_headers.to_vec(),
                target: target.to_string(),
                priority,
            });
            return Err(BifrostError::ExternalService {
                code: "PriorityInUse".to_string(),
                message: format!("priority {priority} already allocated"),
            });
        }
        if state.rules.iter().any(|r| r.priority == priority) {
            return Err(BifrostError::ExternalService {
                code: "PriorityInUse".to_string(),
                message: format!("priority {priority} already allocated"),
            });
        }
        state.next_id += 1;
        let rule = RoutingRule {
            id: format!("rule-{}", state.next_id),
            host_headers: host_headers.to_vec(),
            target: target.to_string(),
            priority,
        };
        state.rules.push(rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, _listener_id: &str, rule_id: &str) -> Result<()> {
        self.state.lock().unwrap().rules.retain(|r| r.id != rule_id);
        Ok(())
    }

    async fn attach_certificate(&self, _listener_id: &str, certificate_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.attached.iter().any(|c| c == certificate_id) {
            state.attached.push(certificate_id.to_string());
        }
        Ok(())
    }

    async fn detach_certificate(&self, _listener_id: &str, certificate_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .attached
            .retain(|c| c != certificate_id);
        Ok(())
    }

    async fn listener_endpoint(&self, _listener_id: &str) -> Result<String> {
        Ok(self.endpoint.clone())
    }
}
