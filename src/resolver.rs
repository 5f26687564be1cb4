use crate::error::Result;
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, trace};

/// Record types the verification engine queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Ns,
    Cname,
}

impl RecordKind {
    fn record_type(self) -> RecordType {
        match self {
            RecordKind::A => RecordType::A,
            RecordKind::Ns => RecordType::NS,
            RecordKind::Cname => RecordType::CNAME,
        }
    }
}

/// DNS read access, behind a trait so verification logic can be exercised
/// against scripted answers.
///
/// The resolver endpoint is an explicit argument on every call: there is no
/// process-wide resolver whose server list gets toggled mid-workflow, so
/// concurrent verifications cannot interfere with each other.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Resolve `name` at `endpoint`. Timeout and NXDOMAIN yield an empty
    /// record list, not an error; only malfunctions beyond "no data" fail.
    async fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        endpoint: IpAddr,
    ) -> Result<Vec<String>>;
}

/// Live resolver client over UDP with a bounded per-query timeout.
#[derive(Debug, Clone)]
pub struct ResolverClient {
    timeout: Duration,
}

impl ResolverClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_resolver(&self, endpoint: IpAddr) -> TokioResolver {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(
            SocketAddr::new(endpoint, 53),
            Protocol::Udp,
        ));

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        // Answers must reflect live DNS state on every call
        opts.cache_size = 0;

        Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build()
    }
}

#[async_trait]
impl DnsLookup for ResolverClient {
    async fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        endpoint: IpAddr,
    ) -> Result<Vec<String>> {
        let resolver = self.build_resolver(endpoint);

        match resolver.lookup(name, kind.record_type()).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup
                    .iter()
                    // Only keep answers of the queried type: a CNAME chain in
                    // an A answer must not masquerade as an address
                    .filter(|rdata| rdata.record_type() == kind.record_type())
                    .map(|rdata| rdata.to_string().trim_end_matches('.').to_string())
                    .collect();
                trace!(name, ?kind, %endpoint, count = records.len(), "resolved");
                Ok(records)
            }
            Err(e) => {
                // NXDOMAIN, empty answers, and timeouts all degrade to "no
                // records" so the caller's retry budget absorbs propagation
                // delay instead of aborting the verification.
                debug!(name, ?kind, %endpoint, error = %e, "lookup yielded no records");
                Ok(vec![])
            }
        }
    }
}
