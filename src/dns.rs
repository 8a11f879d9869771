//! DNS resolution of trusted domains.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::validation::validate_ip;

/// Outcome of resolving one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub addresses: BTreeSet<IpAddr>,
    pub failure: Option<String>,
}

impl Resolution {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            addresses: BTreeSet::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Resolves hostnames to the addresses to admit.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host`. Never fails; an unresolvable host yields no addresses.
    async fn resolve(&self, host: &str) -> Resolution;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.resolve_timeout_secs))
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Resolution {
        let owned = host.to_string();
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&owned));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(addrs))) => {
                let addresses = sanitize_addresses(addrs);
                debug!("{} resolved to {:?}", host, addresses);
                Resolution {
                    addresses,
                    failure: None,
                }
            }
            Ok(Ok(Err(e))) => Resolution::failed(format!("resolution failed: {}", e)),
            Ok(Err(e)) => Resolution::failed(format!("resolver task failed: {}", e)),
            Err(_) => Resolution::failed(format!(
                "resolution timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

/// Deduplicate resolver output and drop anything unusable as a source.
///
/// Each address is re-parsed from its textual form, and unspecified
/// addresses (sinkhole answers) are dropped.
pub fn sanitize_addresses<I>(addrs: I) -> BTreeSet<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs
        .into_iter()
        .filter_map(|addr| validate_ip(&addr.to_string()).ok())
        .filter(|addr| !addr.is_unspecified())
        .collect()
}
