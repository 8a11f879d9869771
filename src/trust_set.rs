//! The trusted-source set: the unit of comparison, compilation and caching.

use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Networks and addresses currently admitted on the HTTPS port.
///
/// Ordered collections keep iteration, and therefore the compiled policy,
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedSourceSet {
    pub bulk_v4: BTreeSet<IpNet>,
    pub bulk_v6: BTreeSet<IpNet>,
    /// Every configured domain, including ones that resolved to nothing
    pub domains: BTreeMap<String, BTreeSet<IpAddr>>,
}

impl TrustedSourceSet {
    /// True when no source contributes a single allow entry.
    pub fn admits_nothing(&self) -> bool {
        self.bulk_v4.is_empty()
            && self.bulk_v6.is_empty()
            && self.domains.values().all(BTreeSet::is_empty)
    }

    /// Number of allow entries the set will render to.
    pub fn entry_count(&self) -> usize {
        self.bulk_v4.len()
            + self.bulk_v6.len()
            + self.domains.values().map(BTreeSet::len).sum::<usize>()
    }

    /// Domains that currently resolve to nothing.
    pub fn unresolved_domains(&self) -> impl Iterator<Item = &str> {
        self.domains
            .iter()
            .filter(|(_, addrs)| addrs.is_empty())
            .map(|(domain, _)| domain.as_str())
    }
}
