//! Persistence of the last successfully applied trusted-source set.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::trust_set::TrustedSourceSet;
use crate::validation::{validate_ip, validate_ip_or_cidr};

/// On-disk shape of the cache file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CacheFile {
    #[serde(alias = "cloudflare_ipv4")]
    bulk_ipv4: Vec<String>,
    #[serde(alias = "cloudflare_ipv6")]
    bulk_ipv6: Vec<String>,
    custom_domains: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<&TrustedSourceSet> for CacheFile {
    fn from(set: &TrustedSourceSet) -> Self {
        Self {
            bulk_ipv4: set.bulk_v4.iter().map(ToString::to_string).collect(),
            bulk_ipv6: set.bulk_v6.iter().map(ToString::to_string).collect(),
            custom_domains: set
                .domains
                .iter()
                .map(|(domain, addrs)| {
                    (domain.clone(), addrs.iter().map(ToString::to_string).collect())
                })
                .collect(),
            updated_at: Some(Utc::now()),
        }
    }
}

impl CacheFile {
    /// Convert to a set, dropping entries that no longer parse.
    fn into_set(self) -> TrustedSourceSet {
        let mut dropped = 0usize;

        let mut networks = |entries: Vec<String>| {
            entries
                .iter()
                .filter_map(|entry| match validate_ip_or_cidr(entry) {
                    Ok(net) => Some(net),
                    Err(_) => {
                        dropped += 1;
                        None
                    }
                })
                .collect::<BTreeSet<_>>()
        };
        let bulk_v4 = networks(self.bulk_ipv4);
        let bulk_v6 = networks(self.bulk_ipv6);

        let domains = self
            .custom_domains
            .into_iter()
            .map(|(domain, addrs)| {
                let parsed = addrs
                    .iter()
                    .filter_map(|addr| match validate_ip(addr) {
                        Ok(ip) => Some(ip),
                        Err(_) => {
                            dropped += 1;
                            None
                        }
                    })
                    .collect::<BTreeSet<_>>();
                (domain, parsed)
            })
            .collect();

        if dropped > 0 {
            warn!("Dropped {} unparseable entries from IP cache", dropped);
        }

        TrustedSourceSet {
            bulk_v4,
            bulk_v6,
            domains,
        }
    }
}

/// Result of loading the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLoad {
    /// The cache was read
    Loaded(TrustedSourceSet),
    /// No cache yet (first run)
    Missing,
    /// The cache could not be read or parsed; treat as empty
    Corrupt(String),
}

impl CacheLoad {
    /// The previous set, empty unless the cache was read.
    pub fn into_set(self) -> TrustedSourceSet {
        match self {
            CacheLoad::Loaded(set) => set,
            CacheLoad::Missing | CacheLoad::Corrupt(_) => TrustedSourceSet::default(),
        }
    }
}

/// JSON file holding the last applied trusted-source set.
#[derive(Debug, Clone)]
pub struct TrustSetCache {
    path: PathBuf,
}

impl TrustSetCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous set. Never fails: problems come back as
    /// [`CacheLoad::Corrupt`].
    pub fn load(&self) -> CacheLoad {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheLoad::Missing,
            Err(e) => return CacheLoad::Corrupt(format!("{}: {}", self.path.display(), e)),
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) => CacheLoad::Loaded(file.into_set()),
            Err(e) => CacheLoad::Corrupt(format!("{}: {}", self.path.display(), e)),
        }
    }

    /// Replace the cache with `set` atomically (tempfile + rename).
    pub fn save(&self, set: &TrustedSourceSet) -> Result<()> {
        let content = serde_json::to_string_pretty(&CacheFile::from(set))
            .context("Failed to serialize IP cache")?;

        let parent_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", parent_dir))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for IP cache")?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(&self.path)
            .with_context(|| format!("Failed to persist IP cache: {:?}", self.path))?;

        Ok(())
    }
}

/// Whether `current` differs from `previous`.
///
/// Bulk buckets compare as sets. Domains are driven by `current`: each of
/// its domains must map to the same addresses in `previous`, where a
/// missing domain counts as resolving to nothing. Domains only present in
/// `previous` are ignored.
pub fn changed(previous: &TrustedSourceSet, current: &TrustedSourceSet) -> bool {
    if previous.bulk_v4 != current.bulk_v4 || previous.bulk_v6 != current.bulk_v6 {
        return true;
    }

    let nothing = BTreeSet::new();
    current
        .domains
        .iter()
        .any(|(domain, addrs)| previous.domains.get(domain).unwrap_or(&nothing) != addrs)
}
