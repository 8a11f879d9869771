//! One reconciliation run.
//!
//! ```text
//! Gathering ──► Comparing ──┬──► Skipped
//!     │                     └──► Compiling ──► Applying ──┬──► Committed
//!     └──► (no trusted source) abort                      └──► Failed
//! ```
//!
//! The previous set is loaded once at the start and never modified; it is
//! only replaced on disk after the applier reports success.

use futures::stream::{self, StreamExt};
use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tracing::info;

use crate::applier::PolicyApplier;
use crate::cache::{changed, CacheLoad, TrustSetCache};
use crate::config::Config;
use crate::dns::HostResolver;
use crate::error::ApplyFailure;
use crate::events::{Phase, RunEvent, RunLog};
use crate::fetcher::BulkSource;
use crate::policy::{compile, PolicyDocument, PolicySettings};
use crate::trust_set::TrustedSourceSet;

/// Concurrent DNS lookups per run
const MAX_CONCURRENT_LOOKUPS: usize = 8;

/// How far a run may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Apply and persist when changed (or forced)
    #[default]
    Apply,
    /// Stop after comparing; never mutates anything
    Check,
    /// Compile when an apply would happen, but do not apply or persist
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    pub force: bool,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every source came back empty; nothing was compiled
    NoTrustedSources,
    /// Check mode finished comparing
    Checked { changed: bool },
    /// Unchanged and not forced
    Skipped,
    /// Dry run produced a document
    Compiled(PolicyDocument),
    /// Applied; `cache_saved` is false if persisting the set failed
    Committed { entries: usize, cache_saved: bool },
    /// The applier failed; the cache was left alone
    Failed(ApplyFailure),
}

impl Outcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::NoTrustedSources | Outcome::Failed(_) => 1,
            _ => 0,
        }
    }
}

/// Drives a single gather → compare → compile → apply → persist run.
pub struct Reconciler<'a> {
    config: &'a Config,
    bulk: &'a dyn BulkSource,
    resolver: &'a dyn HostResolver,
    cache: &'a TrustSetCache,
    applier: &'a dyn PolicyApplier,
    log: &'a dyn RunLog,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a Config,
        bulk: &'a dyn BulkSource,
        resolver: &'a dyn HostResolver,
        cache: &'a TrustSetCache,
        applier: &'a dyn PolicyApplier,
        log: &'a dyn RunLog,
    ) -> Self {
        Self {
            config,
            bulk,
            resolver,
            cache,
            applier,
            log,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Outcome {
        self.log.record(RunEvent::PhaseEntered(Phase::Gathering));
        let previous = self.load_previous();
        let current = self.gather().await;

        let unresolved: Vec<String> = current.unresolved_domains().map(String::from).collect();
        if !unresolved.is_empty() {
            self.log.record(RunEvent::DomainsUnresolved {
                domains: unresolved,
            });
        }

        if current.admits_nothing() {
            self.log.record(RunEvent::NoTrustedSources);
            return Outcome::NoTrustedSources;
        }

        self.log.record(RunEvent::PhaseEntered(Phase::Comparing));
        let is_changed = changed(&previous, &current);
        self.log.record(if is_changed {
            RunEvent::Changed
        } else {
            RunEvent::Unchanged
        });

        if options.mode == RunMode::Check {
            return Outcome::Checked {
                changed: is_changed,
            };
        }
        if !is_changed {
            if !options.force {
                return Outcome::Skipped;
            }
            self.log.record(RunEvent::Forced);
        }

        self.log.record(RunEvent::PhaseEntered(Phase::Compiling));
        info!("Generating new nftables rules...");
        let document = compile(&current, &PolicySettings::from_config(self.config));

        if options.mode == RunMode::DryRun {
            return Outcome::Compiled(document);
        }

        self.log.record(RunEvent::PhaseEntered(Phase::Applying));
        if let Err(failure) = self.applier.apply(&document, self.log) {
            self.log.record(RunEvent::ApplyFailed(failure.clone()));
            return Outcome::Failed(failure);
        }

        let entries = current.entry_count();
        self.log.record(RunEvent::Applied { entries });

        let cache_saved = match self.cache.save(&current) {
            Ok(()) => {
                self.log.record(RunEvent::CacheSaved);
                true
            }
            Err(e) => {
                self.log.record(RunEvent::CacheSaveFailed {
                    reason: format!("{:#}", e),
                });
                false
            }
        };

        Outcome::Committed {
            entries,
            cache_saved,
        }
    }

    fn load_previous(&self) -> TrustedSourceSet {
        let load = self.cache.load();
        if let CacheLoad::Corrupt(reason) = &load {
            self.log.record(RunEvent::CacheCorrupt {
                reason: reason.clone(),
            });
        }
        load.into_set()
    }

    /// Fetch both bulk lists and resolve every domain concurrently.
    async fn gather(&self) -> TrustedSourceSet {
        let (bulk_v4, bulk_v6, domains) = futures::join!(
            self.fetch_bucket(&self.config.bulk_ipv4_url),
            self.fetch_bucket(&self.config.bulk_ipv6_url),
            self.resolve_domains(),
        );

        TrustedSourceSet {
            bulk_v4,
            bulk_v6,
            domains,
        }
    }

    async fn fetch_bucket(&self, url: &str) -> BTreeSet<IpNet> {
        let report = self.bulk.fetch(url).await;
        match report.failure {
            Some(reason) => self.log.record(RunEvent::SourceUnavailable {
                source: url.to_string(),
                reason,
            }),
            None => self.log.record(RunEvent::BulkFetched {
                url: url.to_string(),
                count: report.networks.len(),
            }),
        }
        report.networks
    }

    async fn resolve_domains(&self) -> BTreeMap<String, BTreeSet<IpAddr>> {
        let domains = &self.config.custom_domains;
        if !domains.is_empty() {
            info!("Resolving {} custom domains...", domains.len());
        }

        let resolutions: Vec<_> = stream::iter(domains.iter())
            .map(|domain| async move { (domain.clone(), self.resolver.resolve(domain).await) })
            .buffered(MAX_CONCURRENT_LOOKUPS)
            .collect()
            .await;

        resolutions
            .into_iter()
            .map(|(domain, resolution)| {
                match resolution.failure {
                    Some(reason) => self.log.record(RunEvent::SourceUnavailable {
                        source: domain.clone(),
                        reason,
                    }),
                    None => self.log.record(RunEvent::DomainResolved {
                        domain: domain.clone(),
                        count: resolution.addresses.len(),
                    }),
                }
                (domain, resolution.addresses)
            })
            .collect()
    }
}
