//! CLI command implementations.

pub mod check;
pub mod update;

use anyhow::Result;

use crate::applier::{ApplyPaths, SafeApplier};
use crate::cache::TrustSetCache;
use crate::config::Config;
use crate::dns::SystemResolver;
use crate::enforcer::NftEngine;
use crate::events::TracingLog;
use crate::fetcher::Fetcher;
use crate::fs_abstraction::RealFileSystem;
use crate::reconciler::{Outcome, Reconciler, RunOptions};
use crate::service::Systemctl;

/// Run one reconciliation against the real host.
async fn reconcile(config: &Config, options: RunOptions) -> Result<Outcome> {
    let fetcher = Fetcher::from_config(config)?;
    let resolver = SystemResolver::from_config(config);
    let cache = TrustSetCache::new(&config.cache_file);
    let applier = SafeApplier::new(
        NftEngine::new(),
        Systemctl::new(),
        RealFileSystem,
        ApplyPaths::from_config(config),
        config.dependent_services.clone(),
    );

    let reconciler = Reconciler::new(config, &fetcher, &resolver, &cache, &applier, &TracingLog);
    Ok(reconciler.run(options).await)
}
