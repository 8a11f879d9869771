//! All-or-nothing application of a compiled policy.
//!
//! ```text
//! write staging ─► nft --check ─► flush ruleset ─► nft -f staging
//!        ─► restart active dependent services ─► rename staging → live
//! ```
//!
//! The live policy file is only replaced by the final rename, so it always
//! holds the last document that loaded successfully.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::enforcer::FilterEngine;
use crate::error::{ApplyFailure, ApplyStage};
use crate::events::{RunEvent, RunLog};
use crate::fs_abstraction::FileSystem;
use crate::policy::PolicyDocument;
use crate::service::ServiceManager;

/// Mode of the policy file; it carries a shebang like the distro's own.
const POLICY_FILE_MODE: u32 = 0o755;

/// Something that can make a policy document live.
pub trait PolicyApplier: Send + Sync {
    fn apply(&self, doc: &PolicyDocument, log: &dyn RunLog) -> Result<(), ApplyFailure>;
}

/// Where the applier stages and promotes the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPaths {
    pub staging: PathBuf,
    pub live: PathBuf,
}

impl ApplyPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging: config.staging_file.clone(),
            live: config.policy_file.clone(),
        }
    }
}

/// Stages, validates, loads and promotes policy documents.
pub struct SafeApplier<F, S, Fs> {
    engine: F,
    services: S,
    fs: Fs,
    paths: ApplyPaths,
    dependent_services: Vec<String>,
}

impl<F, S, Fs> SafeApplier<F, S, Fs>
where
    F: FilterEngine,
    S: ServiceManager,
    Fs: FileSystem,
{
    pub fn new(
        engine: F,
        services: S,
        fs: Fs,
        paths: ApplyPaths,
        dependent_services: Vec<String>,
    ) -> Self {
        Self {
            engine,
            services,
            fs,
            paths,
            dependent_services,
        }
    }

    fn stage(&self, doc: &PolicyDocument) -> Result<(), ApplyFailure> {
        let staging = &self.paths.staging;
        let failed = |e: std::io::Error| {
            ApplyFailure::new(ApplyStage::Stage, format!("{}: {}", staging.display(), e))
        };

        if let Some(parent) = staging.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).map_err(failed)?;
        }
        self.fs
            .write(staging, doc.as_str().as_bytes())
            .map_err(failed)?;
        self.fs
            .set_permissions_mode(staging, POLICY_FILE_MODE)
            .map_err(failed)?;

        debug!("Staged policy at {}", staging.display());
        Ok(())
    }

    fn engine_step(
        &self,
        stage: ApplyStage,
        step: impl FnOnce(&F, &Path) -> anyhow::Result<()>,
    ) -> Result<(), ApplyFailure> {
        step(&self.engine, &self.paths.staging).map_err(|e| ApplyFailure::from_error(stage, &e))
    }

    fn restart_services(&self, log: &dyn RunLog) -> Result<(), ApplyFailure> {
        for service in &self.dependent_services {
            let active = match self.services.is_active(service) {
                Ok(active) => active,
                Err(e) => {
                    debug!("Could not query {}: {:#}", service, e);
                    false
                }
            };

            if !active {
                log.record(RunEvent::ServiceSkipped {
                    service: service.clone(),
                });
                continue;
            }

            self.services
                .restart(service)
                .map_err(|e| ApplyFailure::from_error(ApplyStage::ServiceRestart, &e))?;
            log.record(RunEvent::ServiceRestarted {
                service: service.clone(),
            });
        }
        Ok(())
    }

    fn promote(&self) -> Result<(), ApplyFailure> {
        self.fs
            .rename(&self.paths.staging, &self.paths.live)
            .map_err(|e| {
                ApplyFailure::new(
                    ApplyStage::Persist,
                    format!(
                        "{} -> {}: {}",
                        self.paths.staging.display(),
                        self.paths.live.display(),
                        e
                    ),
                )
            })
    }
}

impl<F, S, Fs> PolicyApplier for SafeApplier<F, S, Fs>
where
    F: FilterEngine,
    S: ServiceManager,
    Fs: FileSystem,
{
    fn apply(&self, doc: &PolicyDocument, log: &dyn RunLog) -> Result<(), ApplyFailure> {
        info!("Applying nftables rules...");

        self.stage(doc)?;
        self.engine_step(ApplyStage::Validate, |engine, path| engine.check(path))?;
        self.engine_step(ApplyStage::Reset, |engine, _| engine.reset())?;
        self.engine_step(ApplyStage::Load, |engine, path| engine.load(path))?;
        self.restart_services(log)?;
        self.promote()
    }
}
