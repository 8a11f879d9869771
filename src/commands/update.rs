//! Update command implementation.

use anyhow::Result;
use tracing::info;

use super::reconcile;
use crate::config::Config;
use crate::enforcer::check_root;
use crate::lock::LockGuard;
use crate::reconciler::{Outcome, RunMode, RunOptions};

/// Run the update command
pub async fn run(config: &Config, force: bool, dry_run: bool) -> Result<u8> {
    let mode = if dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };

    // A dry run only reads the cache; everything else needs root and the lock
    let _lock = match mode {
        RunMode::DryRun => None,
        _ => {
            check_root()?;
            Some(LockGuard::acquire(&config.lock_file)?)
        }
    };

    let outcome = reconcile(config, RunOptions { mode, force }).await?;

    match &outcome {
        Outcome::Skipped => info!("Exiting without updating firewall."),
        Outcome::Compiled(document) => print!("{}", document),
        Outcome::Committed {
            entries,
            cache_saved,
        } => {
            println!();
            println!("[OK] Firewall updated ({} allow entries)", entries);
            if !cache_saved {
                println!("[WARN] IP cache not saved; the next run will apply again");
            }
        }
        Outcome::Failed(failure) => println!("[ERROR] {}", failure),
        Outcome::NoTrustedSources => println!("[ERROR] No trusted source could be gathered"),
        Outcome::Checked { .. } => {}
    }

    Ok(outcome.exit_code())
}
