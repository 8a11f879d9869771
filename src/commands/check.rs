//! Check command implementation.

use anyhow::Result;

use super::reconcile;
use crate::config::Config;
use crate::reconciler::{Outcome, RunMode, RunOptions};

/// Run the check command. Never touches the firewall or the cache.
pub async fn run(config: &Config) -> Result<u8> {
    let outcome = reconcile(
        config,
        RunOptions {
            mode: RunMode::Check,
            force: false,
        },
    )
    .await?;

    match &outcome {
        Outcome::Checked { changed: true } => {
            println!("[CHANGED] Trusted sources differ from the applied firewall; run `trustwall update`")
        }
        Outcome::Checked { changed: false } => {
            println!("[OK] Firewall is up to date with trusted sources")
        }
        Outcome::NoTrustedSources => println!("[ERROR] No trusted source could be gathered"),
        _ => {}
    }

    Ok(outcome.exit_code())
}
