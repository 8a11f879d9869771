//! Packet-filter engine boundary.

mod nftables;

use anyhow::Result;
use std::path::Path;

pub use nftables::NftEngine;

use crate::error::TrustwallError;

#[cfg(test)]
use mockall::automock;

/// Operations the applier needs from the live packet filter.
///
/// Each method fails with the engine's own diagnostic as the error message.
#[cfg_attr(test, automock)]
pub trait FilterEngine: Send + Sync {
    /// Dry-run a ruleset file without touching the live ruleset.
    fn check(&self, path: &Path) -> Result<()>;

    /// Remove every rule from the live ruleset.
    fn reset(&self) -> Result<()>;

    /// Load a ruleset file into the live ruleset.
    fn load(&self, path: &Path) -> Result<()>;
}

/// Check if running as root (effective UID == 0)
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions, never fails, and doesn't modify any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(TrustwallError::Permission(
            "Applying firewall rules requires root privileges. Please run with sudo.".to_string(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_root_matches_euid() {
        // SAFETY: see check_root
        let euid = unsafe { libc::geteuid() };
        let result = check_root();
        if euid == 0 {
            assert!(result.is_ok());
        } else {
            let err = result.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TrustwallError>(),
                Some(TrustwallError::Permission(_))
            ));
        }
    }

    #[test]
    fn test_mock_engine_reports_diagnostic() {
        let mut engine = MockFilterEngine::new();
        engine
            .expect_check()
            .returning(|_| Err(anyhow::anyhow!("syntax error")));

        let err = engine.check(Path::new("/tmp/x")).unwrap_err();
        assert_eq!(err.to_string(), "syntax error");
    }
}
