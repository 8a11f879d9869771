//! Dependent service control through systemd.

use anyhow::Result;
use tracing::debug;

use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};

#[cfg(test)]
use mockall::automock;

/// Service manager operations the applier relies on.
#[cfg_attr(test, automock)]
pub trait ServiceManager: Send + Sync {
    /// Whether the service is currently running.
    fn is_active(&self, name: &str) -> Result<bool>;

    /// Restart a running service.
    fn restart(&self, name: &str) -> Result<()>;
}

/// `systemctl`-backed service manager.
pub struct Systemctl<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
}

impl Systemctl<RealCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealCommandExecutor::new())
    }
}

impl Default for Systemctl<RealCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> Systemctl<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }
}

impl<E: CommandExecutor> ServiceManager for Systemctl<E> {
    fn is_active(&self, name: &str) -> Result<bool> {
        // is-active exits non-zero for anything but "active"; stdout is the state
        let output = self
            .executor
            .execute("systemctl", &args_to_strings(&["is-active", name]))?;
        let state = output.stdout.trim();
        debug!("{} is {}", name, if state.is_empty() { "unknown" } else { state });
        Ok(state == "active")
    }

    fn restart(&self, name: &str) -> Result<()> {
        let output = self
            .executor
            .execute("systemctl", &args_to_strings(&["restart", name]))?;
        if !output.success {
            anyhow::bail!("systemctl restart {} failed: {}", name, output.diagnostic());
        }
        Ok(())
    }
}
