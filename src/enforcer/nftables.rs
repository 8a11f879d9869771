//! nftables engine driven through the `nft` binary.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use super::FilterEngine;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};

const NFT_CANDIDATES: &[&str] = &["/usr/sbin/nft", "/sbin/nft", "/usr/bin/nft"];

/// Locate `nft`, falling back to a `$PATH` lookup.
fn nft_path() -> &'static str {
    NFT_CANDIDATES
        .iter()
        .copied()
        .find(|p| Path::new(p).exists())
        .unwrap_or("nft")
}

/// nftables engine
pub struct NftEngine<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
    nft: String,
}

impl NftEngine<RealCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealCommandExecutor::new())
    }
}

impl Default for NftEngine<RealCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> NftEngine<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            nft: nft_path().to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        debug!("Running {} {}", self.nft, args.join(" "));
        let output = self.executor.execute(&self.nft, &args_to_strings(args))?;
        if !output.success {
            anyhow::bail!("nft {} failed: {}", args.join(" "), output.diagnostic());
        }
        Ok(())
    }
}

impl<E: CommandExecutor> FilterEngine for NftEngine<E> {
    fn check(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["--check", "-f", &*path])
    }

    fn reset(&self) -> Result<()> {
        self.run(&["flush", "ruleset"])
    }

    fn load(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["-f", &*path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};

    fn engine_expecting(args: &'static [&'static str], output: CommandOutput) -> NftEngine<MockCommandExecutor> {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(move |cmd, a| cmd.ends_with("nft") && a == args_to_strings(args).as_slice())
            .times(1)
            .return_once(move |_, _| Ok(output));
        NftEngine::with_executor(mock)
    }

    #[test]
    fn test_check_uses_check_flag() {
        let engine = engine_expecting(
            &["--check", "-f", "/etc/nftables.conf.staging"],
            CommandOutput::ok(""),
        );
        engine.check(Path::new("/etc/nftables.conf.staging")).unwrap();
    }

    #[test]
    fn test_reset_flushes_ruleset() {
        let engine = engine_expecting(&["flush", "ruleset"], CommandOutput::ok(""));
        engine.reset().unwrap();
    }

    #[test]
    fn test_load_failure_carries_stderr() {
        let engine = engine_expecting(
            &["-f", "/etc/nftables.conf.staging"],
            CommandOutput::failed(1, "/etc/nftables.conf.staging:12:9-12: Error: syntax error\n"),
        );
        let err = engine.load(Path::new("/etc/nftables.conf.staging")).unwrap_err();
        assert!(err.to_string().contains("Error: syntax error"));
    }

    #[test]
    fn test_spawn_failure_propagates() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("No such file or directory")));
        let engine = NftEngine::with_executor(mock);
        assert!(engine.reset().is_err());
    }

    #[test]
    fn test_nft_path_is_nft() {
        assert!(nft_path().ends_with("nft"));
    }
}
