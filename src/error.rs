//! Error types for trustwall.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrustwallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Another trustwall run holds the lock: {0}")]
    Locked(String),
}

/// Step of the apply protocol at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    /// Writing the compiled document to the staging file
    Stage,
    /// Dry-run validation of the staging file
    Validate,
    /// Flushing the live ruleset
    Reset,
    /// Loading the staging file into the live ruleset
    Load,
    /// Restarting a dependent service
    ServiceRestart,
    /// Renaming the staging file over the live policy file
    Persist,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyStage::Stage => "stage",
            ApplyStage::Validate => "validate",
            ApplyStage::Reset => "reset",
            ApplyStage::Load => "load",
            ApplyStage::ServiceRestart => "service-restart",
            ApplyStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A failed apply, carrying the stage and the tool's diagnostic output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("apply failed at {stage}: {diagnostic}")]
pub struct ApplyFailure {
    pub stage: ApplyStage,
    pub diagnostic: String,
}

impl ApplyFailure {
    pub fn new(stage: ApplyStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }

    /// Build a failure from an `anyhow` chain, keeping every cause.
    pub fn from_error(stage: ApplyStage, err: &anyhow::Error) -> Self {
        Self::new(stage, format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_failure_display() {
        let failure = ApplyFailure::new(ApplyStage::Load, "Error: syntax error, unexpected }");
        assert_eq!(
            failure.to_string(),
            "apply failed at load: Error: syntax error, unexpected }"
        );
    }

    #[test]
    fn test_apply_failure_from_error_keeps_context() {
        let err = anyhow::anyhow!("exit status 1").context("nft -f /etc/nftables.conf.staging");
        let failure = ApplyFailure::from_error(ApplyStage::Load, &err);
        assert!(failure.diagnostic.contains("nft -f"));
        assert!(failure.diagnostic.contains("exit status 1"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ApplyStage::ServiceRestart.to_string(), "service-restart");
        assert_eq!(ApplyStage::Persist.to_string(), "persist");
    }
}
