//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "trustwall")]
#[command(
    author,
    version,
    about = "Keeps an nftables allow-list in sync with published CDN ranges and trusted domains"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Defaults to `update` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// The subcommand to run, with `update` as the default.
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Update {
            force: false,
            dry_run: false,
        })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Gather trusted sources and report whether the firewall needs updating
    Check,

    /// Regenerate and apply the firewall if trusted sources changed
    Update {
        /// Apply even if nothing changed
        #[arg(long)]
        force: bool,

        /// Print the generated ruleset instead of applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_subcommand_is_update() {
        let cli = Cli::try_parse_from(["trustwall"]).unwrap();
        assert_eq!(
            cli.command_or_default(),
            Commands::Update {
                force: false,
                dry_run: false
            }
        );
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_update_flags() {
        let cli = Cli::try_parse_from(["trustwall", "update", "--force", "--dry-run"]).unwrap();
        assert_eq!(
            cli.command_or_default(),
            Commands::Update {
                force: true,
                dry_run: true
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["trustwall", "check", "--config", "/tmp/c.json", "-q"]).unwrap();
        assert_eq!(cli.command_or_default(), Commands::Check);
        assert_eq!(cli.config, PathBuf::from("/tmp/c.json"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["trustwall", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["trustwall", "install"]).is_err());
    }
}
