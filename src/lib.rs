//! # trustwall - HTTPS allow-list firewall for CDN-fronted hosts
//!
//! Keeps a default-deny nftables policy in sync with a dynamic set of
//! trusted sources: a CDN's published IP ranges plus a few operator-named
//! domains. Each run gathers the current set, compares it with the set that
//! was last applied, and only when it differs compiles a fresh ruleset and
//! applies it all-or-nothing.
//!
//! ## Guarantees
//!
//! - **No lockout** - if every source comes back empty the run aborts
//!   before anything is compiled
//! - **All-or-nothing apply** - the document is validated before the live
//!   ruleset is reset, and the policy file is replaced by a single rename
//! - **Idempotent** - an unchanged set never touches the firewall or
//!   restarts dependent services
//! - **Cache follows reality** - the applied set is only persisted after a
//!   successful apply
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        trustwall                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: check, update [--force] [--dry-run]        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_json)          Lock (fs2)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler                                                 │
//! │    ├── Fetcher (reqwest + rustls)   bulk range lists        │
//! │    ├── Resolver (dns-lookup)        trusted domains         │
//! │    ├── TrustSetCache (serde_json)   last applied set        │
//! │    ├── Policy compiler              nftables document       │
//! │    └── SafeApplier                                          │
//! │          ├── FilterEngine (nft)                             │
//! │          ├── ServiceManager (systemctl)                     │
//! │          └── FileSystem (staging + rename)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Events (RunLog → tracing → stdout + log file)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use trustwall::policy::{compile, PolicySettings};
//! use trustwall::trust_set::TrustedSourceSet;
//!
//! let mut set = TrustedSourceSet::default();
//! set.bulk_v4.insert("173.245.48.0/20".parse().unwrap());
//!
//! let document = compile(&set, &PolicySettings::default());
//! println!("{}", document);
//! ```
//!
//! ## Modules
//!
//! - [`reconciler`] - Gather → compare → compile → apply → persist
//! - [`fetcher`] - HTTP fetching of published range lists
//! - [`dns`] - Resolution of trusted domains
//! - [`cache`] - Persistence and change detection of the applied set
//! - [`policy`] - nftables document rendering
//! - [`applier`] - Staged, validated, atomic application
//! - [`enforcer`] - nftables engine and privilege check
//! - [`service`] - Dependent service restarts
//! - [`config`] - JSON configuration
//! - [`events`] - Run events and logging capability

pub mod applier;
pub mod cache;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dns;
pub mod enforcer;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod fs_abstraction;
pub mod lock;
pub mod policy;
pub mod reconciler;
pub mod service;
pub mod trust_set;
pub mod validation;
