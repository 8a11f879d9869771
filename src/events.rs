//! Run events and the logging capability the reconciler reports through.
//!
//! The core never writes to stdout or a log file itself. It hands every
//! observable step to a [`RunLog`]; production wires in [`TracingLog`],
//! which forwards to `tracing` (stdout + log file, see `main.rs`), and
//! tests use [`MemoryLog`] to assert on what happened.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use crate::error::ApplyFailure;

/// Reconciliation state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Gathering,
    Comparing,
    Compiling,
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Gathering => "gathering",
            Phase::Comparing => "comparing",
            Phase::Compiling => "compiling",
            Phase::Applying => "applying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    PhaseEntered(Phase),
    CacheCorrupt { reason: String },
    BulkFetched { url: String, count: usize },
    SourceUnavailable { source: String, reason: String },
    DomainResolved { domain: String, count: usize },
    DomainsUnresolved { domains: Vec<String> },
    NoTrustedSources,
    Unchanged,
    Changed,
    Forced,
    ServiceRestarted { service: String },
    ServiceSkipped { service: String },
    Applied { entries: usize },
    ApplyFailed(ApplyFailure),
    CacheSaved,
    CacheSaveFailed { reason: String },
}

impl RunEvent {
    fn severity(&self) -> Severity {
        match self {
            RunEvent::PhaseEntered(_) | RunEvent::ServiceSkipped { .. } => Severity::Debug,
            RunEvent::CacheCorrupt { .. }
            | RunEvent::SourceUnavailable { .. }
            | RunEvent::DomainsUnresolved { .. }
            | RunEvent::CacheSaveFailed { .. } => Severity::Warn,
            RunEvent::NoTrustedSources | RunEvent::ApplyFailed(_) => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::PhaseEntered(phase) => write!(f, "Entering {} phase", phase),
            RunEvent::CacheCorrupt { reason } => {
                write!(f, "Error loading IP cache: {}, starting from an empty cache", reason)
            }
            RunEvent::BulkFetched { url, count } => {
                write!(f, "Fetched {} networks from {}", count, url)
            }
            RunEvent::SourceUnavailable { source, reason } => {
                write!(f, "Source {} unavailable: {}", source, reason)
            }
            RunEvent::DomainResolved { domain, count } => {
                write!(f, "Resolved {}: {} valid IPs", domain, count)
            }
            RunEvent::DomainsUnresolved { domains } => write!(
                f,
                "No addresses for {}; their HTTPS rules are omitted",
                domains.join(", ")
            ),
            RunEvent::NoTrustedSources => write!(
                f,
                "No valid IPs found from any source. Exiting to avoid locking out the host."
            ),
            RunEvent::Unchanged => write!(f, "No changes to IP addresses detected."),
            RunEvent::Changed => write!(f, "IP addresses have changed since last update."),
            RunEvent::Forced => write!(f, "Forcing update although IP addresses are unchanged."),
            RunEvent::ServiceRestarted { service } => write!(f, "Restarted {}", service),
            RunEvent::ServiceSkipped { service } => {
                write!(f, "{} is not active, leaving it stopped", service)
            }
            RunEvent::Applied { entries } => write!(
                f,
                "Successfully reset nftables and applied new firewall rules ({} allow entries).",
                entries
            ),
            RunEvent::ApplyFailed(failure) => {
                write!(f, "Failed to apply firewall rules: {}. IP cache not updated.", failure)
            }
            RunEvent::CacheSaved => write!(f, "Updated IP cache saved."),
            RunEvent::CacheSaveFailed { reason } => write!(f, "Error saving IP cache: {}", reason),
        }
    }
}

enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Capability for recording run events.
pub trait RunLog: Send + Sync {
    fn record(&self, event: RunEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl RunLog for TracingLog {
    fn record(&self, event: RunEvent) {
        match event.severity() {
            Severity::Debug => debug!("{}", event),
            Severity::Info => info!("{}", event),
            Severity::Warn => warn!("{}", event),
            Severity::Error => error!("{}", event),
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: Mutex<Vec<RunEvent>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, event: &RunEvent) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn reached(&self, phase: Phase) -> bool {
        self.contains(&RunEvent::PhaseEntered(phase))
    }
}

impl RunLog for MemoryLog {
    fn record(&self, event: RunEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
