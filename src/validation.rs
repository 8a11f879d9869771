//! Centralized validation functions for trustwall.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges
//! - Hostnames used as trusted domains
//! - Interface names and patterns rendered into the ruleset
//! - Source URLs

use anyhow::{bail, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Maximum length of a DNS name (RFC 1035)
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Linux IFNAMSIZ minus the trailing NUL
const MAX_IFACE_LEN: usize = 15;

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use trustwall::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("invalid").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))
}

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// A plain address (without /prefix) becomes a /32 (IPv4) or /128 (IPv6)
/// network. Host bits in a CIDR are kept as written.
///
/// # Examples
/// ```
/// use trustwall::validation::validate_ip_or_cidr;
/// assert!(validate_ip_or_cidr("173.245.48.0/20").is_ok());
/// assert!(validate_ip_or_cidr("2400:cb00::/32").is_ok());
/// assert!(validate_ip_or_cidr("10.0.0.1").is_ok());
/// assert!(validate_ip_or_cidr("invalid").is_err());
/// ```
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    let trimmed = ip_str.trim();
    if trimmed.contains('/') {
        trimmed
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip: IpAddr = trimmed
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))?;
        Ok(IpNet::from(ip))
    }
}

/// Check that an IP/CIDR string is safe to splice into an nftables script.
///
/// `IpNet`'s `Display` output always passes; this guards against anything
/// that slipped past parsing.
pub fn is_safe_nft_element(s: &str) -> bool {
    s.chars().all(|c| {
        c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c)
    })
}

/// Validate a hostname to be resolved and used as a rule label.
///
/// # Examples
/// ```
/// use trustwall::validation::validate_domain;
/// assert!(validate_domain("ai.example.com").is_ok());
/// assert!(validate_domain("bad domain").is_err());
/// assert!(validate_domain("evil.com\n        accept").is_err());
/// ```
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        bail!("Domain cannot be empty");
    }

    if !domain.is_ascii() {
        bail!(
            "Invalid domain '{}'. Only ASCII characters allowed (use punycode)",
            domain.escape_debug()
        );
    }

    let name = domain.strip_suffix('.').unwrap_or(domain);
    if name.len() > MAX_DOMAIN_LEN {
        bail!("Invalid domain '{}'. Longer than {} characters", domain, MAX_DOMAIN_LEN);
    }

    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            bail!(
                "Invalid domain '{}'. Labels must be 1-{} characters",
                domain.escape_debug(),
                MAX_LABEL_LEN
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!(
                "Invalid domain '{}'. Labels cannot start or end with '-'",
                domain.escape_debug()
            );
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "Invalid domain '{}'. Only letters, digits, '-' and '_' allowed",
                domain.escape_debug()
            );
        }
    }

    Ok(())
}

/// Validate an interface name or nftables wildcard pattern (`br-+`).
///
/// # Examples
/// ```
/// use trustwall::validation::validate_interface;
/// assert!(validate_interface("tailscale0").is_ok());
/// assert!(validate_interface("veth+").is_ok());
/// assert!(validate_interface("eth0\" accept").is_err());
/// ```
pub fn validate_interface(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Interface name cannot be empty");
    }

    let base = name.strip_suffix('+').unwrap_or(name);
    if base.is_empty() || base.len() > MAX_IFACE_LEN {
        bail!(
            "Invalid interface '{}'. Name must be 1-{} characters",
            name.escape_debug(),
            MAX_IFACE_LEN
        );
    }

    if !base
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        bail!(
            "Invalid interface '{}'. Only letters, digits, '-', '_', '.' and a trailing '+' allowed",
            name.escape_debug()
        );
    }

    Ok(())
}

/// Validate that a source URL uses HTTPS.
pub fn validate_https_url(url: &str) -> Result<()> {
    if !url.starts_with("https://") {
        bail!("URL must use HTTPS: {}", url);
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("URL contains whitespace or control characters: {}", url.escape_debug());
    }
    Ok(())
}

/// Validate a TCP port number (rejects 0).
pub fn validate_port(port: u16, what: &str) -> Result<()> {
    if port == 0 {
        bail!("Invalid {} port: 0", what);
    }
    Ok(())
}
