//! Rendering of a trusted-source set into a complete nftables ruleset.
//!
//! The document is self-contained: it starts with `flush ruleset` and
//! declares the single `inet filter` table this tool manages. Rendering is
//! a pure function of the set and [`PolicySettings`], so identical inputs
//! always produce byte-identical output.

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use tracing::warn;

use crate::config::Config;
use crate::trust_set::TrustedSourceSet;
use crate::validation::is_safe_nft_element;

/// A rendered nftables script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument(String);

impl PolicyDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PolicyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static parts of the policy that do not come from trusted sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySettings {
    pub ssh_port: u16,
    pub https_port: u16,
    pub tunnel_interface: String,
    pub bridge_interfaces: Vec<String>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PolicySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ssh_port: config.allow_ssh_port,
            https_port: config.https_port,
            tunnel_interface: config.tunnel_interface.clone(),
            bridge_interfaces: config.bridge_interfaces.clone(),
        }
    }
}

/// nft family keyword for a source match.
fn family(is_v4: bool) -> &'static str {
    if is_v4 {
        "ip"
    } else {
        "ip6"
    }
}

/// Render one `saddr` accept line, or nothing if the element is unsafe.
fn push_allow(script: &mut String, element: String, is_v4: bool, https_port: u16) {
    if !is_safe_nft_element(&element) {
        warn!("Filtered unsafe nftables element: {}", element);
        return;
    }
    script.push_str(&format!(
        "        {} saddr {} tcp dport {} accept\n",
        family(is_v4),
        element,
        https_port
    ));
}

fn push_network(script: &mut String, net: &IpNet, https_port: u16) {
    push_allow(
        script,
        net.to_string(),
        matches!(net, IpNet::V4(_)),
        https_port,
    );
}

fn push_address(script: &mut String, addr: &IpAddr, https_port: u16) {
    push_allow(script, addr.to_string(), addr.is_ipv4(), https_port);
}

fn push_bridge_pairs(script: &mut String, bridges: &[String]) {
    for iface in bridges {
        script.push_str(&format!(
            "        iifname \"{}\" oifname \"{}\" accept\n",
            iface, iface
        ));
    }
}

/// Render `set` into a full ruleset.
///
/// Bulk networks come first (v4 bucket, then v6 bucket), followed by one
/// labelled block per domain that resolved to at least one address. Each
/// rule's family keyword follows the address it matches, not the bucket it
/// was filed under.
pub fn compile(set: &TrustedSourceSet, settings: &PolicySettings) -> PolicyDocument {
    let mut script = String::new();
    let https = settings.https_port;

    script.push_str("#!/usr/sbin/nft -f\n\n");
    script.push_str("# Completely reset everything\n");
    script.push_str("flush ruleset\n\n");

    script.push_str("table inet filter {\n");

    // === Input chain ===
    script.push_str("    chain input {\n");
    script.push_str("        type filter hook input priority 0; policy drop;\n\n");

    script.push_str("        # Allow established and related connections\n");
    script.push_str("        ct state established,related accept\n\n");

    script.push_str("        # Allow loopback traffic\n");
    script.push_str("        iif lo accept\n\n");

    script.push_str("        # Block ICMP (ping)\n");
    script.push_str("        ip protocol icmp drop\n");
    script.push_str("        ip6 nexthdr icmpv6 drop\n\n");

    script.push_str(&format!(
        "        # Allow all traffic from {}\n",
        settings.tunnel_interface
    ));
    script.push_str(&format!(
        "        iifname \"{}\" accept\n\n",
        settings.tunnel_interface
    ));

    if !settings.bridge_interfaces.is_empty() {
        script.push_str("        # Allow all traffic on container bridge interfaces\n");
        for iface in &settings.bridge_interfaces {
            script.push_str(&format!("        iifname \"{}\" accept\n", iface));
        }
        script.push('\n');

        script.push_str("        # Allow forwarding between containers\n");
        push_bridge_pairs(&mut script, &settings.bridge_interfaces);
        script.push('\n');
    }

    script.push_str("        # Allow DNS and Secure DNS for everyone\n");
    script.push_str("        udp dport { 53, 853 } accept\n");
    script.push_str("        tcp dport { 53, 853 } accept\n\n");

    script.push_str("        # Allow SSH on custom port\n");
    script.push_str(&format!("        tcp dport {} accept\n\n", settings.ssh_port));

    script.push_str(&format!(
        "        # Allow HTTPS ({}) only from published ranges\n",
        https
    ));
    for net in set.bulk_v4.iter().chain(set.bulk_v6.iter()) {
        push_network(&mut script, net, https);
    }

    for (domain, addrs) in &set.domains {
        if addrs.is_empty() {
            continue;
        }
        script.push_str(&format!("\n        # Allow HTTPS from {}\n", domain));
        for addr in addrs.iter().filter(|a| a.is_ipv4()) {
            push_address(&mut script, addr, https);
        }
        for addr in addrs.iter().filter(|a| a.is_ipv6()) {
            push_address(&mut script, addr, https);
        }
    }

    script.push_str("\n        # Drop all other traffic\n");
    script.push_str("        drop\n");
    script.push_str("    }\n\n");

    // === Forward chain ===
    script.push_str("    chain forward {\n");
    script.push_str("        type filter hook forward priority 0; policy accept;\n");
    if !settings.bridge_interfaces.is_empty() {
        script.push_str("\n        # Allow inter-container communication\n");
        push_bridge_pairs(&mut script, &settings.bridge_interfaces);
    }
    script.push_str("    }\n\n");

    // === Output chain ===
    script.push_str("    chain output {\n");
    script.push_str("        type filter hook output priority 0; policy accept;\n");
    script.push_str("    }\n");

    script.push_str("}\n");

    PolicyDocument(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_set() -> TrustedSourceSet {
        let mut set = TrustedSourceSet::default();
        set.bulk_v4.insert("173.245.48.0/20".parse().unwrap());
        set.bulk_v6.insert("2400:cb00::/32".parse().unwrap());
        set.domains.insert(
            "ai.example.com".to_string(),
            BTreeSet::from([
                "2620:fe::9".parse().unwrap(),
                "9.9.9.9".parse().unwrap(),
            ]),
        );
        set
    }

    fn saddr_lines(doc: &PolicyDocument) -> Vec<&str> {
        doc.as_str()
            .lines()
            .map(str::trim)
            .filter(|l| l.contains(" saddr "))
            .collect()
    }

    #[test]
    fn test_compile_is_deterministic() {
        let settings = PolicySettings::default();
        assert_eq!(
            compile(&sample_set(), &settings),
            compile(&sample_set(), &settings)
        );
    }

    #[test]
    fn test_compile_header_and_table() {
        let doc = compile(&sample_set(), &PolicySettings::default());
        let text = doc.as_str();
        assert!(text.starts_with("#!/usr/sbin/nft -f\n\n# Completely reset everything\nflush ruleset\n"));
        assert!(text.contains("table inet filter {"));
        assert!(text.contains("type filter hook input priority 0; policy drop;"));
        assert!(text.contains("type filter hook forward priority 0; policy accept;"));
        assert!(text.contains("type filter hook output priority 0; policy accept;"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_compile_static_exceptions() {
        let doc = compile(&TrustedSourceSet::default(), &PolicySettings::default());
        let text = doc.as_str();
        assert!(text.contains("ct state established,related accept"));
        assert!(text.contains("iif lo accept"));
        assert!(text.contains("ip protocol icmp drop"));
        assert!(text.contains("ip6 nexthdr icmpv6 drop"));
        assert!(text.contains("iifname \"tailscale0\" accept"));
        assert!(text.contains("iifname \"docker0\" accept"));
        assert!(text.contains("iifname \"br-+\" oifname \"br-+\" accept"));
        assert!(text.contains("udp dport { 53, 853 } accept"));
        assert!(text.contains("tcp dport { 53, 853 } accept"));
        assert!(text.contains("tcp dport 12222 accept"));
    }

    #[test]
    fn test_compile_rule_order() {
        let doc = compile(&sample_set(), &PolicySettings::default());
        assert_eq!(
            saddr_lines(&doc),
            vec![
                "ip saddr 173.245.48.0/20 tcp dport 443 accept",
                "ip6 saddr 2400:cb00::/32 tcp dport 443 accept",
                "ip saddr 9.9.9.9 tcp dport 443 accept",
                "ip6 saddr 2620:fe::9 tcp dport 443 accept",
            ]
        );

        let text = doc.as_str();
        let ssh = text.find("tcp dport 12222 accept").unwrap();
        let bulk = text.find("173.245.48.0/20").unwrap();
        let domain = text.find("# Allow HTTPS from ai.example.com").unwrap();
        let drop = text.find("        drop\n").unwrap();
        let forward = text.find("chain forward").unwrap();
        assert!(ssh < bulk && bulk < domain && domain < drop && drop < forward);
    }

    #[test]
    fn test_compile_skips_unresolved_domain() {
        let mut set = sample_set();
        set.domains.insert("down.example.com".to_string(), BTreeSet::new());
        let doc = compile(&set, &PolicySettings::default());
        assert!(!doc.as_str().contains("down.example.com"));
        assert_eq!(saddr_lines(&doc).len(), 4);
    }

    #[test]
    fn test_compile_domains_in_name_order() {
        let mut set = TrustedSourceSet::default();
        set.domains.insert(
            "b.example.com".to_string(),
            BTreeSet::from(["2.2.2.2".parse().unwrap()]),
        );
        set.domains.insert(
            "a.example.com".to_string(),
            BTreeSet::from(["1.1.1.1".parse().unwrap()]),
        );
        let doc = compile(&set, &PolicySettings::default());
        let text = doc.as_str();
        assert!(text.find("a.example.com").unwrap() < text.find("b.example.com").unwrap());
    }

    #[test]
    fn test_compile_family_follows_address() {
        // A v6 network filed in the v4 bucket still gets ip6
        let mut set = TrustedSourceSet::default();
        set.bulk_v4.insert("2400:cb00::/32".parse().unwrap());
        let doc = compile(&set, &PolicySettings::default());
        assert_eq!(
            saddr_lines(&doc),
            vec!["ip6 saddr 2400:cb00::/32 tcp dport 443 accept"]
        );
    }

    #[test]
    fn test_compile_no_cross_bucket_dedup() {
        let mut set = TrustedSourceSet::default();
        set.bulk_v4.insert("1.1.1.1/32".parse().unwrap());
        set.domains.insert(
            "one.example.com".to_string(),
            BTreeSet::from(["1.1.1.1".parse().unwrap()]),
        );
        let doc = compile(&set, &PolicySettings::default());
        assert_eq!(saddr_lines(&doc).len(), 2);
    }

    #[test]
    fn test_compile_custom_settings() {
        let settings = PolicySettings {
            ssh_port: 2222,
            https_port: 8443,
            tunnel_interface: "wg0".to_string(),
            bridge_interfaces: vec![],
        };
        let doc = compile(&sample_set(), &settings);
        let text = doc.as_str();
        assert!(text.contains("tcp dport 2222 accept"));
        assert!(text.contains("iifname \"wg0\" accept"));
        assert!(text.contains("ip saddr 173.245.48.0/20 tcp dport 8443 accept"));
        assert!(text.contains("# Allow HTTPS (8443)"));
        assert!(!text.contains("docker0"));
        assert!(!text.contains("inter-container"));
    }

    #[test]
    fn test_compile_forward_chain_bridges() {
        let doc = compile(&TrustedSourceSet::default(), &PolicySettings::default());
        let text = doc.as_str();
        let forward = &text[text.find("chain forward").unwrap()..];
        assert!(forward.contains("iifname \"docker0\" oifname \"docker0\" accept"));
        assert!(forward.contains("iifname \"veth+\" oifname \"veth+\" accept"));
    }

    #[test]
    fn test_compile_braces_balanced() {
        let doc = compile(&sample_set(), &PolicySettings::default());
        let open = doc.as_str().matches('{').count();
        let close = doc.as_str().matches('}').count();
        assert_eq!(open, close);
    }
}
