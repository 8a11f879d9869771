//! HTTP fetcher for published IP range lists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ipnet::IpNet;
use reqwest::Client;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, MAX_FETCH_RETRIES};
use crate::validation::validate_ip_or_cidr;

const RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Maximum size of a range list (1 MB)
/// Cloudflare's lists are well under 1 KB; anything near this is not a range list
const MAX_LIST_SIZE: usize = 1024 * 1024;

/// Outcome of asking one source for its networks.
///
/// A failed source reports an empty set plus the reason; callers decide
/// whether an empty source matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub networks: BTreeSet<IpNet>,
    pub failure: Option<String>,
}

impl SourceReport {
    pub fn ok(networks: BTreeSet<IpNet>) -> Self {
        Self {
            networks,
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            networks: BTreeSet::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Source of a bulk range list.
#[async_trait]
pub trait BulkSource: Send + Sync {
    /// Fetch and parse the list at `url`. Never fails; see [`SourceReport`].
    async fn fetch(&self, url: &str) -> SourceReport;
}

/// HTTP client for fetching range lists
pub struct Fetcher {
    client: Client,
    retries: u32,
}

impl Fetcher {
    /// Create a fetcher with an explicit per-request timeout and attempt count.
    ///
    /// The attempt count is clamped to `1..=MAX_FETCH_RETRIES`.
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("trustwall/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            retries: retries.clamp(1, MAX_FETCH_RETRIES),
        })
    }

    /// Create a fetcher from the configured timeout and retry count
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.fetch_retries,
        )
    }

    /// Fetch content with retry logic and size validation
    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.retries {
            if attempt > 0 {
                let delay = backoff_delay_ms(attempt);
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                        continue;
                    }

                    if let Some(content_length) = response.content_length() {
                        if content_length as usize > MAX_LIST_SIZE {
                            anyhow::bail!(
                                "Response too large: {} bytes (max: {} bytes)",
                                content_length,
                                MAX_LIST_SIZE
                            );
                        }
                    }

                    let body = response
                        .text()
                        .await
                        .context("Failed to read response body")?;

                    // Content-Length is optional; check what actually arrived
                    if body.len() > MAX_LIST_SIZE {
                        anyhow::bail!(
                            "Downloaded content too large: {} bytes (max: {} bytes)",
                            body.len(),
                            MAX_LIST_SIZE
                        );
                    }

                    return Ok(body);
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped.
fn backoff_delay_ms(attempt: u32) -> u64 {
    1u64.checked_shl(attempt.saturating_sub(1))
        .map_or(MAX_RETRY_DELAY_MS, |factor| {
            RETRY_DELAY_MS.saturating_mul(factor).min(MAX_RETRY_DELAY_MS)
        })
}

#[async_trait]
impl BulkSource for Fetcher {
    async fn fetch(&self, url: &str) -> SourceReport {
        info!("Fetching {}...", url);

        match self.fetch_with_retry(url).await {
            Ok(content) => SourceReport::ok(parse_range_list(&content)),
            Err(e) => SourceReport::failed(format!("{:#}", e)),
        }
    }
}

/// Parse a range list: one IP or CIDR per line.
///
/// Blank lines and `#` comments are skipped; anything else that does not
/// parse is dropped silently.
pub fn parse_range_list(content: &str) -> BTreeSet<IpNet> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| validate_ip_or_cidr(line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOUDFLARE_V4_SAMPLE: &str = "173.245.48.0/20\n103.21.244.0/22\n103.22.200.0/22\n";

    #[test]
    fn test_parse_range_list_cidrs() {
        let nets = parse_range_list(CLOUDFLARE_V4_SAMPLE);
        assert_eq!(nets.len(), 3);
        assert!(nets.contains(&"173.245.48.0/20".parse().unwrap()));
    }

    #[test]
    fn test_parse_range_list_invalid_line_dropped() {
        let content = "173.245.48.0/20\n<html>oops</html>\n103.21.244.0/22\n10.0.0.0/33\n";
        let nets = parse_range_list(content);
        assert_eq!(nets.len(), 2);
        assert!(nets.iter().all(|n| n.to_string() != "10.0.0.0/33"));
    }

    #[test]
    fn test_parse_range_list_bare_ip_is_host_network() {
        let nets = parse_range_list("1.1.1.1\n2606:4700:4700::1111\n");
        assert!(nets.contains(&"1.1.1.1/32".parse().unwrap()));
        assert!(nets.contains(&"2606:4700:4700::1111/128".parse().unwrap()));
    }

    #[test]
    fn test_parse_range_list_whitespace_crlf_and_comments() {
        let content = "# Cloudflare\r\n  173.245.48.0/20  \r\n\r\n\t2400:cb00::/32\t\r\n";
        let nets = parse_range_list(content);
        assert_eq!(nets.len(), 2);
    }

    #[test]
    fn test_parse_range_list_no_trailing_newline() {
        let nets = parse_range_list("173.245.48.0/20\n103.21.244.0/22");
        assert_eq!(nets.len(), 2);
    }

    #[test]
    fn test_parse_range_list_empty() {
        assert!(parse_range_list("").is_empty());
        assert!(parse_range_list("\n\n").is_empty());
    }

    #[test]
    fn test_parse_range_list_deduplicates() {
        let nets = parse_range_list("1.0.0.0/24\n1.0.0.0/24\n");
        assert_eq!(nets.len(), 1);
    }

    #[test]
    fn test_source_report_constructors() {
        let report = SourceReport::failed("HTTP 503 Service Unavailable");
        assert!(report.networks.is_empty());
        assert_eq!(report.failure.as_deref(), Some("HTTP 503 Service Unavailable"));

        let report = SourceReport::ok(parse_range_list("1.1.1.1"));
        assert_eq!(report.networks.len(), 1);
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_degrades_to_empty() {
        let fetcher = Fetcher::new(Duration::from_secs(2), 1).unwrap();
        // Port 1 on loopback is closed on any sane test host
        let report = fetcher.fetch("https://127.0.0.1:1/ips-v4").await;
        assert!(report.networks.is_empty());
        assert!(report.failure.is_some());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_degrades_to_empty() {
        let fetcher = Fetcher::new(Duration::from_secs(1), 1).unwrap();
        let report = fetcher.fetch("not-a-url").await;
        assert!(report.networks.is_empty());
        assert!(report.failure.is_some());
    }

    #[test]
    fn test_from_config() {
        let config = Config::default();
        assert!(Fetcher::from_config(&config).is_ok());
    }

    #[test]
    fn test_attempts_are_bounded() {
        let fetcher = Fetcher::new(Duration::from_secs(1), 70).unwrap();
        assert_eq!(fetcher.retries, MAX_FETCH_RETRIES);

        let fetcher = Fetcher::new(Duration::from_secs(1), 0).unwrap();
        assert_eq!(fetcher.retries, 1);
    }

    #[test]
    fn test_backoff_delay_capped() {
        assert_eq!(backoff_delay_ms(1), 500);
        assert_eq!(backoff_delay_ms(2), 1000);
        assert_eq!(backoff_delay_ms(5), MAX_RETRY_DELAY_MS);
        assert_eq!(backoff_delay_ms(56), MAX_RETRY_DELAY_MS);
        assert_eq!(backoff_delay_ms(70), MAX_RETRY_DELAY_MS);
        assert_eq!(backoff_delay_ms(u32::MAX), MAX_RETRY_DELAY_MS);

        let worst_case: u64 = (1..MAX_FETCH_RETRIES).map(backoff_delay_ms).sum();
        assert!(worst_case <= 4 * MAX_RETRY_DELAY_MS);
    }

    #[tokio::test]
    async fn test_fetch_server_error_degrades_to_empty() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/ips-v4"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(2), 2).unwrap();
        let report = fetcher.fetch(&format!("{}/ips-v4", server.uri())).await;

        assert!(report.networks.is_empty());
        assert!(report.failure.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_list_drops_garbage_lines() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/ips-v4"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("173.245.48.0/20\nnot-a-network\n103.21.244.0/22\n"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(2), 1).unwrap();
        let report = fetcher.fetch(&format!("{}/ips-v4", server.uri())).await;

        assert!(report.failure.is_none());
        assert_eq!(
            report.networks,
            BTreeSet::from([
                "103.21.244.0/22".parse().unwrap(),
                "173.245.48.0/20".parse().unwrap(),
            ])
        );
    }

    #[tokio::test]
    async fn test_fetch_oversized_list_rejected() {
        let server = wiremock::MockServer::start().await;
        let mut body = "173.245.48.0/20\n".repeat(MAX_LIST_SIZE / 16);
        body.push_str("103.21.244.0/22\n");
        assert!(body.len() > MAX_LIST_SIZE);
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5), 1).unwrap();
        let report = fetcher.fetch(&format!("{}/ips-v4", server.uri())).await;

        assert!(report.networks.is_empty());
        assert!(report.failure.unwrap().contains("too large"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ipv4_cidr_string_strategy() -> impl Strategy<Value = String> {
        (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255, 0u8..=32)
            .prop_map(|(a, b, c, d, prefix)| format!("{}.{}.{}.{}/{}", a, b, c, d, prefix))
    }

    fn list_content_strategy(max_lines: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                ipv4_cidr_string_strategy(),
                Just("# comment".to_string()),
                Just("".to_string()),
                "[a-z<>/ ]{1,20}",
            ],
            0..max_lines,
        )
        .prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        /// Every valid CIDR line survives parsing
        #[test]
        fn prop_valid_cidr_kept(cidr in ipv4_cidr_string_strategy()) {
            let nets = parse_range_list(&format!("garbage\n{}\n", cidr));
            prop_assert_eq!(nets.len(), 1);
        }

        /// Whatever comes back is safe to render into a ruleset
        #[test]
        fn prop_parsed_results_render_safely(content in list_content_strategy(50)) {
            for net in parse_range_list(&content) {
                prop_assert!(crate::validation::is_safe_nft_element(&net.to_string()));
            }
        }
    }
}
