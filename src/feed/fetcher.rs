// src/feed/fetcher.rs
use crate::config::FeedConfig;
use crate::store::ProxyAddress;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed answered HTTP {0}")]
    Status(StatusCode),

    #[error("feed request timed out")]
    Timeout,

    #[error("feed transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Pulls candidate proxy addresses from a newline-delimited feed.
pub struct CandidateFetcher {
    client: Client,
    url: Url,
    allowed_schemes: Vec<String>,
}

impl CandidateFetcher {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("Invalid feed URL")?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create feed HTTP client")?;

        Ok(Self {
            client,
            url,
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        })
    }

    /// Fetch and filter the feed. Any failure is logged and yields no candidates.
    pub async fn fetch(&self) -> Vec<ProxyAddress> {
        match self.try_fetch().await {
            Ok(body) => {
                let (total, candidates) = parse_candidates(&body, &self.allowed_schemes);
                info!(
                    "Fetched {} proxies from source, {} after filtering",
                    total,
                    candidates.len()
                );
                candidates
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Failed to fetch source proxies");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self) -> Result<String, FeedError> {
        let response = self.client.get(self.url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout
            } else {
                FeedError::Transport(e)
            }
        })?;

        if response.status() != StatusCode::OK {
            return Err(FeedError::Status(response.status()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout
            } else {
                FeedError::Transport(e)
            }
        })
    }
}

/// Split a feed body into candidate addresses.
///
/// Returns the number of non-blank lines alongside the accepted candidates. A line is
/// accepted when it parses as `scheme://host:port` (port may be the scheme default),
/// its scheme is in `allowed_schemes`, and it has not been seen earlier in the body.
pub fn parse_candidates(body: &str, allowed_schemes: &[String]) -> (usize, Vec<ProxyAddress>) {
    let mut seen = HashSet::new();
    let mut total = 0;
    let mut candidates = Vec::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        total += 1;

        let Ok(url) = Url::parse(line) else {
            continue;
        };
        if url.host_str().is_none() || url.port_or_known_default().is_none() {
            continue;
        }
        if !allowed_schemes.iter().any(|s| s == url.scheme()) {
            continue;
        }
        if seen.insert(line.to_string()) {
            candidates.push(line.to_string());
        }
    }

    (total, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_schemes;

    fn fetcher_for(url: String) -> CandidateFetcher {
        CandidateFetcher::new(&FeedConfig {
            url,
            timeout_secs: 2,
            allowed_schemes: default_schemes(),
        })
        .unwrap()
    }

    #[test]
    fn drops_socks4() {
        let (total, candidates) = parse_candidates(
            "http://1.1.1.1:8080\nsocks4://2.2.2.2:1080\n",
            &default_schemes(),
        );
        assert_eq!(total, 2);
        assert_eq!(candidates, vec!["http://1.1.1.1:8080"]);
    }

    #[test]
    fn skips_blank_malformed_and_duplicate_lines() {
        let body = "  http://1.1.1.1:8080  \n\nnot a proxy\nsocks5://3.3.3.3:1080\r\nhttp://1.1.1.1:8080\nsocks5://:1080\n";
        let (total, candidates) = parse_candidates(body, &default_schemes());

        assert_eq!(total, 5);
        assert_eq!(
            candidates,
            vec!["http://1.1.1.1:8080", "socks5://3.3.3.3:1080"]
        );
    }

    #[test]
    fn honours_custom_allow_list() {
        let (_, candidates) = parse_candidates(
            "http://1.1.1.1:80\nhttps://2.2.2.2:443\n",
            &["https".to_string()],
        );
        assert_eq!(candidates, vec!["https://2.2.2.2:443"]);
    }

    #[tokio::test]
    async fn fetches_and_filters_feed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data.txt")
            .with_status(200)
            .with_body("http://1.1.1.1:8080\nsocks4://2.2.2.2:1080\n")
            .create_async()
            .await;

        let fetcher = fetcher_for(format!("{}/data.txt", server.url()));
        assert_eq!(fetcher.fetch().await, vec!["http://1.1.1.1:8080"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_yields_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/data.txt")
            .with_status(502)
            .with_body("http://1.1.1.1:8080\n")
            .create_async()
            .await;

        let fetcher = fetcher_for(format!("{}/data.txt", server.url()));
        assert!(fetcher.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_feed_yields_nothing() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = fetcher_for(format!("http://127.0.0.1:{port}/data.txt"));
        assert!(fetcher.fetch().await.is_empty());
    }
}
