// src/probe/prober.rs
use crate::config::ProbeConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Target answered 200 through the proxy.
    Alive { latency: Duration },
    /// Target answered, but not with 200.
    Rejected { status: u16 },
    Failed(ProbeError),
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Alive { latency } => Some(latency.as_millis() as u64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    #[error("probe timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// One liveness + latency check of a candidate proxy.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, candidate: &str) -> ProbeOutcome;
}

/// Sends a GET to the validation target with the candidate installed as forwarding proxy.
pub struct HttpProber {
    target: Url,
    timeout: Duration,
    allowed_schemes: Vec<String>,
}

impl HttpProber {
    pub fn new(config: &ProbeConfig, allowed_schemes: &[String]) -> Result<Self> {
        let target = Url::parse(&config.target_url).context("Invalid probe target URL")?;

        Ok(Self {
            target,
            timeout: config.timeout(),
            allowed_schemes: allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        })
    }

    fn client_for(&self, candidate: &str) -> Result<Client, ProbeError> {
        let scheme = candidate
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| ProbeError::UnsupportedScheme(candidate.to_string()))?;

        if !self.allowed_schemes.contains(&scheme) {
            return Err(ProbeError::UnsupportedScheme(scheme));
        }

        let proxy = reqwest::Proxy::all(candidate)
            .map_err(|e| ProbeError::UnsupportedScheme(format!("{scheme} ({e})")))?;

        Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, candidate: &str) -> ProbeOutcome {
        let client = match self.client_for(candidate) {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::Failed(e),
        };

        let start = Instant::now();
        let result = timeout(self.timeout, client.get(self.target.clone()).send()).await;
        let latency = start.elapsed();

        match result {
            Ok(Ok(response)) if response.status() == StatusCode::OK => {
                ProbeOutcome::Alive { latency }
            }
            Ok(Ok(response)) => ProbeOutcome::Rejected {
                status: response.status().as_u16(),
            },
            Ok(Err(e)) if e.is_timeout() => ProbeOutcome::Failed(ProbeError::Timeout),
            Ok(Err(e)) => ProbeOutcome::Failed(ProbeError::Transport(e.to_string())),
            Err(_) => ProbeOutcome::Failed(ProbeError::Timeout),
        }
    }
}
