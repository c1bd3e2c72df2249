//! Latency-based resolver for control-plane instances

use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use udpu_shared::{pubsub, timing, ServiceRecord};

use crate::backoff::Backoff;
use crate::error::{AgentError, AgentResult};

/// A reachable control-plane instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub service_class: String,
}

impl Endpoint {
    /// `http://host:port{path}`
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    /// `ws://host:port{path}`
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}:{}{}", self.host, self.port, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Bootstrap registry host
    pub bootstrap_host: String,
    /// Bootstrap registry port
    pub bootstrap_port: u16,
    /// Bound on each health probe and on the candidate list request
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bootstrap_host: "127.0.0.1".into(),
            bootstrap_port: 8880,
            probe_timeout: Duration::from_millis(timing::PROBE_TIMEOUT_MS),
        }
    }
}

/// Resolves the nearest healthy instance of a service class
pub struct Resolver {
    config: DiscoveryConfig,
    client: Client,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(config: DiscoveryConfig) -> AgentResult<Self> {
        let client = Client::builder().timeout(config.probe_timeout).build()?;
        Ok(Self { config, client })
    }

    /// Fetch the candidate list for a service class from the registry
    pub async fn fetch_candidates(&self, service_class: &str) -> AgentResult<Vec<ServiceRecord>> {
        let url = format!(
            "http://{}:{}{}",
            self.config.bootstrap_host,
            self.config.bootstrap_port,
            pubsub::SERVICES_PATH
        );
        debug!("Requesting {} candidates from {}", service_class, url);

        let response = self
            .client
            .get(&url)
            .query(&[("service_type", service_class)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AgentError::Decode(e.to_string()))
    }

    /// Probe one candidate's health endpoint and return the round-trip time
    pub async fn probe(&self, endpoint: &Endpoint) -> AgentResult<Duration> {
        let url = endpoint.http_url(pubsub::HEALTH_PATH);
        let start = Instant::now();

        let response = self.client.get(&url).send().await?;
        let elapsed = start.elapsed();

        if !response.status().is_success() {
            return Err(AgentError::Transport(format!(
                "{} answered {}",
                endpoint,
                response.status()
            )));
        }
        Ok(elapsed)
    }

    /// Resolve the fastest healthy instance, or `None` if no candidate answered
    pub async fn resolve(&self, service_class: &str) -> Option<Endpoint> {
        let candidates = match self.fetch_candidates(service_class).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Can't get list of {} instances: {}", service_class, e);
                return None;
            }
        };

        let mut probes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(port) = candidate.port.as_u16() else {
                warn!(
                    "Skipping {}: invalid port {:?}",
                    candidate.host, candidate.port
                );
                continue;
            };
            let endpoint = Endpoint {
                host: candidate.host,
                port,
                service_class: service_class.to_string(),
            };

            let rtt = match self.probe(&endpoint).await {
                Ok(rtt) => {
                    debug!("Probe {} ok in {:?}", endpoint, rtt);
                    Some(rtt)
                }
                Err(e) => {
                    debug!("Probe {} failed: {}", endpoint, e);
                    None
                }
            };
            probes.push((endpoint, rtt));
        }

        let best = select_fastest(probes);
        match &best {
            Some(endpoint) => info!("Nearest {}: {}", service_class, endpoint),
            None => warn!("{}", AgentError::NotFound(service_class.to_string())),
        }
        best
    }

    /// Resolve, retrying with the backoff policy until an instance is found
    pub async fn resolve_until_found(
        &self,
        service_class: &str,
        backoff: &mut dyn Backoff,
    ) -> Endpoint {
        loop {
            info!("Trying to discover {} instance", service_class);
            if let Some(endpoint) = self.resolve(service_class).await {
                backoff.reset();
                return endpoint;
            }

            let delay = backoff.next_delay();
            info!("No {} discovered, retrying in {:?}", service_class, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Pick the candidate with the lowest successful round-trip time.
///
/// Failed probes (`None`) are excluded; ties go to the earliest candidate.
pub fn select_fastest<I>(probes: I) -> Option<Endpoint>
where
    I: IntoIterator<Item = (Endpoint, Option<Duration>)>,
{
    let mut best: Option<(Endpoint, Duration)> = None;
    for (endpoint, rtt) in probes {
        let Some(rtt) = rtt else { continue };
        match &best {
            Some((_, best_rtt)) if rtt >= *best_rtt => {}
            _ => best = Some((endpoint, rtt)),
        }
    }
    best.map(|(endpoint, _)| endpoint)
}
