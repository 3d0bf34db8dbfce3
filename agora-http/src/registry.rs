//! Read-only lookups against the agent registry.
//!
//! Reads are cached for a short TTL. When a read fails the client answers with
//! fixed sample data instead, tagged [`RegistryRead::Fallback`] so callers can
//! tell degraded answers apart. Fallback answers are never cached.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use http::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
#[cfg(feature = "telemetry")]
use tracing::{info, instrument, warn};
use url::Url;

use crate::backend::{BackendError, join, normalize_base_url, send_json};
use crate::constants::{AGENTS_PATH, DEFAULT_REGISTRY_CACHE_TTL};

/// A registered agent as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    /// On-chain agent ID.
    pub agent_id: u64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Registration document URI.
    #[serde(default, rename = "agentURI", alias = "agentUri")]
    pub agent_uri: Option<String>,
    /// Owning account.
    #[serde(default)]
    pub owner: Option<Address>,
    /// Service categories offered.
    #[serde(default)]
    pub services: Vec<String>,
}

/// Aggregated feedback for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSummary {
    /// On-chain agent ID.
    pub agent_id: u64,
    /// Number of feedback entries.
    pub count: u64,
    /// Mean score, already scaled by its decimals.
    pub average_score: f64,
}

/// The answer to a registry read.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryRead<T> {
    /// Data read from the registry.
    OnChain(T),
    /// Sample data served because the read failed.
    Fallback(T),
}

impl<T> RegistryRead<T> {
    /// Whether this is sample data.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// The data, regardless of provenance.
    pub const fn get(&self) -> &T {
        match self {
            Self::OnChain(value) | Self::Fallback(value) => value,
        }
    }

    /// Consumes the read, returning the data.
    pub fn into_inner(self) -> T {
        match self {
            Self::OnChain(value) | Self::Fallback(value) => value,
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// A keyed TTL cache.
///
/// Each clone has an independent cache state.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key` if it has not expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let guard = self.entries.read().await;
        let entry = guard.get(key)?;
        (Instant::now() < entry.expires_at).then(|| entry.value.clone())
    }

    /// Stores `value` under `key` for one TTL, dropping expired entries.
    pub async fn set(&self, key: &str, value: V) {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| now < entry.expires_at);
        guard.insert(
            key.to_owned(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl<V: Clone> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// A client for the registry read endpoints.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    agents_url: Url,
    agent_base_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
    agents: TtlCache<Vec<AgentSummary>>,
    details: TtlCache<AgentSummary>,
    reputations: TtlCache<ReputationSummary>,
}

impl RegistryClient {
    /// Constructs a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UrlParse`] if the agents URL cannot be built.
    pub fn try_new(base_url: &Url) -> Result<Self, BackendError> {
        let agents_url = join(base_url, AGENTS_PATH, "Failed to construct agents URL")?;
        // Trailing slash so per-agent paths join beneath it.
        let agent_base_url = join(
            base_url,
            &format!("{AGENTS_PATH}/"),
            "Failed to construct agents URL",
        )?;
        Ok(Self {
            agents_url,
            agent_base_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
            agents: TtlCache::new(DEFAULT_REGISTRY_CACHE_TTL),
            details: TtlCache::new(DEFAULT_REGISTRY_CACHE_TTL),
            reputations: TtlCache::new(DEFAULT_REGISTRY_CACHE_TTL),
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL of every cache, dropping what they hold.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.agents = TtlCache::new(ttl);
        self.details = TtlCache::new(ttl);
        self.reputations = TtlCache::new(ttl);
        self
    }

    /// Lists registered agents.
    #[cfg_attr(feature = "telemetry", instrument(name = "agora.registry.agents", skip_all))]
    pub async fn agents(&self) -> RegistryRead<Vec<AgentSummary>> {
        let url = self.agents_url.clone();
        self.read(&self.agents, url, "GET api/agents", fallback_agents)
            .await
    }

    /// Reads one agent.
    #[cfg_attr(feature = "telemetry", instrument(name = "agora.registry.agent", skip(self)))]
    pub async fn agent(&self, agent_id: u64) -> RegistryRead<AgentSummary> {
        match self.agent_url(agent_id, "") {
            Ok(url) => {
                self.read(&self.details, url, "GET api/agents/{id}", || {
                    fallback_agent(agent_id)
                })
                .await
            }
            Err(_) => RegistryRead::Fallback(fallback_agent(agent_id)),
        }
    }

    /// Reads one agent's reputation summary.
    #[cfg_attr(feature = "telemetry", instrument(name = "agora.registry.reputation", skip(self)))]
    pub async fn reputation(&self, agent_id: u64) -> RegistryRead<ReputationSummary> {
        match self.agent_url(agent_id, "reputation") {
            Ok(url) => {
                self.read(
                    &self.reputations,
                    url,
                    "GET api/agents/{id}/reputation",
                    || fallback_reputation(agent_id),
                )
                .await
            }
            Err(_) => RegistryRead::Fallback(fallback_reputation(agent_id)),
        }
    }

    fn agent_url(&self, agent_id: u64, suffix: &str) -> Result<Url, BackendError> {
        let path = if suffix.is_empty() {
            agent_id.to_string()
        } else {
            format!("{agent_id}/{suffix}")
        };
        join(&self.agent_base_url, &path, "Failed to construct agent URL")
    }

    async fn read<V, F>(
        &self,
        cache: &TtlCache<V>,
        url: Url,
        context: &'static str,
        fallback: F,
    ) -> RegistryRead<V>
    where
        V: Clone + DeserializeOwned + Send + Sync,
        F: FnOnce() -> V + Send,
    {
        let key = url.as_str().to_owned();
        if let Some(value) = cache.get(&key).await {
            return RegistryRead::OnChain(value);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %url, "agora.registry.cache_miss");

        let mut req = self.client.get(url);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        match send_json::<V>(req, context).await {
            Ok(value) => {
                cache.set(&key, value.clone()).await;
                RegistryRead::OnChain(value)
            }
            Err(err) => {
                #[cfg(feature = "telemetry")]
                warn!(error = %err, context, "Registry read failed, serving sample data");
                #[cfg(not(feature = "telemetry"))]
                let _ = err;
                RegistryRead::Fallback(fallback())
            }
        }
    }
}

impl TryFrom<&str> for RegistryClient {
    type Error = BackendError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(&normalize_base_url(value)?)
    }
}

impl TryFrom<String> for RegistryClient {
    type Error = BackendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Sample agents served when the registry cannot be read.
#[must_use]
pub fn fallback_agents() -> Vec<AgentSummary> {
    [
        (1, "Harbor Plumbing", "Leak repair and pipe installation.", "plumbing"),
        (2, "Bright Spark Electric", "Residential wiring and fixtures.", "electrical"),
        (3, "Green Thumb Gardens", "Lawn care and seasonal planting.", "gardening"),
    ]
    .into_iter()
    .map(|(agent_id, name, description, service)| AgentSummary {
        agent_id,
        name: name.to_owned(),
        description: description.to_owned(),
        agent_uri: None,
        owner: None,
        services: vec![service.to_owned()],
    })
    .collect()
}

fn fallback_agent(agent_id: u64) -> AgentSummary {
    fallback_agents()
        .into_iter()
        .find(|agent| agent.agent_id == agent_id)
        .unwrap_or_else(|| AgentSummary {
            agent_id,
            name: format!("Agent #{agent_id}"),
            description: String::new(),
            agent_uri: None,
            owner: None,
            services: Vec::new(),
        })
}

const fn fallback_reputation(agent_id: u64) -> ReputationSummary {
    ReputationSummary {
        agent_id,
        count: 0,
        average_score: 0.0,
    }
}
