//! Marketplace client configuration.
//!
//! Read from a TOML file. String values may reference environment variables
//! as `$VAR` or `${VAR}`; references to unset variables are kept verbatim.
//!
//! # Example Configuration
//!
//! ```toml
//! backend_url = "https://api.agora.example"
//! registry_cache_ttl_secs = 60
//!
//! [identity]
//! chain_id = 11155111
//!
//! [payment]
//! timeout_secs = 30
//! max_amount = "5000000"
//!
//! [wallet]
//! private_key = "$AGORA_PRIVATE_KEY"
//!
//! [wallet.rpc_urls]
//! "eip155:11155111" = "https://ethereum-sepolia-rpc.publicnode.com"
//! "eip155:84532" = "https://sepolia.base.org"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `agora.toml`)
//! - `AGORA_BACKEND_URL` - Overrides `backend_url`

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use agora::chain::ChainId;
use agora::proto::TokenAmount;
use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CONFIG";

/// Configuration file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "agora.toml";

/// Environment variable overriding [`MarketConfig::backend_url`].
pub const BACKEND_URL_ENV: &str = "AGORA_BACKEND_URL";

/// Errors raised while loading [`MarketConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Backend base URL (default: `http://localhost:3001`).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Identity and reputation registry deployment.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Payment client settings.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// How long registry reads are cached, in seconds (default: 60).
    #[serde(default = "default_cache_ttl_secs")]
    pub registry_cache_ttl_secs: u64,

    /// Signing wallet.
    #[serde(default)]
    pub wallet: WalletConfig,
}

/// Where the registries live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Chain the registries are deployed on (default: Ethereum Sepolia).
    #[serde(default = "default_identity_chain")]
    pub chain_id: ChainId,

    /// Identity registry address.
    #[serde(default = "default_identity_registry")]
    pub identity_registry: Address,

    /// Reputation registry address.
    #[serde(default = "default_reputation_registry")]
    pub reputation_registry: Address,
}

/// Payment client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Largest amount, in token base units, the client will sign for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<TokenAmount>,
}

/// The signing wallet: a local key, or a JSON-RPC wallet bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Hex private key for a local wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Chain the local wallet starts on (default: the identity chain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,

    /// RPC endpoints keyed by CAIP-2 network identifier.
    #[serde(default)]
    pub rpc_urls: HashMap<String, String>,

    /// URL of a JSON-RPC wallet bridge. Takes precedence over `private_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

fn default_backend_url() -> String {
    "http://localhost:3001".to_owned()
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

const fn default_identity_chain() -> ChainId {
    11_155_111
}

const fn default_identity_registry() -> Address {
    address!("0x8004A818BFB912233c491871b3d84c89A494BD9e")
}

const fn default_reputation_registry() -> Address {
    address!("0x8004B663056A597Dffe9eCcC1965A193B7388713")
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            chain_id: default_identity_chain(),
            identity_registry: default_identity_registry(),
            reputation_registry: default_reputation_registry(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_amount: None,
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            identity: IdentityConfig::default(),
            payment: PaymentConfig::default(),
            registry_cache_ttl_secs: default_cache_ttl_secs(),
            wallet: WalletConfig::default(),
        }
    }
}

impl MarketConfig {
    /// Loads the file named by `CONFIG`, or `agora.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        Self::load_from(&path)
    }

    /// Loads `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parses `content`, resolving variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the expanded text is not valid configuration.
    pub fn parse<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(&expand_vars(content, &lookup))?;
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|url| !url.is_empty()) {
            config.backend_url = url;
        }
        Ok(config)
    }

    /// The payment request timeout.
    #[must_use]
    pub const fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment.timeout_secs)
    }

    /// How long registry reads are cached.
    #[must_use]
    pub const fn registry_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_cache_ttl_secs)
    }
}

/// Replaces `$NAME` and `${NAME}` with `lookup(NAME)`.
fn expand_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, reference_len) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let reference = &rest[pos..=pos + reference_len];
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(reference),
        }
        rest = &rest[pos + 1 + reference_len..];
    }

    out.push_str(rest);
    out
}
