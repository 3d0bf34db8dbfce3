//! Network name registry.
//!
//! Payment requirements name their network either as a CAIP-2 identifier
//! (`eip155:84532`) or, in the older envelope, as a human-readable name
//! (`base-sepolia`). [`NetworkRegistry`] resolves both to a chain ID.
//!
//! Concrete network data lives in `agora-evm` (`agora_evm::EVM_NETWORKS`).

use std::collections::HashMap;

use crate::chain::{ChainId, caip2, parse_caip2};

/// A known network with its chain ID and human-readable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g., "base-sepolia").
    pub name: &'static str,
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
}

impl NetworkInfo {
    /// The CAIP-2 identifier of this network.
    #[must_use]
    pub fn caip2(&self) -> String {
        caip2(self.chain_id)
    }
}

/// Maps network names to chain IDs and back.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    name_to_chain_id: HashMap<&'static str, ChainId>,
    chain_id_to_name: HashMap<ChainId, &'static str>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated from a network slice.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        registry.register(networks);
        registry
    }

    /// Registers additional networks.
    pub fn register(&mut self, networks: &[NetworkInfo]) {
        for info in networks {
            self.name_to_chain_id.insert(info.name, info.chain_id);
            self.chain_id_to_name.insert(info.chain_id, info.name);
        }
    }

    /// Looks up a chain ID by network name.
    #[must_use]
    pub fn chain_id_by_name(&self, name: &str) -> Option<ChainId> {
        self.name_to_chain_id.get(name).copied()
    }

    /// Looks up a network name by chain ID.
    #[must_use]
    pub fn name_by_chain_id(&self, chain_id: ChainId) -> Option<&'static str> {
        self.chain_id_to_name.get(&chain_id).copied()
    }

    /// Resolves a CAIP-2 identifier or network name to a registered chain ID.
    #[must_use]
    pub fn resolve(&self, network: &str) -> Option<ChainId> {
        parse_caip2(network)
            .filter(|id| self.chain_id_to_name.contains_key(id))
            .or_else(|| self.chain_id_by_name(network))
    }

    /// Number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.name_to_chain_id.len()
    }

    /// Whether no networks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_to_chain_id.is_empty()
    }
}
