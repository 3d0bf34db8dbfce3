//! Known EVM networks and USDC token deployments.

use agora::chain::ChainId;
use agora::networks::{NetworkInfo, NetworkRegistry};
use alloy_primitives::{Address, address};

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Ethereum Sepolia (testnet) chain ID.
pub const ETHEREUM_SEPOLIA: ChainId = 11_155_111;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: ChainId = 84532;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: ChainId = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: ChainId = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: ChainId = 43113;

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Ethereum Sepolia.
pub const USDC_ETHEREUM_SEPOLIA: Address = address!("1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Polygon Amoy.
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF");

/// USDC contract address on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

/// USDC contract address on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");

/// Default EIP-712 domain name for USDC.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// Every EVM network the marketplace pays on or registers against.
pub const EVM_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "ethereum",
        chain_id: ETHEREUM_MAINNET,
    },
    NetworkInfo {
        name: "sepolia",
        chain_id: ETHEREUM_SEPOLIA,
    },
    NetworkInfo {
        name: "base",
        chain_id: BASE_MAINNET,
    },
    NetworkInfo {
        name: "base-sepolia",
        chain_id: BASE_SEPOLIA,
    },
    NetworkInfo {
        name: "polygon",
        chain_id: POLYGON_MAINNET,
    },
    NetworkInfo {
        name: "polygon-amoy",
        chain_id: POLYGON_AMOY,
    },
    NetworkInfo {
        name: "avalanche",
        chain_id: AVALANCHE_MAINNET,
    },
    NetworkInfo {
        name: "avalanche-fuji",
        chain_id: AVALANCHE_FUJI,
    },
];

/// A registry of [`EVM_NETWORKS`].
#[must_use]
pub fn evm_registry() -> NetworkRegistry {
    NetworkRegistry::from_networks(EVM_NETWORKS)
}

/// The USDC deployment on `chain_id`, if known.
#[must_use]
pub const fn usdc_address(chain_id: ChainId) -> Option<Address> {
    match chain_id {
        ETHEREUM_MAINNET => Some(USDC_ETHEREUM),
        ETHEREUM_SEPOLIA => Some(USDC_ETHEREUM_SEPOLIA),
        BASE_MAINNET => Some(USDC_BASE),
        BASE_SEPOLIA => Some(USDC_BASE_SEPOLIA),
        POLYGON_MAINNET => Some(USDC_POLYGON),
        POLYGON_AMOY => Some(USDC_POLYGON_AMOY),
        AVALANCHE_MAINNET => Some(USDC_AVALANCHE),
        AVALANCHE_FUJI => Some(USDC_AVALANCHE_FUJI),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_network_has_usdc() {
        for network in EVM_NETWORKS {
            assert!(usdc_address(network.chain_id).is_some(), "{}", network.name);
        }
        assert_eq!(usdc_address(999), None);
    }

    #[test]
    fn test_registry_resolves_v1_names() {
        let registry = evm_registry();
        assert_eq!(registry.resolve("base-sepolia"), Some(BASE_SEPOLIA));
        assert_eq!(registry.resolve("eip155:11155111"), Some(ETHEREUM_SEPOLIA));
        assert_eq!(registry.len(), EVM_NETWORKS.len());
    }
}
