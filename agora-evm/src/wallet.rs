//! A wallet backed by a local private key.
//!
//! [`LocalWallet`] answers the same EIP-1193 requests a browser wallet would,
//! so the signing adapter, the chain guard and the write flows can run
//! headless. Typed data is hashed with `alloy-dyn-abi` and signed locally; transactions are signed locally and broadcast through the RPC
//! endpoint configured for the active chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use agora::chain::ChainId;
use agora::wallet::{
    ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_SEND_TRANSACTION, ETH_SIGN_TYPED_DATA_V4, WALLET_SWITCH_CHAIN,
    WalletError, WalletTransport, format_quantity, parse_quantity,
};
use alloy_dyn_abi::TypedData;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::{info, instrument};
use url::Url;

/// Errors raised while constructing a [`LocalWallet`].
#[derive(Debug, thiserror::Error)]
pub enum LocalWalletError {
    /// The private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(#[from] alloy_signer_local::LocalSignerError),
}

/// Provider error code for a request naming an account this wallet does not hold.
const UNAUTHORIZED_CODE: i64 = 4100;

/// An in-process wallet holding one private key.
#[derive(Debug)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
    active_chain: AtomicU64,
    initial_chain: ChainId,
    rpc_urls: HashMap<ChainId, Url>,
}

impl LocalWallet {
    /// Creates a wallet starting on `chain_id` with no RPC endpoints.
    #[must_use]
    pub fn new(signer: PrivateKeySigner, chain_id: ChainId) -> Self {
        Self {
            signer,
            active_chain: AtomicU64::new(chain_id),
            initial_chain: chain_id,
            rpc_urls: HashMap::new(),
        }
    }

    /// Creates a wallet from a hex private key.
    ///
    /// # Errors
    ///
    /// Returns [`LocalWalletError::InvalidKey`] if the key does not parse.
    pub fn from_private_key(key: &str, chain_id: ChainId) -> Result<Self, LocalWalletError> {
        let signer: PrivateKeySigner = key.trim().parse()?;
        Ok(Self::new(signer, chain_id))
    }

    /// Registers the RPC endpoint for `chain_id`, making it a valid switch target.
    #[must_use]
    pub fn with_rpc_url(mut self, chain_id: ChainId, url: Url) -> Self {
        self.rpc_urls.insert(chain_id, url);
        self
    }

    /// The wallet's only account.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The chain the wallet currently signs for.
    #[must_use]
    pub fn active_chain(&self) -> ChainId {
        self.active_chain.load(Ordering::Acquire)
    }

    fn knows_chain(&self, chain_id: ChainId) -> bool {
        chain_id == self.initial_chain || self.rpc_urls.contains_key(&chain_id)
    }

    fn check_account(&self, value: &Value) -> Result<(), WalletError> {
        let account: Address = serde_json::from_value(value.clone())
            .map_err(|e| WalletError::InvalidResponse(format!("bad account parameter: {e}")))?;
        if account == self.address() {
            Ok(())
        } else {
            Err(WalletError::Rpc {
                code: UNAUTHORIZED_CODE,
                message: format!("account {account} is not held by this wallet"),
            })
        }
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, WalletError> {
        let target = parse_quantity(&params[0]["chainId"])?;
        if !self.knows_chain(target) {
            return Err(WalletError::UnrecognizedChain(format_quantity(target)));
        }
        self.active_chain.store(target, Ordering::Release);

        #[cfg(feature = "telemetry")]
        info!(chain_id = target, "Local wallet switched chain");

        Ok(Value::Null)
    }

    fn sign_typed_data(&self, params: &Value) -> Result<Value, WalletError> {
        self.check_account(&params[0])?;
        let parsed = match &params[1] {
            Value::String(text) => serde_json::from_str::<TypedData>(text),
            other => serde_json::from_value::<TypedData>(other.clone()),
        };
        let typed = parsed.map_err(|e| WalletError::Rpc {
            code: -32602,
            message: e.to_string(),
        })?;
        let hash = typed.eip712_signing_hash().map_err(|e| WalletError::Rpc {
            code: -32602,
            message: e.to_string(),
        })?;
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::Rpc {
                code: -32603,
                message: e.to_string(),
            })?;
        Ok(json!(Bytes::copy_from_slice(&signature.as_bytes())))
    }

    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(chain_id = self.active_chain())))]
    async fn send_transaction(&self, params: &Value) -> Result<Value, WalletError> {
        let tx = &params[0];
        self.check_account(&tx["from"])?;
        let to: Address = serde_json::from_value(tx["to"].clone())
            .map_err(|e| WalletError::InvalidResponse(format!("bad `to`: {e}")))?;
        let data: Bytes = match &tx["data"] {
            Value::Null => Bytes::new(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| WalletError::InvalidResponse(format!("bad `data`: {e}")))?,
        };

        let chain_id = self.active_chain();
        let url = self.rpc_urls.get(&chain_id).ok_or_else(|| {
            WalletError::Transport(format!("no RPC endpoint configured for chain {chain_id}"))
        })?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(url.clone());

        let request = TransactionRequest::default()
            .with_from(self.address())
            .with_to(to)
            .with_input(data)
            .with_chain_id(chain_id);
        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        #[cfg(feature = "telemetry")]
        info!(tx_hash = %pending.tx_hash(), "Transaction broadcast");

        Ok(json!(pending.tx_hash()))
    }
}

#[async_trait::async_trait]
impl WalletTransport for LocalWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        match method {
            ETH_ACCOUNTS => Ok(json!([self.address()])),
            ETH_CHAIN_ID => Ok(json!(format_quantity(self.active_chain()))),
            WALLET_SWITCH_CHAIN => self.switch_chain(&params),
            ETH_SIGN_TYPED_DATA_V4 => self.sign_typed_data(&params),
            ETH_SEND_TRANSACTION => self.send_transaction(&params).await,
            other => Err(WalletError::Unsupported(other.to_owned())),
        }
    }
}
