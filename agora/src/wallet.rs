//! Wallet provider abstraction.
//!
//! Every wallet interaction in the marketplace goes through a single
//! request/response method keyed by an EIP-1193 method name. Browser-style
//! wallets, JSON-RPC proxies and in-process signers all sit behind
//! [`WalletTransport`]; callers never depend on a concrete wallet.

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use serde_json::{Value, json};

/// `eth_accounts`
pub const ETH_ACCOUNTS: &str = "eth_accounts";
/// `eth_chainId`
pub const ETH_CHAIN_ID: &str = "eth_chainId";
/// `wallet_switchEthereumChain`
pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
/// `eth_signTypedData_v4`
pub const ETH_SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";
/// `eth_sendTransaction`
pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";

/// Provider error code for a request the user declined.
pub const USER_REJECTED_CODE: i64 = 4001;
/// Provider error code for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
/// Provider error code for an unsupported method.
pub const UNSUPPORTED_METHOD_CODE: i64 = 4200;

/// Errors surfaced by a wallet provider.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The user declined the request.
    #[error("user rejected the request")]
    UserRejected,
    /// The wallet does not know the requested chain.
    #[error("unrecognized chain: {0}")]
    UnrecognizedChain(String),
    /// The wallet does not implement the method.
    #[error("unsupported wallet method: {0}")]
    Unsupported(String),
    /// Any other provider error.
    #[error("wallet error {code}: {message}")]
    Rpc {
        /// Provider error code.
        code: i64,
        /// Provider error message.
        message: String,
    },
    /// The wallet could not be reached.
    #[error("wallet transport error: {0}")]
    Transport(String),
    /// The wallet answered with something the caller cannot interpret.
    #[error("invalid wallet response: {0}")]
    InvalidResponse(String),
}

impl WalletError {
    /// Maps a provider `{code, message}` error onto the matching variant.
    #[must_use]
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            USER_REJECTED_CODE => Self::UserRejected,
            UNRECOGNIZED_CHAIN_CODE => Self::UnrecognizedChain(message),
            UNSUPPORTED_METHOD_CODE => Self::Unsupported(message),
            _ => Self::Rpc { code, message },
        }
    }

    /// The EIP-1193 code this error corresponds to, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::UserRejected => Some(USER_REJECTED_CODE),
            Self::UnrecognizedChain(_) => Some(UNRECOGNIZED_CHAIN_CODE),
            Self::Unsupported(_) => Some(UNSUPPORTED_METHOD_CODE),
            Self::Rpc { code, .. } => Some(*code),
            Self::Transport(_) | Self::InvalidResponse(_) => None,
        }
    }
}

/// A wallet reachable through EIP-1193 style requests.
#[async_trait::async_trait]
pub trait WalletTransport: Send + Sync {
    /// Sends one request and returns the provider's result value.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError`] if the provider rejects or cannot serve the request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

#[async_trait::async_trait]
impl<T: WalletTransport + ?Sized> WalletTransport for Arc<T> {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        (**self).request(method, params).await
    }
}

#[async_trait::async_trait]
impl<T: WalletTransport + ?Sized> WalletTransport for &T {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        (**self).request(method, params).await
    }
}

/// A transaction to submit through `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sending account.
    pub from: Address,
    /// Contract address.
    pub to: Address,
    /// Encoded calldata.
    pub data: Bytes,
}

impl TransactionRequest {
    /// The JSON parameter object for `eth_sendTransaction`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "from": self.from,
            "to": self.to,
            "data": self.data,
        })
    }
}

/// Outcome of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionResult {
    /// Transaction hash reported by the wallet.
    pub hash: B256,
    /// Chain the transaction was submitted on.
    pub chain_id: u64,
    /// Contract the transaction called.
    pub to: Address,
}

/// Reads the wallet's active chain.
///
/// # Errors
///
/// Returns [`WalletError`] if the request fails or the result is not a quantity.
pub async fn chain_id<W: WalletTransport + ?Sized>(wallet: &W) -> Result<u64, WalletError> {
    let value = wallet.request(ETH_CHAIN_ID, json!([])).await?;
    parse_quantity(&value)
}

/// Reads the wallet's accounts.
///
/// # Errors
///
/// Returns [`WalletError`] if the request fails or the result is not an address list.
pub async fn accounts<W: WalletTransport + ?Sized>(wallet: &W) -> Result<Vec<Address>, WalletError> {
    let value = wallet.request(ETH_ACCOUNTS, json!([])).await?;
    serde_json::from_value(value).map_err(|e| WalletError::InvalidResponse(e.to_string()))
}

/// Asks the wallet to switch to `chain_id`.
///
/// # Errors
///
/// Returns [`WalletError`] if the wallet declines or does not know the chain.
pub async fn switch_chain<W: WalletTransport + ?Sized>(
    wallet: &W,
    chain_id: u64,
) -> Result<(), WalletError> {
    wallet
        .request(
            WALLET_SWITCH_CHAIN,
            json!([{ "chainId": format_quantity(chain_id) }]),
        )
        .await?;
    Ok(())
}

/// Submits a transaction and returns its hash.
///
/// # Errors
///
/// Returns [`WalletError`] if the wallet rejects the transaction or answers
/// with something other than a 32-byte hash.
pub async fn send_transaction<W: WalletTransport + ?Sized>(
    wallet: &W,
    chain_id: u64,
    tx: &TransactionRequest,
) -> Result<TransactionResult, WalletError> {
    let value = wallet
        .request(ETH_SEND_TRANSACTION, json!([tx.to_json()]))
        .await?;
    let hash: B256 =
        serde_json::from_value(value).map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
    Ok(TransactionResult {
        hash,
        chain_id,
        to: tx.to,
    })
}

/// Parses a JSON-RPC quantity: a `0x` hex string, or a plain number.
///
/// # Errors
///
/// Returns [`WalletError::InvalidResponse`] for anything else.
pub fn parse_quantity(value: &Value) -> Result<u64, WalletError> {
    let invalid = || WalletError::InvalidResponse(format!("not a quantity: {value}"));
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid()),
            None => s.parse().map_err(|_| invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Formats a quantity as a `0x` hex string.
#[must_use]
pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}
