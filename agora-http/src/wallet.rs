//! A wallet reached through a JSON-RPC bridge.
//!
//! Each EIP-1193 request is posted as a JSON-RPC 2.0 call to the bridge URL.
//! Provider errors in the reply keep their code, so a user rejection on the
//! other side still surfaces as [`WalletError::UserRejected`].

use std::sync::atomic::{AtomicU64, Ordering};

use agora::wallet::{WalletError, WalletTransport};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// [`WalletTransport`] forwarding requests to a JSON-RPC endpoint.
#[derive(Debug)]
pub struct JsonRpcWallet {
    url: Url,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcWallet {
    /// Creates a wallet bridged through `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self::with_client(url, Client::new())
    }

    /// Creates a wallet bridged through `url` over an existing client.
    #[must_use]
    pub const fn with_client(url: Url, client: Client) -> Self {
        Self {
            url,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    /// The bridge URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl WalletTransport for JsonRpcWallet {
    #[cfg_attr(feature = "telemetry", instrument(name = "agora.wallet.rpc", skip(self, params), err))]
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("wallet bridge request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(format!("wallet bridge json decode failed: {e}")))?;

        if let Some(error) = body.get("error") {
            let error: RpcError = serde_json::from_value(error.clone())
                .map_err(|_| WalletError::InvalidResponse(format!("malformed error: {error}")))?;

            #[cfg(feature = "telemetry")]
            debug!(code = error.code, message = %error.message, "Wallet bridge returned error");

            return Err(WalletError::from_rpc(error.code, error.message));
        }
        if !status.is_success() {
            return Err(WalletError::Transport(format!(
                "wallet bridge status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| WalletError::InvalidResponse("missing result".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use agora::chain::ChainGuard;
    use agora::wallet;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn bridge() -> (MockServer, JsonRpcWallet) {
        let server = MockServer::start().await;
        let wallet = JsonRpcWallet::new(server.uri().parse().unwrap());
        (server, wallet)
    }

    #[tokio::test]
    async fn test_result_is_returned() {
        let (server, wallet) = bridge().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "jsonrpc": "2.0", "method": "eth_chainId" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x14a34"
            })))
            .mount(&server)
            .await;

        assert_eq!(wallet::chain_id(&wallet).await.unwrap(), 84532);
    }

    #[tokio::test]
    async fn test_provider_error_codes_are_kept() {
        let (server, wallet) = bridge().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_chainId" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "wallet_switchEthereumChain" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": { "code": 4001, "message": "User rejected the request." }
            })))
            // Once from the guard, once from the direct switch below.
            .expect(2)
            .mount(&server)
            .await;

        let guard = ChainGuard::new(wallet);
        let err = guard.ensure(84532).await.unwrap_err();
        assert!(err.to_string().contains("84532"));
        assert!(matches!(
            wallet::switch_chain(guard.wallet(), 84532).await,
            Err(WalletError::UserRejected)
        ));
    }

    #[tokio::test]
    async fn test_missing_result_and_bad_status() {
        let (server, wallet) = bridge().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_accounts" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_chainId" })))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({ "detail": "down" })))
            .mount(&server)
            .await;

        assert!(matches!(
            wallet.request("eth_accounts", json!([])).await,
            Err(WalletError::InvalidResponse(_))
        ));
        assert!(matches!(
            wallet.request("eth_chainId", json!([])).await,
            Err(WalletError::Transport(_))
        ));
    }
}
