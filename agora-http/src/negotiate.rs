//! The pay-per-request negotiation client.
//!
//! [`PaymentClient::fetch`] drives one negotiation episode:
//!
//! ```text
//! Init --probe 2xx--> SettledDirect
//! Init --probe 402--> Negotiating --sign--> Signed --retry 2xx--> Settled
//! Init --probe other--> Failed
//! Signed --retry non-2xx--> Failed
//! ```
//!
//! The probe and the retry are each bounded by the client's timeout. The retry
//! is sent exactly once; a rejected proof ends the episode and no second
//! authorization is signed. Calling `fetch` again starts a fresh episode with a
//! fresh nonce.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use agora::authorization::sign_transfer_authorization;
use agora::chain::ChainId;
use agora::eip712::{Eip712Signer, SignError};
use agora::encoding::EnvelopeError;
use agora::networks::NetworkRegistry;
use agora::proto::{
    PaymentProof, PaymentRequired, PaymentRequirement, SettlementResult, TokenAmount,
};
use http::StatusCode;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, warn};

use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{HttpError, TransportError};
use crate::headers::{payment_required_from_headers, proof_header, settlement_from_headers};
use crate::transport::{HttpTransport, ResourceRequest, ResourceResponse};

/// Where a negotiation episode stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing sent yet.
    Init,
    /// The probe succeeded without payment.
    SettledDirect,
    /// The probe returned 402 and the demand is being evaluated.
    Negotiating,
    /// An authorization has been signed for this episode.
    Signed,
    /// The paid retry succeeded.
    Settled,
    /// The episode ended in an error.
    Failed,
}

impl Display for NegotiationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SettledDirect => "settled_direct",
            Self::Negotiating => "negotiating",
            Self::Signed => "signed",
            Self::Settled => "settled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which round trip of the episode an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The unpaid request.
    Probe,
    /// The request carrying the payment proof.
    Retry,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => f.write_str("probe"),
            Self::Retry => f.write_str("retry"),
        }
    }
}

/// Terminal errors of a negotiation episode.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// A round trip could not be completed.
    #[error("{phase} request failed: {source}")]
    Transport {
        /// Round trip that failed.
        phase: Phase,
        /// Underlying error.
        source: TransportError,
    },
    /// A round trip did not complete in time.
    #[error("{phase} request timed out after {timeout:?}")]
    Timeout {
        /// Round trip that hung.
        phase: Phase,
        /// Bound that was exceeded.
        timeout: Duration,
    },
    /// The probe failed with a status other than 402.
    #[error("resource returned {status}: {body}")]
    ProbeRejected {
        /// Probe status.
        status: StatusCode,
        /// Probe body, as text.
        body: String,
    },
    /// The 402 response carried no payment requirement.
    #[error("402 response carried no payment requirement")]
    MissingRequirement,
    /// The 402 response carried a requirement that could not be decoded.
    #[error("invalid payment requirement: {0}")]
    InvalidRequirement(#[source] EnvelopeError),
    /// None of the offered requirements can be paid by this client.
    #[error("no supported payment requirement among: {}", .offered.join(", "))]
    NoSupportedRequirement {
        /// `scheme@network` of every offer.
        offered: Vec<String>,
    },
    /// The requested amount exceeds the configured limit.
    #[error("requested amount {requested} exceeds limit {limit}")]
    AmountExceedsLimit {
        /// Amount demanded by the server.
        requested: TokenAmount,
        /// Client-side maximum.
        limit: TokenAmount,
    },
    /// The wallet did not produce a signature.
    #[error("signing failed: {0}")]
    Signing(#[from] SignError),
    /// The signed proof could not be attached to the retry.
    #[error("proof encoding failed: {0}")]
    Encode(#[from] HttpError),
    /// The server refused the paid retry.
    #[error("payment rejected with {status}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    SettlementRejected {
        /// Retry status.
        status: StatusCode,
        /// Server-supplied reason, if any.
        reason: Option<String>,
    },
    /// The server answered but reported that settlement failed.
    #[error("settlement failed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    SettlementFailed {
        /// `errorReason` of the receipt.
        reason: Option<String>,
        /// The full receipt.
        settlement: SettlementResult,
    },
    /// The settlement receipt could not be decoded.
    #[error("invalid settlement receipt: {0}")]
    InvalidSettlement(#[source] EnvelopeError),
}

impl NegotiationError {
    /// Whether the error happened after a proof was signed and sent.
    #[must_use]
    pub const fn is_settlement(&self) -> bool {
        matches!(
            self,
            Self::SettlementRejected { .. }
                | Self::SettlementFailed { .. }
                | Self::InvalidSettlement(_)
                | Self::Transport {
                    phase: Phase::Retry,
                    ..
                }
                | Self::Timeout {
                    phase: Phase::Retry,
                    ..
                }
        )
    }
}

/// The successful outcome of [`PaymentClient::fetch`].
#[derive(Debug, Clone)]
pub struct PaidResponse {
    /// [`NegotiationState::SettledDirect`] or [`NegotiationState::Settled`].
    pub state: NegotiationState,
    /// The final response.
    pub response: ResourceResponse,
    /// Settlement receipt, if the server sent one.
    pub settlement: Option<SettlementResult>,
    /// The requirement that was paid, if payment happened.
    pub requirement: Option<PaymentRequirement>,
}

impl PaidResponse {
    /// Whether a payment was made.
    #[must_use]
    pub fn paid(&self) -> bool {
        self.state == NegotiationState::Settled
    }
}

/// Fetches resources that may demand payment.
#[derive(Debug, Clone)]
pub struct PaymentClient<T, S> {
    transport: T,
    signer: S,
    networks: NetworkRegistry,
    timeout: Duration,
    max_amount: Option<TokenAmount>,
}

impl<T, S> PaymentClient<T, S>
where
    T: HttpTransport,
    S: Eip712Signer,
{
    /// Creates a client paying on `networks` with `signer`.
    pub const fn new(transport: T, signer: S, networks: NetworkRegistry) -> Self {
        Self {
            transport,
            signer,
            networks,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_amount: None,
        }
    }

    /// Bounds each round trip by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuses to sign for more than `max_amount`.
    #[must_use]
    pub const fn with_max_amount(mut self, max_amount: TokenAmount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    /// The signer payments are made with.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Runs one negotiation episode for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError`] for every terminal failure. Errors for
    /// which [`NegotiationError::is_settlement`] holds happened after a proof
    /// was sent.
    #[cfg_attr(feature = "telemetry", instrument(
        name = "agora.payment_client.fetch",
        skip_all,
        err,
        fields(method = %request.method, url = %request.url)
    ))]
    pub async fn fetch(&self, request: ResourceRequest) -> Result<PaidResponse, NegotiationError> {
        let probe = self.send(Phase::Probe, request.clone()).await?;

        if probe.status.is_success() {
            let settlement = checked_settlement(&probe)?;
            transition(NegotiationState::SettledDirect);
            return Ok(PaidResponse {
                state: NegotiationState::SettledDirect,
                response: probe,
                settlement,
                requirement: None,
            });
        }
        if probe.status != StatusCode::PAYMENT_REQUIRED {
            transition(NegotiationState::Failed);
            return Err(NegotiationError::ProbeRejected {
                status: probe.status,
                body: probe.text(),
            });
        }

        transition(NegotiationState::Negotiating);
        let demand = parse_demand(&probe)?;
        let (requirement, chain_id) = self.choose(&demand)?;

        #[cfg(feature = "telemetry")]
        info!(
            version = %demand.x402_version,
            network = %requirement.network,
            chain_id,
            asset = %requirement.asset,
            pay_to = %requirement.pay_to,
            amount = %requirement.amount,
            "Payment required"
        );

        let payload = sign_transfer_authorization(&self.signer, chain_id, requirement).await?;
        transition(NegotiationState::Signed);

        let proof = PaymentProof::for_demand(&demand, requirement, payload);
        let (name, value) = proof_header(&proof)?;
        let retry = self
            .send(Phase::Retry, request.with_header(name, value))
            .await?;

        if !retry.status.is_success() {
            transition(NegotiationState::Failed);
            return Err(NegotiationError::SettlementRejected {
                status: retry.status,
                reason: rejection_reason(&retry),
            });
        }

        let settlement = checked_settlement(&retry)?;
        transition(NegotiationState::Settled);
        Ok(PaidResponse {
            state: NegotiationState::Settled,
            response: retry,
            settlement,
            requirement: Some(requirement.clone()),
        })
    }

    fn choose<'a>(
        &self,
        demand: &'a PaymentRequired,
    ) -> Result<(&'a PaymentRequirement, ChainId), NegotiationError> {
        let (requirement, chain_id) = demand.select(&self.networks).ok_or_else(|| {
            NegotiationError::NoSupportedRequirement {
                offered: demand
                    .accepts
                    .iter()
                    .map(|r| format!("{}@{}", r.scheme, r.network))
                    .collect(),
            }
        })?;
        if let Some(limit) = self.max_amount
            && requirement.amount > limit
        {
            return Err(NegotiationError::AmountExceedsLimit {
                requested: requirement.amount,
                limit,
            });
        }
        Ok((requirement, chain_id))
    }

    async fn send(
        &self,
        phase: Phase,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, NegotiationError> {
        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| NegotiationError::Timeout {
                phase,
                timeout: self.timeout,
            })?
            .map_err(|source| NegotiationError::Transport { phase, source })?;

        #[cfg(feature = "telemetry")]
        debug!(%phase, status = %response.status, "Response received");

        Ok(response)
    }
}

/// Reads the demand from the `PAYMENT-REQUIRED` header, falling back to the body.
fn parse_demand(response: &ResourceResponse) -> Result<PaymentRequired, NegotiationError> {
    let header_error = match payment_required_from_headers(&response.headers) {
        Some(Ok(demand)) => return Ok(demand),
        Some(Err(e)) => {
            #[cfg(feature = "telemetry")]
            warn!(error = %e, "Malformed PAYMENT-REQUIRED header, trying body");
            Some(e)
        }
        None => None,
    };

    match response.json::<PaymentRequired>() {
        Ok(demand) if !demand.accepts.is_empty() => Ok(demand),
        Ok(_) => header_error.map_or(Err(NegotiationError::MissingRequirement), |e| {
            Err(NegotiationError::InvalidRequirement(e))
        }),
        Err(body_error) => Err(header_error.map_or_else(
            || {
                if response.body.is_empty() {
                    NegotiationError::MissingRequirement
                } else {
                    NegotiationError::InvalidRequirement(EnvelopeError::Json(body_error))
                }
            },
            NegotiationError::InvalidRequirement,
        )),
    }
}

/// The receipt of a successful response, failing on `success: false` or garbage.
fn checked_settlement(
    response: &ResourceResponse,
) -> Result<Option<SettlementResult>, NegotiationError> {
    let Some(decoded) = settlement_from_headers(&response.headers) else {
        return Ok(None);
    };
    let settlement = decoded.map_err(NegotiationError::InvalidSettlement)?;
    if !settlement.success {
        return Err(NegotiationError::SettlementFailed {
            reason: settlement.error_reason.clone(),
            settlement,
        });
    }

    #[cfg(feature = "telemetry")]
    info!(
        transaction = settlement.transaction.as_deref().unwrap_or_default(),
        network = settlement.network.as_deref().unwrap_or_default(),
        payer = ?settlement.payer,
        "Payment settled"
    );

    Ok(Some(settlement))
}

/// Why the server refused a paid retry: the receipt's reason, or the new demand's `error`.
fn rejection_reason(response: &ResourceResponse) -> Option<String> {
    if let Some(Ok(settlement)) = settlement_from_headers(&response.headers)
        && settlement.error_reason.is_some()
    {
        return settlement.error_reason;
    }
    if let Some(Ok(demand)) = payment_required_from_headers(&response.headers)
        && demand.error.is_some()
    {
        return demand.error;
    }
    response
        .json::<PaymentRequired>()
        .ok()
        .and_then(|demand| demand.error)
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn transition(state: NegotiationState) {
    #[cfg(feature = "telemetry")]
    debug!(%state, "Negotiation state");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agora::eip712::{Eip712Domain, TypeSchema};
    use agora::encoding::Base64Bytes;
    use agora::networks::NetworkInfo;
    use agora::proto::X402Version;
    use alloy_primitives::{Address, B256, Bytes, address};
    use async_trait::async_trait;
    use http::{HeaderMap, HeaderValue};
    use serde_json::{Value, json};
    use url::Url;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::constants::{
        PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER,
        X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
    };
    use crate::transport::ReqwestTransport;

    const NETWORKS: &[NetworkInfo] = &[NetworkInfo {
        name: "base-sepolia",
        chain_id: 84532,
    }];

    const PAYER: Address = address!("0x00000000000000000000000000000000000000aa");

    #[derive(Default)]
    struct CountingSigner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Eip712Signer for CountingSigner {
        fn address(&self) -> Address {
            PAYER
        }

        async fn sign_typed_data(
            &self,
            _domain: &Eip712Domain,
            _types: &TypeSchema,
            _primary_type: &str,
            _message: &Value,
        ) -> Result<Bytes, SignError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(vec![0x1b; 65]))
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<ResourceResponse>>,
        requests: Mutex<Vec<ResourceRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: impl IntoIterator<Item = ResourceResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::default(),
            }
        }

        fn sent(&self) -> Vec<ResourceRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::InvalidRequest("script exhausted".into()))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl HttpTransport for HangingTransport {
        async fn send(&self, _request: ResourceRequest) -> Result<ResourceResponse, TransportError> {
            std::future::pending().await
        }
    }

    fn response(status: u16, headers: &[(&'static str, String)], body: Value) -> ResourceResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        ResourceResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: if body.is_null() {
                Vec::new()
            } else {
                serde_json::to_vec(&body).unwrap()
            },
        }
    }

    fn requirement_json(amount: &str) -> Value {
        json!({
            "scheme": "exact",
            "network": "base-sepolia",
            "maxAmountRequired": amount,
            "resource": "https://api.example/orders",
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "payTo": "0x00000000000000000000000000000000000000bb",
            "maxTimeoutSeconds": 300,
            "extra": { "name": "USDC", "version": "2" }
        })
    }

    fn v1_demand(amount: &str) -> Value {
        json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [requirement_json(amount)]
        })
    }

    fn receipt(success: bool) -> String {
        json!({
            "success": success,
            "transaction": "0xfeed",
            "network": "base-sepolia",
            "payer": PAYER,
            "errorReason": if success { Value::Null } else { json!("insufficient_funds") }
        })
        .to_string()
    }

    fn client<T: HttpTransport>(transport: T) -> PaymentClient<T, CountingSigner> {
        PaymentClient::new(
            transport,
            CountingSigner::default(),
            NetworkRegistry::from_networks(NETWORKS),
        )
    }

    fn request() -> ResourceRequest {
        ResourceRequest::get(Url::parse("https://api.example/orders").unwrap())
    }

    #[tokio::test]
    async fn test_direct_success_never_signs() {
        let transport = ScriptedTransport::new([response(
            200,
            &[(X_PAYMENT_RESPONSE_HEADER, receipt(true))],
            json!({ "ok": true }),
        )]);
        let client = client(transport);
        let paid = client.fetch(request()).await.unwrap();

        assert_eq!(paid.state, NegotiationState::SettledDirect);
        assert!(!paid.paid());
        assert_eq!(
            paid.settlement.unwrap().transaction.as_deref(),
            Some("0xfeed")
        );
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_402_signs_once_and_retries_once() {
        let transport = ScriptedTransport::new([
            response(402, &[], v1_demand("10000")),
            response(
                200,
                &[(X_PAYMENT_RESPONSE_HEADER, receipt(true))],
                json!({ "orderId": 7 }),
            ),
        ]);
        let client = client(transport);
        let paid = client.fetch(request()).await.unwrap();

        assert_eq!(paid.state, NegotiationState::Settled);
        assert_eq!(paid.settlement.unwrap().payer, Some(PAYER));
        assert_eq!(paid.requirement.unwrap().amount, TokenAmount::from(10_000));
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 1);

        let sent = client.transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].headers.get(X_PAYMENT_HEADER).is_none());
        let proof: PaymentProof = Base64Bytes::from(sent[1].headers[X_PAYMENT_HEADER].as_bytes())
            .decode_json()
            .unwrap();
        assert_eq!(proof.version(), X402Version::V1);
        let auth = &proof.payload().authorization;
        assert_eq!(auth.from, PAYER);
        assert_eq!(auth.value, TokenAmount::from(10_000));
        assert!(auth.valid_before > auth.valid_after);
    }

    #[tokio::test]
    async fn test_rejected_retry_is_terminal() {
        let mut expired = v1_demand("10000");
        expired["error"] = json!("authorization expired");
        let transport = ScriptedTransport::new([
            response(402, &[], v1_demand("10000")),
            response(402, &[], expired),
        ]);
        let client = client(transport);
        let err = client.fetch(request()).await.unwrap_err();

        assert!(err.is_settlement());
        assert!(matches!(
            &err,
            NegotiationError::SettlementRejected { status, reason }
                if *status == StatusCode::PAYMENT_REQUIRED
                    && reason.as_deref() == Some("authorization expired")
        ));
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_failure_is_terminal() {
        let transport = ScriptedTransport::new([response(503, &[], json!("down"))]);
        let client = client(transport);
        let err = client.fetch(request()).await.unwrap_err();

        assert!(matches!(err, NegotiationError::ProbeRejected { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE));
        assert!(!err.is_settlement());
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_header_demand_wins_over_body() {
        let mut v2 = v1_demand("999");
        v2["x402Version"] = json!(2);
        v2["accepts"][0]["network"] = json!("eip155:84532");
        v2["resource"] = json!({ "url": "https://api.example/orders" });
        let header = Base64Bytes::encode_json(&v2).unwrap().to_string();

        let transport = ScriptedTransport::new([
            response(402, &[(PAYMENT_REQUIRED_HEADER, header)], v1_demand("10000")),
            response(200, &[(PAYMENT_RESPONSE_HEADER, receipt(true))], Value::Null),
        ]);
        let client = client(transport);
        let paid = client.fetch(request()).await.unwrap();
        assert_eq!(paid.requirement.unwrap().amount, TokenAmount::from(999));

        let sent = client.transport.sent();
        assert!(sent[1].headers.get(X_PAYMENT_HEADER).is_none());
        let proof: PaymentProof =
            Base64Bytes::from(sent[1].headers[PAYMENT_SIGNATURE_HEADER].as_bytes())
                .decode_json()
                .unwrap();
        let PaymentProof::V2(proof) = proof else {
            panic!("expected a V2 proof");
        };
        assert_eq!(proof.accepted.network, "eip155:84532");
        assert_eq!(proof.resource, v2.get("resource").cloned());
    }

    #[tokio::test]
    async fn test_malformed_header_falls_back_to_body() {
        let transport = ScriptedTransport::new([
            response(402, &[(PAYMENT_REQUIRED_HEADER, "@@".into())], v1_demand("5")),
            response(200, &[], Value::Null),
        ]);
        let client = client(transport);
        let paid = client.fetch(request()).await.unwrap();
        assert!(paid.paid());
        assert!(paid.settlement.is_none());
    }

    #[tokio::test]
    async fn test_402_without_requirement() {
        let client = client(ScriptedTransport::new([response(402, &[], Value::Null)]));
        let err = client.fetch(request()).await.unwrap_err();
        assert!(matches!(err, NegotiationError::MissingRequirement));
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_network_is_not_signed() {
        let mut demand = v1_demand("10");
        demand["accepts"][0]["network"] = json!("solana");
        let client = client(ScriptedTransport::new([response(402, &[], demand)]));
        let err = client.fetch(request()).await.unwrap_err();
        assert!(
            matches!(err, NegotiationError::NoSupportedRequirement { ref offered } if offered == &["exact@solana"])
        );
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_amount_limit_checked_before_signing() {
        let client = client(ScriptedTransport::new([response(
            402,
            &[],
            v1_demand("5000001"),
        )]))
        .with_max_amount(TokenAmount::from(5_000_000));
        let err = client.fetch(request()).await.unwrap_err();
        assert!(matches!(err, NegotiationError::AmountExceedsLimit { .. }));
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_receipt_is_settlement_error() {
        let transport = ScriptedTransport::new([
            response(402, &[], v1_demand("10000")),
            response(200, &[(X_PAYMENT_RESPONSE_HEADER, receipt(false))], Value::Null),
        ]);
        let err = client(transport).fetch(request()).await.unwrap_err();
        assert!(err.is_settlement());
        assert!(matches!(
            err,
            NegotiationError::SettlementFailed { reason: Some(ref r), .. } if r == "insufficient_funds"
        ));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let client = client(HangingTransport).with_timeout(Duration::from_millis(20));
        let err = client.fetch(request()).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Timeout {
                phase: Phase::Probe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_each_episode_uses_a_fresh_nonce() {
        let transport = ScriptedTransport::new([
            response(402, &[], v1_demand("1")),
            response(402, &[], v1_demand("1")),
            response(402, &[], v1_demand("1")),
            response(402, &[], v1_demand("1")),
        ]);
        let client = client(transport);
        assert!(client.fetch(request()).await.is_err());
        assert!(client.fetch(request()).await.is_err());

        let nonces: Vec<B256> = client
            .transport
            .sent()
            .iter()
            .filter_map(|r| r.headers.get(X_PAYMENT_HEADER))
            .map(|v| {
                Base64Bytes::from(v.as_bytes())
                    .decode_json::<PaymentProof>()
                    .unwrap()
                    .payload()
                    .authorization
                    .nonce
            })
            .collect();
        assert_eq!(nonces.len(), 2);
        assert_ne!(nonces[0], nonces[1]);
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_end_to_end_against_http_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .and(header_exists("x-payment"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(X_PAYMENT_RESPONSE_HEADER, receipt(true).as_str())
                    .set_body_json(json!({ "orderId": "ord_1" })),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(402).set_body_json(v1_demand("10000")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(ReqwestTransport::new());
        let url = Url::parse(&format!("{}/orders", server.uri())).unwrap();
        let paid = client.fetch(ResourceRequest::get(url)).await.unwrap();

        assert!(paid.paid());
        assert_eq!(paid.response.json::<Value>().unwrap()["orderId"], "ord_1");
        assert_eq!(client.signer().calls.load(Ordering::SeqCst), 1);
    }
}
