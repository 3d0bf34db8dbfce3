//! User-facing write actions.
//!
//! Every orchestrator follows the same order: validate the input, make sure
//! the wallet is on the right chain, have the backend host the off-chain
//! metadata, build and encode the call, then submit it. Booking swaps the last
//! three steps for a paid request. Each orchestrator keeps its own
//! [`ActionSlot`](state::ActionSlot) and reports one [`FlowError`] per attempt.

use std::sync::Arc;

use agora::abi::EncodeError;
use agora::chain::ChainGuardError;
use agora::eip712::SignError;
use agora::wallet::WalletError;
use agora_http::backend::{
    AgentMetadata, BackendClient, BackendError, FeedbackMetadata, PreparedFeedback,
    PreparedRegistration,
};
use agora_http::negotiate::NegotiationError;
use async_trait::async_trait;

pub mod booking;
pub mod feedback;
pub mod registration;
pub mod state;

pub use booking::{BookingFlow, BookingResult, OrderRequest};
pub use feedback::FeedbackFlow;
pub use registration::RegistrationFlow;
pub use state::{ActionSlot, ActionState};

/// The single error surface of a write action.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The input was rejected before anything was sent.
    #[error("invalid input: {0}")]
    Validation(String),
    /// An attempt is already in flight.
    #[error("an attempt is already in progress")]
    Busy,
    /// A result is already recorded; reset before trying again.
    #[error("already completed; reset before starting again")]
    AlreadyCompleted,
    /// The wallet is on the wrong chain and could not be switched.
    #[error("wrong network: {0}")]
    ChainMismatch(#[from] ChainGuardError),
    /// The wallet refused or failed a request.
    #[error("wallet error: {0}")]
    Transport(#[from] WalletError),
    /// The backend could not prepare the metadata.
    #[error("metadata preparation failed: {0}")]
    Preparation(#[from] BackendError),
    /// The call could not be encoded.
    #[error("call encoding failed: {0}")]
    Encoding(#[from] EncodeError),
    /// The paid request failed before a proof was sent.
    #[error("payment negotiation failed: {0}")]
    Negotiation(#[source] NegotiationError),
    /// The paid request failed after a proof was sent.
    #[error("payment settlement failed: {0}")]
    Settlement(#[source] NegotiationError),
}

impl From<NegotiationError> for FlowError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::Signing(SignError::Wallet(wallet)) => Self::Transport(wallet),
            err if err.is_settlement() => Self::Settlement(err),
            err => Self::Negotiation(err),
        }
    }
}

/// Hosts the off-chain documents on-chain calls point at.
#[async_trait]
pub trait MetadataPreparer: Send + Sync {
    /// Hosts registration metadata.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the document cannot be hosted.
    async fn prepare_registration(
        &self,
        metadata: &AgentMetadata,
    ) -> Result<PreparedRegistration, BackendError>;

    /// Hosts feedback.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the document cannot be hosted.
    async fn prepare_feedback(
        &self,
        feedback: &FeedbackMetadata,
    ) -> Result<PreparedFeedback, BackendError>;
}

#[async_trait]
impl MetadataPreparer for BackendClient {
    async fn prepare_registration(
        &self,
        metadata: &AgentMetadata,
    ) -> Result<PreparedRegistration, BackendError> {
        BackendClient::prepare_registration(self, metadata).await
    }

    async fn prepare_feedback(
        &self,
        feedback: &FeedbackMetadata,
    ) -> Result<PreparedFeedback, BackendError> {
        BackendClient::prepare_feedback(self, feedback).await
    }
}

#[async_trait]
impl<T: MetadataPreparer + ?Sized> MetadataPreparer for &T {
    async fn prepare_registration(
        &self,
        metadata: &AgentMetadata,
    ) -> Result<PreparedRegistration, BackendError> {
        (**self).prepare_registration(metadata).await
    }

    async fn prepare_feedback(
        &self,
        feedback: &FeedbackMetadata,
    ) -> Result<PreparedFeedback, BackendError> {
        (**self).prepare_feedback(feedback).await
    }
}

#[async_trait]
impl<T: MetadataPreparer + ?Sized> MetadataPreparer for Arc<T> {
    async fn prepare_registration(
        &self,
        metadata: &AgentMetadata,
    ) -> Result<PreparedRegistration, BackendError> {
        (**self).prepare_registration(metadata).await
    }

    async fn prepare_feedback(
        &self,
        feedback: &FeedbackMetadata,
    ) -> Result<PreparedFeedback, BackendError> {
        (**self).prepare_feedback(feedback).await
    }
}

/// The account transactions are sent from: the wallet's first.
pub(crate) async fn sending_account<W>(wallet: &W) -> Result<alloy_primitives::Address, FlowError>
where
    W: agora::wallet::WalletTransport + ?Sized,
{
    agora::wallet::accounts(wallet)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| WalletError::InvalidResponse("wallet exposes no accounts".into()).into())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the orchestrator tests.

    use std::sync::Mutex;

    use agora::wallet::{
        ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_SEND_TRANSACTION, WALLET_SWITCH_CHAIN, WalletTransport,
        format_quantity, parse_quantity,
    };
    use alloy_primitives::{Address, B256, address, b256};
    use serde_json::{Value, json};

    use super::*;

    pub const ACCOUNT: Address = address!("0x00000000000000000000000000000000000000aa");
    pub const TX_HASH: B256 =
        b256!("0x1111111111111111111111111111111111111111111111111111111111111111");

    /// A wallet on `chain_id` that records every request.
    pub struct FakeWallet {
        pub chain_id: Mutex<u64>,
        pub allow_switch: bool,
        pub reject_send: bool,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeWallet {
        pub fn on(chain_id: u64) -> Self {
            Self {
                chain_id: Mutex::new(chain_id),
                allow_switch: true,
                reject_send: false,
                calls: Mutex::default(),
            }
        }

        pub fn methods(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }

        pub fn sent(&self) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == ETH_SEND_TRANSACTION)
                .map(|(_, p)| p[0].clone())
                .collect()
        }
    }

    #[async_trait]
    impl WalletTransport for FakeWallet {
        async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_owned(), params.clone()));
            match method {
                ETH_ACCOUNTS => Ok(json!([ACCOUNT])),
                ETH_CHAIN_ID => Ok(json!(format_quantity(*self.chain_id.lock().unwrap()))),
                WALLET_SWITCH_CHAIN if self.allow_switch => {
                    *self.chain_id.lock().unwrap() = parse_quantity(&params[0]["chainId"])?;
                    Ok(Value::Null)
                }
                WALLET_SWITCH_CHAIN => Err(WalletError::UserRejected),
                ETH_SEND_TRANSACTION if self.reject_send => Err(WalletError::UserRejected),
                ETH_SEND_TRANSACTION => Ok(json!(TX_HASH)),
                other => Err(WalletError::Unsupported(other.to_owned())),
            }
        }
    }

    /// A backend that hosts everything at fixed URIs, or fails.
    #[derive(Default)]
    pub struct FakeBackend {
        pub fail: bool,
        pub registrations: Mutex<Vec<AgentMetadata>>,
        pub feedback: Mutex<Vec<FeedbackMetadata>>,
    }

    impl FakeBackend {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn outage() -> BackendError {
            BackendError::InvalidResponse {
                context: "fake backend",
                reason: "offline",
            }
        }
    }

    #[async_trait]
    impl MetadataPreparer for FakeBackend {
        async fn prepare_registration(
            &self,
            metadata: &AgentMetadata,
        ) -> Result<PreparedRegistration, BackendError> {
            self.registrations.lock().unwrap().push(metadata.clone());
            if self.fail {
                return Err(Self::outage());
            }
            Ok(PreparedRegistration {
                agent_uri: "ipfs://QmAgent".into(),
            })
        }

        async fn prepare_feedback(
            &self,
            feedback: &FeedbackMetadata,
        ) -> Result<PreparedFeedback, BackendError> {
            self.feedback.lock().unwrap().push(feedback.clone());
            if self.fail {
                return Err(Self::outage());
            }
            Ok(PreparedFeedback {
                feedback_uri: "ipfs://QmFeedback".into(),
                feedback_hash: B256::repeat_byte(0x5a),
            })
        }
    }
}
