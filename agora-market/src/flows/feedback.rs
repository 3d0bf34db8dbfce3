//! Feedback on the reputation registry.

use agora::chain::{ChainGuard, ChainId};
use agora::wallet::{self, TransactionRequest, TransactionResult, WalletTransport};
use agora_evm::calls::{FeedbackCall, MAX_VALUE_DECIMALS};
use agora_http::backend::FeedbackMetadata;
use alloy_primitives::Address;
use tracing::{info, instrument};

use super::state::{ActionSlot, ActionState};
use super::{FlowError, MetadataPreparer, sending_account};

/// Leaves feedback: host the document, then call `giveFeedback`.
#[derive(Debug)]
pub struct FeedbackFlow<W, P> {
    guard: ChainGuard<W>,
    preparer: P,
    chain_id: ChainId,
    registry: Address,
    slot: ActionSlot<TransactionResult>,
}

impl<W, P> FeedbackFlow<W, P>
where
    W: WalletTransport,
    P: MetadataPreparer,
{
    /// Creates a flow writing to the reputation `registry` on `chain_id`.
    pub fn new(wallet: W, preparer: P, chain_id: ChainId, registry: Address) -> Self {
        Self {
            guard: ChainGuard::new(wallet),
            preparer,
            chain_id,
            registry,
            slot: ActionSlot::new(),
        }
    }

    /// The current action state.
    pub fn state(&self) -> ActionState<TransactionResult> {
        self.slot.state()
    }

    /// Clears a finished result.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] while feedback is being submitted.
    pub fn reset(&self) -> Result<(), FlowError> {
        self.slot.reset()
    }

    /// Submits `feedback`.
    ///
    /// # Errors
    ///
    /// Returns the [`FlowError`] of the first step that failed.
    #[instrument(
        name = "agora.flow.feedback",
        skip_all,
        err,
        fields(agent_id = %feedback.agent_id, value = feedback.value)
    )]
    pub async fn submit(&self, feedback: &FeedbackMetadata) -> Result<TransactionResult, FlowError> {
        self.slot.run(self.execute(feedback)).await
    }

    async fn execute(&self, feedback: &FeedbackMetadata) -> Result<TransactionResult, FlowError> {
        if feedback.value_decimals > MAX_VALUE_DECIMALS {
            return Err(FlowError::Validation(format!(
                "value decimals {} exceed {MAX_VALUE_DECIMALS}",
                feedback.value_decimals
            )));
        }

        self.guard.ensure(self.chain_id).await?;

        let prepared = self.preparer.prepare_feedback(feedback).await?;
        let call = FeedbackCall {
            agent_id: feedback.agent_id,
            value: feedback.value,
            value_decimals: feedback.value_decimals,
            tag1: feedback.tag1.clone(),
            tag2: feedback.tag2.clone(),
            endpoint: feedback.endpoint.clone(),
            feedback_uri: prepared.feedback_uri,
            feedback_hash: prepared.feedback_hash,
        };
        let calldata = call.into_call(self.registry)?.encode()?;

        let wallet = self.guard.wallet();
        let tx = TransactionRequest {
            from: sending_account(wallet).await?,
            to: self.registry,
            data: calldata.into_bytes(),
        };
        let result = wallet::send_transaction(wallet, self.chain_id, &tx).await?;

        info!(hash = %result.hash, "Feedback submitted");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use agora::abi::{AbiValue, Calldata, parse_signature};
    use agora_evm::calls::GIVE_FEEDBACK_SIGNATURE;
    use alloy_primitives::{B256, Bytes, U256, address};

    use super::*;
    use crate::flows::testing::{FakeBackend, FakeWallet};

    const SEPOLIA: ChainId = 11_155_111;
    const REGISTRY: Address = address!("0x8004B663056A597Dffe9eCcC1965A193B7388713");

    fn feedback(value: i128, value_decimals: u8) -> FeedbackMetadata {
        FeedbackMetadata {
            agent_id: U256::from(42),
            value,
            value_decimals,
            tag1: "quality".into(),
            tag2: String::new(),
            endpoint: "https://agents.example/42".into(),
            comment: Some("Fixed the leak in an hour".into()),
        }
    }

    #[tokio::test]
    async fn test_submit_encodes_prepared_document() {
        let wallet = FakeWallet::on(SEPOLIA);
        let backend = FakeBackend::default();
        let flow = FeedbackFlow::new(&wallet, &backend, SEPOLIA, REGISTRY);

        let result = flow.submit(&feedback(-45, 1)).await.unwrap();
        assert_eq!(result.to, REGISTRY);
        assert_eq!(
            backend.feedback.lock().unwrap()[0].comment.as_deref(),
            Some("Fixed the leak in an hour")
        );

        let sent = wallet.sent();
        let data: Bytes = serde_json::from_value(sent[0]["data"].clone()).unwrap();
        let calldata = Calldata::try_from(data).unwrap();
        let params = calldata
            .decode_params(&parse_signature(GIVE_FEEDBACK_SIGNATURE).unwrap())
            .unwrap();
        assert_eq!(
            params,
            vec![
                AbiValue::uint256(U256::from(42)),
                AbiValue::int128(-45),
                AbiValue::uint8(1),
                AbiValue::string("quality"),
                AbiValue::string(""),
                AbiValue::string("https://agents.example/42"),
                AbiValue::string("ipfs://QmFeedback"),
                AbiValue::bytes32(B256::repeat_byte(0x5a)),
            ]
        );
    }

    #[tokio::test]
    async fn test_excess_decimals_are_rejected() {
        let wallet = FakeWallet::on(SEPOLIA);
        let backend = FakeBackend::default();
        let flow = FeedbackFlow::new(&wallet, &backend, SEPOLIA, REGISTRY);

        let err = flow.submit(&feedback(1, 19)).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(wallet.methods().is_empty());
        assert!(backend.feedback.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preparation_failure_sends_nothing() {
        let wallet = FakeWallet::on(SEPOLIA);
        let backend = FakeBackend::failing();
        let flow = FeedbackFlow::new(&wallet, &backend, SEPOLIA, REGISTRY);

        let err = flow.submit(&feedback(5, 0)).await.unwrap_err();
        assert!(matches!(err, FlowError::Preparation(_)));
        assert!(wallet.sent().is_empty());
        assert!(matches!(flow.state(), ActionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_wrong_chain_without_switch_is_reported() {
        let mut wallet = FakeWallet::on(8453);
        wallet.allow_switch = false;
        let backend = FakeBackend::default();
        let flow = FeedbackFlow::new(&wallet, &backend, SEPOLIA, REGISTRY);

        let err = flow.submit(&feedback(5, 0)).await.unwrap_err();
        assert!(matches!(err, FlowError::ChainMismatch(_)));
        assert!(backend.feedback.lock().unwrap().is_empty());
    }
}
