//! Agent registration on the identity registry.

use agora::chain::{ChainGuard, ChainId};
use agora::wallet::{self, TransactionRequest, TransactionResult, WalletTransport};
use agora_evm::calls::register_call;
use agora_http::backend::AgentMetadata;
use alloy_primitives::Address;
use tracing::{info, instrument};

use super::state::{ActionSlot, ActionState};
use super::{FlowError, MetadataPreparer, sending_account};

/// Registers agents: host the metadata, then call `register(agentURI)`.
#[derive(Debug)]
pub struct RegistrationFlow<W, P> {
    guard: ChainGuard<W>,
    preparer: P,
    chain_id: ChainId,
    registry: Address,
    slot: ActionSlot<TransactionResult>,
}

impl<W, P> RegistrationFlow<W, P>
where
    W: WalletTransport,
    P: MetadataPreparer,
{
    /// Creates a flow registering on `registry` deployed on `chain_id`.
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
    /// [`FlowError::Busy`] while a registration is in flight.
    pub fn reset(&self) -> Result<(), FlowError> {
        self.slot.reset()
    }

    /// Registers an agent described by `metadata`.
    ///
    /// # Errors
    ///
    /// Returns the [`FlowError`] of the first step that failed. Nothing is
    /// submitted unless every earlier step succeeded.
    #[instrument(name = "agora.flow.register", skip_all, err, fields(name = %metadata.name))]
    pub async fn register(&self, metadata: &AgentMetadata) -> Result<TransactionResult, FlowError> {
        self.slot.run(self.execute(metadata)).await
    }

    async fn execute(&self, metadata: &AgentMetadata) -> Result<TransactionResult, FlowError> {
        if metadata.name.trim().is_empty() {
            return Err(FlowError::Validation("agent name must not be empty".into()));
        }

        self.guard.ensure(self.chain_id).await?;

        let prepared = self.preparer.prepare_registration(metadata).await?;
        let calldata = register_call(self.registry, &prepared.agent_uri)?.encode()?;

        let wallet = self.guard.wallet();
        let from = sending_account(wallet).await?;
        let tx = TransactionRequest {
            from,
            to: self.registry,
            data: calldata.into_bytes(),
        };
        let result = wallet::send_transaction(wallet, self.chain_id, &tx).await?;

        info!(
            hash = %result.hash,
            agent_uri = %prepared.agent_uri,
            "Registration submitted"
        );
        Ok(result)
    }
}
