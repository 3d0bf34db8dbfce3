//! Chain identification and the chain guard.
//!
//! [`ChainGuard`] is run before every signed operation. It reads the wallet's
//! active chain, asks for a switch if it differs from the required one, and
//! then reads the chain again: a switch is never assumed to have succeeded.
//! Nothing is cached between calls.

use std::fmt::{self, Display, Formatter};

#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument};

use crate::wallet::{self, WalletError, WalletTransport};

/// An EIP-155 chain ID (e.g., 8453 for Base, 84532 for Base Sepolia).
pub type ChainId = u64;

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(8453)` returns `"eip155:8453"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// Observed versus required chain for one guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainGuardState {
    /// Chain the wallet reported before any switch.
    pub observed: ChainId,
    /// Chain the operation needs.
    pub required: ChainId,
    /// Whether a switch was requested and confirmed.
    pub switched: bool,
}

impl ChainGuardState {
    /// Whether the wallet was already on the required chain.
    #[must_use]
    pub const fn matched(&self) -> bool {
        self.observed == self.required
    }
}

impl Display for ChainGuardState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observed {} required {}",
            caip2(self.observed),
            caip2(self.required)
        )
    }
}

/// Errors raised by [`ChainGuard::ensure`].
#[derive(Debug, thiserror::Error)]
pub enum ChainGuardError {
    /// The active chain could not be read.
    #[error("failed to read the active chain: {0}")]
    Read(#[source] WalletError),
    /// The wallet refused or could not perform the switch.
    #[error("wallet is on {observed} but {required} is required; switch failed: {source}")]
    SwitchRejected {
        /// Chain the wallet is on.
        observed: ChainId,
        /// Chain the operation needs.
        required: ChainId,
        /// The wallet's error.
        #[source]
        source: WalletError,
    },
    /// The wallet accepted the switch but is still on another chain.
    #[error("wallet is on {observed} but {required} is required")]
    Mismatch {
        /// Chain the wallet reports after the switch.
        observed: ChainId,
        /// Chain the operation needs.
        required: ChainId,
    },
}

/// Verifies, and if needed switches, the wallet's active chain.
#[derive(Debug, Clone)]
pub struct ChainGuard<W> {
    wallet: W,
}

impl<W: WalletTransport> ChainGuard<W> {
    /// Creates a guard over a shared wallet.
    pub const fn new(wallet: W) -> Self {
        Self { wallet }
    }

    /// The underlying wallet.
    pub const fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Ensures the wallet is on `required`.
    ///
    /// Does nothing beyond one read when the wallet is already there.
    ///
    /// # Errors
    ///
    /// Returns [`ChainGuardError`] if the chain cannot be read, the switch is
    /// refused, or the wallet is still elsewhere after switching.
    #[cfg_attr(feature = "telemetry", instrument(skip(self), err))]
    pub async fn ensure(&self, required: ChainId) -> Result<ChainGuardState, ChainGuardError> {
        let observed = wallet::chain_id(&self.wallet)
            .await
            .map_err(ChainGuardError::Read)?;
        if observed == required {
            #[cfg(feature = "telemetry")]
            debug!(chain_id = required, "Wallet already on required chain");
            return Ok(ChainGuardState {
                observed,
                required,
                switched: false,
            });
        }

        #[cfg(feature = "telemetry")]
        info!(observed, required, "Requesting chain switch");

        wallet::switch_chain(&self.wallet, required)
            .await
            .map_err(|source| ChainGuardError::SwitchRejected {
                observed,
                required,
                source,
            })?;

        let after = wallet::chain_id(&self.wallet)
            .await
            .map_err(ChainGuardError::Read)?;
        if after != required {
            return Err(ChainGuardError::Mismatch {
                observed: after,
                required,
            });
        }
        Ok(ChainGuardState {
            observed,
            required,
            switched: true,
        })
    }
}
