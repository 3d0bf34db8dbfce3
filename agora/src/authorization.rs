//! Builds and signs ERC-3009 transfer authorizations for a payment requirement.

use alloy_primitives::B256;
use rand::{RngExt, rng};
#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::chain::ChainId;
use crate::eip712::{Eip712Domain, Eip712Signer, SignError};
use crate::proto::{PaymentAuthorization, PaymentRequirement, TransferAuthorization};
use crate::timestamp::UnixTimestamp;

/// How far in the past a derived window starts, absorbing clock skew.
pub const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// Validity used when a requirement omits `maxTimeoutSeconds`.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 300;

/// The signing domain for a requirement on `chain_id`.
///
/// Name, version and salt come from the requirement's `extra` when present;
/// the chain ID and the asset as verifying contract are always set.
#[must_use]
pub fn authorization_domain(chain_id: ChainId, requirement: &PaymentRequirement) -> Eip712Domain {
    let extra = requirement.domain_extra().unwrap_or_default();
    Eip712Domain {
        name: extra.name,
        version: extra.version,
        chain_id: Some(chain_id),
        verifying_contract: Some(requirement.asset),
        salt: extra.salt,
    }
}

/// The authorization `signer` would sign for `requirement`.
///
/// The server's window and nonce are used when supplied. Otherwise the window
/// runs from ten minutes ago to `maxTimeoutSeconds` from now, and the nonce is
/// 32 fresh random bytes. A missing or zero `maxTimeoutSeconds` counts as
/// [`DEFAULT_MAX_TIMEOUT_SECS`].
#[must_use]
pub fn build_authorization<S: Eip712Signer + ?Sized>(
    signer: &S,
    requirement: &PaymentRequirement,
) -> TransferAuthorization {
    let now = UnixTimestamp::now();
    let timeout = match requirement.max_timeout_seconds {
        0 => DEFAULT_MAX_TIMEOUT_SECS,
        secs => secs,
    };
    TransferAuthorization {
        from: signer.address(),
        to: requirement.pay_to,
        value: requirement.amount,
        valid_after: requirement
            .valid_after
            .unwrap_or_else(|| now.saturating_sub(VALID_AFTER_SKEW_SECS)),
        valid_before: requirement
            .valid_before
            .unwrap_or_else(|| now + timeout),
        nonce: requirement.nonce.unwrap_or_else(random_nonce),
    }
}

/// Signs a transfer authorization satisfying `requirement` on `chain_id`.
///
/// # Errors
///
/// Returns [`SignError`] if the wallet refuses or fails to sign.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
    chain_id,
    pay_to = %requirement.pay_to,
    amount = %requirement.amount
)))]
pub async fn sign_transfer_authorization<S: Eip712Signer + ?Sized>(
    signer: &S,
    chain_id: ChainId,
    requirement: &PaymentRequirement,
) -> Result<PaymentAuthorization, SignError> {
    let domain = authorization_domain(chain_id, requirement);
    let authorization = build_authorization(signer, requirement);

    #[cfg(feature = "telemetry")]
    debug!(
        valid_after = %authorization.valid_after,
        valid_before = %authorization.valid_before,
        nonce = %authorization.nonce,
        "Signing transfer authorization"
    );

    let signature = signer
        .sign_typed_data(
            &domain,
            &TransferAuthorization::type_schema(),
            TransferAuthorization::PRIMARY_TYPE,
            &authorization.message(),
        )
        .await?;

    Ok(PaymentAuthorization {
        signature,
        authorization,
    })
}

fn random_nonce() -> B256 {
    let nonce: [u8; 32] = rng().random();
    B256::from(nonce)
}
