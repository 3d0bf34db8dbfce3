//! Reading and writing payment headers.
//!
//! Requirements arrive in `PAYMENT-REQUIRED` (V2), proofs leave in
//! `PAYMENT-SIGNATURE` (V2) or `X-PAYMENT` (V1), and settlement receipts come
//! back in `PAYMENT-RESPONSE` or the legacy `X-PAYMENT-RESPONSE`.

use agora::encoding::EnvelopeError;
use agora::proto::{PaymentProof, PaymentRequired, SettlementResult, X402Version};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::constants::{
    PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};
use crate::error::HttpError;

/// Decodes the `PAYMENT-REQUIRED` header, if present.
///
/// `None` means the header is absent; `Some(Err(_))` means it is present but
/// malformed.
#[must_use]
pub fn payment_required_from_headers(
    headers: &HeaderMap,
) -> Option<Result<PaymentRequired, EnvelopeError>> {
    headers
        .get(PAYMENT_REQUIRED_HEADER)
        .map(|value| PaymentRequired::from_header(value.as_bytes()))
}

/// Decodes the settlement receipt, preferring `PAYMENT-RESPONSE` over `X-PAYMENT-RESPONSE`.
#[must_use]
pub fn settlement_from_headers(
    headers: &HeaderMap,
) -> Option<Result<SettlementResult, EnvelopeError>> {
    headers
        .get(PAYMENT_RESPONSE_HEADER)
        .or_else(|| headers.get(X_PAYMENT_RESPONSE_HEADER))
        .map(|value| SettlementResult::from_header(value.as_bytes()))
}

/// The header name a proof of `version` travels in.
#[must_use]
pub const fn proof_header_name(version: X402Version) -> &'static str {
    match version {
        X402Version::V1 => X_PAYMENT_HEADER,
        X402Version::V2 => PAYMENT_SIGNATURE_HEADER,
    }
}

/// Encodes `proof` into the header pair for its envelope generation.
///
/// # Errors
///
/// Returns [`HttpError`] if the proof cannot be serialized or is not a legal
/// header value.
pub fn proof_header(proof: &PaymentProof) -> Result<(HeaderName, HeaderValue), HttpError> {
    let encoded = proof.encode()?;
    let value = HeaderValue::from_str(&encoded)?;
    Ok((
        HeaderName::from_static(proof_header_name(proof.version())),
        value,
    ))
}

#[cfg(test)]
mod tests {
    use agora::encoding::Base64Bytes;
    use agora::proto::{PaymentAuthorization, PaymentProofV1, TransferAuthorization};
    use agora::timestamp::UnixTimestamp;
    use alloy_primitives::{Address, B256, Bytes};

    use super::*;

    fn proof() -> PaymentProof {
        PaymentProof::V1(PaymentProofV1 {
            x402_version: X402Version::V1,
            scheme: "exact".into(),
            network: "base-sepolia".into(),
            payload: PaymentAuthorization {
                signature: Bytes::from(vec![0x11; 65]),
                authorization: TransferAuthorization {
                    from: Address::ZERO,
                    to: Address::ZERO,
                    value: 10u64.into(),
                    valid_after: UnixTimestamp::from_secs(0),
                    valid_before: UnixTimestamp::from_secs(60),
                    nonce: B256::ZERO,
                },
            },
        })
    }

    #[test]
    fn test_proof_header_name_matches_version() {
        let (name, value) = proof_header(&proof()).unwrap();
        assert_eq!(name.as_str(), X_PAYMENT_HEADER);
        let decoded: PaymentProof = Base64Bytes::from(value.as_bytes()).decode_json().unwrap();
        assert_eq!(decoded, proof());
        assert_eq!(proof_header_name(X402Version::V2), PAYMENT_SIGNATURE_HEADER);

        for name in [
            PAYMENT_SIGNATURE_HEADER,
            PAYMENT_REQUIRED_HEADER,
            PAYMENT_RESPONSE_HEADER,
            X_PAYMENT_HEADER,
            X_PAYMENT_RESPONSE_HEADER,
        ] {
            assert_eq!(HeaderName::from_static(name).as_str(), name);
        }
    }

    #[test]
    fn test_settlement_prefers_v2_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_PAYMENT_RESPONSE_HEADER,
            HeaderValue::from_static(r#"{"success":false,"errorReason":"legacy"}"#),
        );
        let legacy = settlement_from_headers(&headers).unwrap().unwrap();
        assert_eq!(legacy.error_reason.as_deref(), Some("legacy"));

        headers.insert(
            PAYMENT_RESPONSE_HEADER,
            HeaderValue::from_static(r#"{"success":true,"transaction":"0x01"}"#),
        );
        let current = settlement_from_headers(&headers).unwrap().unwrap();
        assert!(current.success);
        assert!(settlement_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_malformed_requirement_header_is_reported() {
        let mut headers = HeaderMap::new();
        assert!(payment_required_from_headers(&headers).is_none());
        headers.insert(PAYMENT_REQUIRED_HEADER, HeaderValue::from_static("%%%"));
        assert!(matches!(
            payment_required_from_headers(&headers),
            Some(Err(_))
        ));
    }
}
