//! Payment protocol wire types.
//!
//! Two envelope generations are understood:
//!
//! - V1: requirements arrive in the 402 JSON body under `accepts`, amounts are
//!   named `maxAmountRequired`, and the proof carries `scheme` and `network`.
//! - V2: requirements arrive base64-encoded in a response header, and the proof
//!   echoes the accepted requirement back under `accepted`.
//!
//! All types serialize with camelCase field names.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

use crate::chain::ChainId;
use crate::eip712::{TypeField, TypeSchema};
use crate::encoding::{Base64Bytes, EnvelopeError};
use crate::networks::NetworkRegistry;
use crate::timestamp::UnixTimestamp;

/// The only scheme this client pays with: a fixed-amount transfer authorization.
pub const EXACT_SCHEME: &str = "exact";

/// Protocol envelope generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum X402Version {
    /// Body-carried requirements, `X-PAYMENT` proofs.
    #[default]
    V1,
    /// Header-carried requirements, `PAYMENT-SIGNATURE` proofs.
    V2,
}

impl X402Version {
    /// The numeric wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

impl TryFrom<u8> for X402Version {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(other),
        }
    }
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::try_from(raw)
            .map_err(|v| serde::de::Error::custom(format!("unsupported x402Version {v}")))
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// A token amount in base units, carried on the wire as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl FromStr for TokenAmount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16),
            None => U256::from_str_radix(s, 10),
        };
        parsed
            .map(Self)
            .map_err(|e| format!("invalid token amount {s:?}: {e}"))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self::from(n)),
        }
    }
}

/// Signing-domain hints a requirement may carry in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementExtra {
    /// Token's EIP-712 domain name, e.g. `USD Coin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token's EIP-712 domain version, e.g. `2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional domain salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

/// One acceptable way to pay for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme, e.g. `exact`.
    pub scheme: String,
    /// Network as CAIP-2 (`eip155:84532`) or name (`base-sepolia`).
    pub network: String,
    /// Required amount in token base units.
    #[serde(alias = "maxAmountRequired")]
    pub amount: TokenAmount,
    /// Token contract; also the signature's verifying contract.
    pub asset: Address,
    /// Payee.
    pub pay_to: Address,
    /// Upper bound on the authorization's lifetime.
    #[serde(default)]
    pub max_timeout_seconds: u64,
    /// Resource URL (V1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Resource description (V1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resource MIME type (V1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Server-chosen start of the validity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_after: Option<UnixTimestamp>,
    /// Server-chosen end of the validity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_before: Option<UnixTimestamp>,
    /// Server-chosen single-use nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<B256>,
    /// Scheme-specific data, echoed back untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirement {
    /// Signing-domain hints from `extra`, if it has the expected shape.
    #[must_use]
    pub fn domain_extra(&self) -> Option<RequirementExtra> {
        self.extra
            .as_ref()
            .and_then(|extra| serde_json::from_value(extra.clone()).ok())
    }

    /// Whether this requirement uses the `exact` scheme.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.scheme == EXACT_SCHEME
    }
}

/// A 402 response's payment demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Envelope generation.
    #[serde(default)]
    pub x402_version: X402Version,
    /// Server-supplied reason, e.g. why an earlier proof was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Acceptable payment options, in server preference order.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirement>,
    /// Resource description (V2 only), echoed back in the proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl PaymentRequired {
    /// Decodes a base64 JSON header value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the value is not base64 JSON of this shape.
    pub fn from_header(value: &[u8]) -> Result<Self, EnvelopeError> {
        Base64Bytes::from(value).decode_json()
    }

    /// The first `exact` requirement whose network is registered.
    #[must_use]
    pub fn select(&self, networks: &NetworkRegistry) -> Option<(&PaymentRequirement, ChainId)> {
        self.accepts
            .iter()
            .filter(|requirement| requirement.is_exact())
            .find_map(|requirement| {
                networks
                    .resolve(&requirement.network)
                    .map(|chain_id| (requirement, chain_id))
            })
    }
}

/// ERC-3009 `TransferWithAuthorization` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    /// Payer.
    pub from: Address,
    /// Payee.
    pub to: Address,
    /// Amount in token base units.
    pub value: TokenAmount,
    /// Not valid before this instant.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this instant.
    pub valid_before: UnixTimestamp,
    /// Single-use nonce.
    pub nonce: B256,
}

impl TransferAuthorization {
    /// EIP-712 primary type name.
    pub const PRIMARY_TYPE: &'static str = "TransferWithAuthorization";

    /// The EIP-712 struct definition, without the domain type.
    #[must_use]
    pub fn type_schema() -> TypeSchema {
        TypeSchema::from([(
            Self::PRIMARY_TYPE.to_owned(),
            vec![
                TypeField::new("from", "address"),
                TypeField::new("to", "address"),
                TypeField::new("value", "uint256"),
                TypeField::new("validAfter", "uint256"),
                TypeField::new("validBefore", "uint256"),
                TypeField::new("nonce", "bytes32"),
            ],
        )])
    }

    /// The EIP-712 message object.
    #[must_use]
    pub fn message(&self) -> Value {
        json!({
            "from": self.from,
            "to": self.to,
            "value": self.value.to_string(),
            "validAfter": self.valid_after.as_secs().to_string(),
            "validBefore": self.valid_before.as_secs().to_string(),
            "nonce": self.nonce,
        })
    }
}

/// A signed transfer authorization: the proof's `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// 65-byte signature over the authorization.
    pub signature: Bytes,
    /// The signed message.
    pub authorization: TransferAuthorization,
}

/// V1 payment proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProofV1 {
    /// Always V1.
    pub x402_version: X402Version,
    /// Scheme paid with.
    pub scheme: String,
    /// Network paid on.
    pub network: String,
    /// Signed authorization.
    pub payload: PaymentAuthorization,
}

/// V2 payment proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProofV2 {
    /// Always V2.
    pub x402_version: X402Version,
    /// The requirement being satisfied, echoed back.
    pub accepted: PaymentRequirement,
    /// Resource description from the demand, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    /// Signed authorization.
    pub payload: PaymentAuthorization,
}

/// A payment proof in either envelope generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentProof {
    /// `accepted` is unique to V2, so it is tried first.
    V2(PaymentProofV2),
    /// V1 envelope.
    V1(PaymentProofV1),
}

impl PaymentProof {
    /// Builds the proof matching the demand's envelope generation.
    #[must_use]
    pub fn for_demand(
        demand: &PaymentRequired,
        requirement: &PaymentRequirement,
        payload: PaymentAuthorization,
    ) -> Self {
        match demand.x402_version {
            X402Version::V1 => Self::V1(PaymentProofV1 {
                x402_version: X402Version::V1,
                scheme: requirement.scheme.clone(),
                network: requirement.network.clone(),
                payload,
            }),
            X402Version::V2 => Self::V2(PaymentProofV2 {
                x402_version: X402Version::V2,
                accepted: requirement.clone(),
                resource: demand.resource.clone(),
                payload,
            }),
        }
    }

    /// Envelope generation.
    #[must_use]
    pub const fn version(&self) -> X402Version {
        match self {
            Self::V1(_) => X402Version::V1,
            Self::V2(_) => X402Version::V2,
        }
    }

    /// The signed authorization.
    #[must_use]
    pub const fn payload(&self) -> &PaymentAuthorization {
        match self {
            Self::V1(p) => &p.payload,
            Self::V2(p) => &p.payload,
        }
    }

    /// Base64 JSON header value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Base64Bytes::encode_json(self).map(|b| b.to_string())
    }
}

/// Settlement receipt returned with a paid response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    /// Whether the transfer settled.
    pub success: bool,
    /// Settlement transaction reference.
    #[serde(default, alias = "txHash", skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// Network the transfer settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Paying account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
    /// Machine-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl SettlementResult {
    /// Decodes a settlement header: base64 JSON, or bare JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the value is neither.
    pub fn from_header(value: &[u8]) -> Result<Self, EnvelopeError> {
        Base64Bytes::from(value)
            .decode_json()
            .or_else(|base64_error| serde_json::from_slice(value).map_err(|_| base64_error))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;
    use crate::networks::NetworkInfo;

    const NETWORKS: &[NetworkInfo] = &[NetworkInfo {
        name: "base-sepolia",
        chain_id: 84532,
    }];

    fn v1_body() -> Value {
        json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [
                {
                    "scheme": "upto",
                    "network": "base-sepolia",
                    "maxAmountRequired": "5",
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "payTo": "0x00000000000000000000000000000000000000bb",
                    "maxTimeoutSeconds": 60
                },
                {
                    "scheme": "exact",
                    "network": "solana",
                    "maxAmountRequired": "10",
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "payTo": "0x00000000000000000000000000000000000000bb",
                    "maxTimeoutSeconds": 60
                },
                {
                    "scheme": "exact",
                    "network": "base-sepolia",
                    "maxAmountRequired": "10000",
                    "resource": "https://api.example/book",
                    "description": "Booking fee",
                    "mimeType": "application/json",
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "payTo": "0x00000000000000000000000000000000000000bb",
                    "maxTimeoutSeconds": 300,
                    "extra": { "name": "USDC", "version": "2" }
                }
            ]
        })
    }

    #[test]
    fn test_v1_body_parses_and_selects_exact_on_known_network() {
        let demand: PaymentRequired = serde_json::from_value(v1_body()).unwrap();
        assert_eq!(demand.x402_version, X402Version::V1);
        assert_eq!(demand.accepts.len(), 3);

        let networks = NetworkRegistry::from_networks(NETWORKS);
        let (requirement, chain_id) = demand.select(&networks).unwrap();
        assert_eq!(chain_id, 84532);
        assert_eq!(requirement.amount, TokenAmount::from(10_000));
        assert_eq!(requirement.max_timeout_seconds, 300);
        assert_eq!(
            requirement.domain_extra(),
            Some(RequirementExtra {
                name: Some("USDC".into()),
                version: Some("2".into()),
                salt: None,
            })
        );
    }

    #[test]
    fn test_v2_header_roundtrip() {
        let demand = PaymentRequired {
            x402_version: X402Version::V2,
            error: None,
            accepts: vec![PaymentRequirement {
                scheme: EXACT_SCHEME.into(),
                network: "eip155:84532".into(),
                amount: TokenAmount::from(1_000),
                asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
                pay_to: address!("0x00000000000000000000000000000000000000bb"),
                max_timeout_seconds: 60,
                resource: None,
                description: None,
                mime_type: None,
                valid_after: Some(UnixTimestamp::from_secs(100)),
                valid_before: Some(UnixTimestamp::from_secs(200)),
                nonce: Some(B256::repeat_byte(7)),
                extra: None,
            }],
            resource: Some(json!({ "url": "https://api.example/book" })),
        };
        let header = Base64Bytes::encode_json(&demand).unwrap();
        let decoded = PaymentRequired::from_header(header.as_ref()).unwrap();
        assert_eq!(decoded, demand);
        assert!(PaymentRequired::from_header(b"not base64!").is_err());
    }

    #[test]
    fn test_proof_shape_follows_demand_version() {
        let demand: PaymentRequired = serde_json::from_value(v1_body()).unwrap();
        let requirement = &demand.accepts[2];
        let payload = PaymentAuthorization {
            signature: Bytes::from(vec![1; 65]),
            authorization: TransferAuthorization {
                from: Address::ZERO,
                to: requirement.pay_to,
                value: requirement.amount,
                valid_after: UnixTimestamp::from_secs(1),
                valid_before: UnixTimestamp::from_secs(2),
                nonce: B256::ZERO,
            },
        };

        let v1 = PaymentProof::for_demand(&demand, requirement, payload.clone());
        let json = serde_json::to_value(&v1).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["network"], "base-sepolia");
        assert_eq!(json["payload"]["authorization"]["value"], "10000");
        assert_eq!(json["payload"]["authorization"]["validAfter"], "1");

        let mut v2_demand = demand.clone();
        v2_demand.x402_version = X402Version::V2;
        let v2 = PaymentProof::for_demand(&v2_demand, requirement, payload);
        let json = serde_json::to_value(&v2).unwrap();
        assert_eq!(json["x402Version"], 2);
        assert_eq!(json["accepted"]["amount"], "10000");

        let decoded: PaymentProof = Base64Bytes::from(v2.encode().unwrap().as_str())
            .decode_json()
            .unwrap();
        assert_eq!(decoded, v2);
    }

    #[test]
    fn test_settlement_header_accepts_base64_or_json() {
        let raw = br#"{"success":true,"txHash":"0xabc","network":"base-sepolia","payer":"0x00000000000000000000000000000000000000aa"}"#;
        let plain = SettlementResult::from_header(raw).unwrap();
        assert_eq!(plain.transaction.as_deref(), Some("0xabc"));

        let encoded = Base64Bytes::encode(raw);
        let decoded = SettlementResult::from_header(encoded.as_ref()).unwrap();
        assert_eq!(decoded, plain);
        assert!(SettlementResult::from_header(b"{}").is_err());
    }

    #[test]
    fn test_token_amount_wire_forms() {
        let from_string: TokenAmount = serde_json::from_value(json!("12345")).unwrap();
        let from_number: TokenAmount = serde_json::from_value(json!(12345)).unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(serde_json::to_value(from_string).unwrap(), json!("12345"));
        assert!(serde_json::from_value::<TokenAmount>(json!("-1")).is_err());
    }
}
