//! Call builders for the identity and reputation registries.
//!
//! Both entry points are plain [`CallSpec`]s over the generic encoder; nothing
//! here knows about byte layout.

use agora::abi::{AbiValue, CallSpec, EncodeError};
use alloy_primitives::{Address, B256, U256};

/// Identity registry: `register(string agentURI)`.
pub const REGISTER_SIGNATURE: &str = "register(string)";

/// Reputation registry: `giveFeedback(agentId, value, valueDecimals, tag1, tag2, endpoint, feedbackURI, feedbackHash)`.
pub const GIVE_FEEDBACK_SIGNATURE: &str =
    "giveFeedback(uint256,int128,uint8,string,string,string,string,bytes32)";

/// Largest number of decimals a feedback value may declare.
pub const MAX_VALUE_DECIMALS: u8 = 18;

/// A `register(agentURI)` call on `registry`.
///
/// # Errors
///
/// Never fails for a well-formed signature; the error type is the encoder's.
pub fn register_call(registry: Address, agent_uri: &str) -> Result<CallSpec, EncodeError> {
    CallSpec::new(
        registry,
        REGISTER_SIGNATURE,
        vec![AbiValue::string(agent_uri)],
    )
}

/// Arguments of a `giveFeedback` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCall {
    /// Agent being rated.
    pub agent_id: U256,
    /// Signed fixed-point score.
    pub value: i128,
    /// Decimal places in `value`.
    pub value_decimals: u8,
    /// First free-form tag.
    pub tag1: String,
    /// Second free-form tag.
    pub tag2: String,
    /// Endpoint the feedback is about.
    pub endpoint: String,
    /// Off-chain feedback document.
    pub feedback_uri: String,
    /// Hash of the feedback document.
    pub feedback_hash: B256,
}

impl FeedbackCall {
    /// The call on `registry`.
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed signature; the error type is the encoder's.
    pub fn into_call(self, registry: Address) -> Result<CallSpec, EncodeError> {
        CallSpec::new(
            registry,
            GIVE_FEEDBACK_SIGNATURE,
            vec![
                AbiValue::uint256(self.agent_id),
                AbiValue::int128(self.value),
                AbiValue::uint8(self.value_decimals),
                AbiValue::String(self.tag1),
                AbiValue::String(self.tag2),
                AbiValue::String(self.endpoint),
                AbiValue::String(self.feedback_uri),
                AbiValue::bytes32(self.feedback_hash),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256};
    use alloy_sol_types::{SolCall, sol};

    use super::*;

    sol! {
        function register(string agentURI) external returns (uint256 agentId);
        function giveFeedback(
            uint256 agentId,
            int128 value,
            uint8 valueDecimals,
            string tag1,
            string tag2,
            string endpoint,
            string feedbackURI,
            bytes32 feedbackHash
        ) external;
    }

    const REGISTRY: Address = address!("0x8004A818BFB912233c491871b3d84c89A494BD9e");

    #[test]
    fn test_selectors_match_sol_types() {
        let register = register_call(REGISTRY, "ipfs://abc").unwrap();
        assert_eq!(register.selector().0, registerCall::SELECTOR);
        assert_eq!(register.target(), REGISTRY);

        let feedback = FeedbackCall {
            agent_id: U256::from(1u8),
            value: 0,
            value_decimals: 0,
            tag1: String::new(),
            tag2: String::new(),
            endpoint: String::new(),
            feedback_uri: String::new(),
            feedback_hash: B256::ZERO,
        }
        .into_call(REGISTRY)
        .unwrap();
        assert_eq!(feedback.selector().0, giveFeedbackCall::SELECTOR);
    }

    #[test]
    fn test_feedback_calldata_matches_sol_types() {
        let hash = b256!("0x9c22ff5f21f0b81b113e63f7db6da94fedef11b2119b4088b89664fb9a3cb658");
        let ours = FeedbackCall {
            agent_id: U256::from(42u64),
            value: -500,
            value_decimals: 2,
            tag1: String::new(),
            tag2: String::new(),
            endpoint: "https://plumber.example/api".into(),
            feedback_uri: "ipfs://QmFeedback".into(),
            feedback_hash: hash,
        }
        .into_call(REGISTRY)
        .unwrap()
        .encode()
        .unwrap();

        let theirs = giveFeedbackCall {
            agentId: U256::from(42u64),
            value: -500,
            valueDecimals: 2,
            tag1: String::new(),
            tag2: String::new(),
            endpoint: "https://plumber.example/api".into(),
            feedbackURI: "ipfs://QmFeedback".into(),
            feedbackHash: hash,
        }
        .abi_encode();
        assert_eq!(ours.as_bytes().as_ref(), theirs.as_slice());
    }
}
