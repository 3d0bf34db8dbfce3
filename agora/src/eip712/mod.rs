//! Typed-data signing over an injected wallet.
//!
//! [`TypedDataSigner`] turns any [`WalletTransport`] into an [`Eip712Signer`]
//! bound to one account. The caller supplies a domain, a type schema that
//! does *not* contain `EIP712Domain`, a primary type and a message; the
//! adapter synthesizes the domain type from the domain fields actually present
//! and forwards the request as `eth_signTypedData_v4`.
//!
//! The domain field order is fixed: `name`, `version`, `chainId`,
//! `verifyingContract`, `salt`. [`Eip712Domain::type_fields`] is the only
//! place that order is defined. Hashing is left to `alloy-dyn-abi`.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::wallet::{ETH_SIGN_TYPED_DATA_V4, WalletError, WalletTransport, accounts};

/// Name of the reserved domain type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Every possible domain member, in declaration order.
const DOMAIN_MEMBERS: [(&str, &str); 5] = [
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
    ("salt", "bytes32"),
];

/// One member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeField {
    /// Member name.
    pub name: String,
    /// Member type, e.g. `address`, `uint256` or another struct name.
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypeField {
    /// Creates a field.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Struct definitions keyed by type name.
pub type TypeSchema = BTreeMap<String, Vec<TypeField>>;

/// Errors raised while building or hashing typed data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypedDataError {
    /// The caller's schema declared the reserved domain type.
    #[error("type schema must not declare {DOMAIN_TYPE}; it is derived from the domain")]
    ReservedDomainType,
    /// The primary type has no definition.
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// The typed-data document itself is malformed.
    #[error("malformed typed data: {0}")]
    Malformed(String),
    /// The message does not match its declared types.
    #[error("cannot hash typed data: {0}")]
    Hash(String),
}

/// The signing domain.
///
/// Every field is optional; only the fields that are set take part in the
/// domain type and the domain separator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    /// Human-readable signing domain name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Domain version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Chain the signature is valid on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Contract that verifies the signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<Address>,
    /// Disambiguating salt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

impl Eip712Domain {
    /// An empty domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets `version`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets `chainId`.
    #[must_use]
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Sets `verifyingContract`.
    #[must_use]
    pub const fn with_verifying_contract(mut self, contract: Address) -> Self {
        self.verifying_contract = Some(contract);
        self
    }

    /// Sets `salt`.
    #[must_use]
    pub const fn with_salt(mut self, salt: B256) -> Self {
        self.salt = Some(salt);
        self
    }

    /// The `EIP712Domain` members for exactly the fields that are set.
    #[must_use]
    pub fn type_fields(&self) -> Vec<TypeField> {
        let present = [
            self.name.is_some(),
            self.version.is_some(),
            self.chain_id.is_some(),
            self.verifying_contract.is_some(),
            self.salt.is_some(),
        ];
        DOMAIN_MEMBERS
            .iter()
            .zip(present)
            .filter(|(_, set)| *set)
            .map(|((name, ty), _)| TypeField::new(*name, *ty))
            .collect()
    }

    /// The domain type declaration, e.g. `EIP712Domain(string name,uint256 chainId)`.
    #[must_use]
    pub fn encode_type(&self) -> String {
        let members = self
            .type_fields()
            .iter()
            .map(|field| format!("{} {}", field.ty, field.name))
            .collect::<Vec<_>>()
            .join(",");
        format!("{DOMAIN_TYPE}({members})")
    }

    /// The domain as a JSON object with only the set fields.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// A complete `eth_signTypedData_v4` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// All struct types, including `EIP712Domain`.
    pub types: TypeSchema,
    /// Name of the signed struct.
    pub primary_type: String,
    /// The domain values.
    pub domain: Value,
    /// The message values.
    pub message: Value,
}

impl TypedData {
    /// Assembles a document from a domain and a caller schema.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError::ReservedDomainType`] if `types` declares
    /// `EIP712Domain`, and [`TypedDataError::UnknownType`] if `primary_type`
    /// is not declared.
    pub fn new(
        domain: &Eip712Domain,
        types: &TypeSchema,
        primary_type: &str,
        message: Value,
    ) -> Result<Self, TypedDataError> {
        if types.contains_key(DOMAIN_TYPE) {
            return Err(TypedDataError::ReservedDomainType);
        }
        if !types.contains_key(primary_type) {
            return Err(TypedDataError::UnknownType(primary_type.to_owned()));
        }
        let mut all = types.clone();
        all.insert(DOMAIN_TYPE.to_owned(), domain.type_fields());
        Ok(Self {
            types: all,
            primary_type: primary_type.to_owned(),
            domain: domain.to_json(),
            message,
        })
    }

    /// Parses a document sent as either a JSON string or a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError::Malformed`] if the value is not a typed-data document.
    pub fn from_json(value: &Value) -> Result<Self, TypedDataError> {
        let parsed = match value {
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        parsed.map_err(|e| TypedDataError::Malformed(e.to_string()))
    }

    /// Resolves the document into [`alloy_dyn_abi::TypedData`].
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError::Malformed`] if the types or domain do not parse.
    pub fn resolve(&self) -> Result<alloy_dyn_abi::TypedData, TypedDataError> {
        let value =
            serde_json::to_value(self).map_err(|e| TypedDataError::Malformed(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| TypedDataError::Malformed(e.to_string()))
    }

    /// `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(message))`.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError`] if the document is inconsistent.
    pub fn signing_hash(&self) -> Result<B256, TypedDataError> {
        self.resolve()?
            .eip712_signing_hash()
            .map_err(|e| TypedDataError::Hash(e.to_string()))
    }
}

/// Errors raised by an [`Eip712Signer`].
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The typed data could not be assembled.
    #[error(transparent)]
    TypedData(#[from] TypedDataError),
    /// The wallet refused or failed the request.
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// A typed-data signing capability bound to one account.
#[async_trait::async_trait]
pub trait Eip712Signer: Send + Sync {
    /// The signing account.
    fn address(&self) -> Address;

    /// Signs `message` as `primary_type` under `domain`.
    ///
    /// `types` must not declare `EIP712Domain`; the domain type is derived
    /// from the fields set on `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] if the data is inconsistent or the wallet fails.
    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &TypeSchema,
        primary_type: &str,
        message: &Value,
    ) -> Result<Bytes, SignError>;
}

#[async_trait::async_trait]
impl<T: Eip712Signer + ?Sized> Eip712Signer for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &TypeSchema,
        primary_type: &str,
        message: &Value,
    ) -> Result<Bytes, SignError> {
        (**self)
            .sign_typed_data(domain, types, primary_type, message)
            .await
    }
}

/// Adapts a [`WalletTransport`] into an [`Eip712Signer`].
#[derive(Debug, Clone)]
pub struct TypedDataSigner<W> {
    wallet: W,
    account: Address,
}

impl<W: WalletTransport> TypedDataSigner<W> {
    /// Binds the signer to `account`.
    pub const fn new(wallet: W, account: Address) -> Self {
        Self { wallet, account }
    }

    /// Binds the signer to the wallet's first account.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError`] if the accounts cannot be read or the list is empty.
    pub async fn connect(wallet: W) -> Result<Self, WalletError> {
        let account = accounts(&wallet)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::InvalidResponse("wallet exposes no accounts".into()))?;
        Ok(Self::new(wallet, account))
    }

    /// The underlying wallet.
    pub const fn wallet(&self) -> &W {
        &self.wallet
    }
}

#[async_trait::async_trait]
impl<W: WalletTransport> Eip712Signer for TypedDataSigner<W> {
    fn address(&self) -> Address {
        self.account
    }

    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        account = %self.account,
        primary_type = primary_type
    )))]
    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &TypeSchema,
        primary_type: &str,
        message: &Value,
    ) -> Result<Bytes, SignError> {
        let typed = TypedData::new(domain, types, primary_type, message.clone())?;
        let document = serde_json::to_string(&typed)
            .map_err(|e| TypedDataError::Malformed(e.to_string()))?;

        #[cfg(feature = "telemetry")]
        debug!(domain = %domain.encode_type(), "Requesting typed-data signature");

        let result = self
            .wallet
            .request(ETH_SIGN_TYPED_DATA_V4, json!([self.account, document]))
            .await?;
        let signature: Bytes = serde_json::from_value(result)
            .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
        Ok(signature)
    }
}
