//! Contract-call encoding using the standard head/tail ABI layout.
//!
//! The encoder builds calldata byte-for-byte from an ordered list of typed
//! values. It never infers a type from content: every [`AbiValue`] carries its
//! own [`AbiType`], and a [`CallSpec`] built from a canonical signature rejects
//! any parameter list whose types differ from the signature.
//!
//! # Layout
//!
//! ```text
//! selector (4) | head (32 * n) | tail (dynamic bodies, declaration order)
//! ```
//!
//! A static parameter occupies its head slot directly. A dynamic parameter's
//! head slot holds the byte offset of its body, measured from the start of the
//! parameter block (the first byte after the selector). Each body is a 32-byte
//! big-endian length followed by the raw bytes, right-padded to a slot boundary.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, I256, U256, hex, keccak256};

/// Size in bytes of one ABI slot.
pub const WORD: usize = 32;

/// Errors raised while encoding a parameter list.
///
/// All of these indicate a programming mistake in the caller; nothing is ever
/// truncated or coerced to make a value fit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// An integer or fixed-bytes type was declared with an impossible width.
    #[error("invalid width for {kind}: {bits}")]
    InvalidWidth {
        /// The type family (`uint`, `int`, `bytes`).
        kind: &'static str,
        /// The declared width.
        bits: u16,
    },
    /// An integer does not fit the declared width.
    #[error("value {value} does not fit in {ty}")]
    ValueOutOfRange {
        /// The declared type.
        ty: AbiType,
        /// The rejected value, rendered in decimal.
        value: String,
    },
    /// A fixed-size byte value does not have exactly the declared length.
    #[error("{ty} expects exactly {expected} bytes, got {actual}")]
    LengthMismatch {
        /// The declared type.
        ty: AbiType,
        /// The declared length.
        expected: usize,
        /// The supplied length.
        actual: usize,
    },
    /// A canonical signature could not be parsed.
    #[error("malformed function signature `{0}`")]
    MalformedSignature(String),
    /// Parameter types do not match the function signature.
    #[error("parameters {actual} do not match signature `{signature}`")]
    SignatureMismatch {
        /// The canonical signature.
        signature: String,
        /// The supplied parameter types, rendered as a tuple.
        actual: String,
    },
}

/// Errors raised while decoding a parameter block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The data ended before a slot or body could be read.
    #[error("calldata truncated: needed {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
    /// Calldata is shorter than a selector.
    #[error("calldata shorter than a selector")]
    MissingSelector,
    /// A dynamic parameter's offset does not land on a slot inside the tail.
    #[error("parameter {index} has invalid offset {offset}")]
    InvalidOffset {
        /// Parameter position.
        index: usize,
        /// The offset found in the head.
        offset: String,
    },
    /// A declared type has a width no ABI type can have.
    #[error("parameter {index} declares unsupported type {ty}")]
    InvalidType {
        /// Parameter position.
        index: usize,
        /// The declared type.
        ty: AbiType,
    },
    /// A slot holds bits that its declared type cannot have.
    #[error("parameter {index} is not a valid {ty}")]
    InvalidValue {
        /// Parameter position.
        index: usize,
        /// The declared type.
        ty: AbiType,
    },
}

/// The declared type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    /// `uintN`, 8 ≤ N ≤ 256, N a multiple of 8.
    Uint(u16),
    /// `intN`, 8 ≤ N ≤ 256, N a multiple of 8.
    Int(u16),
    /// `address`.
    Address,
    /// `bool`.
    Bool,
    /// `bytesN`, 1 ≤ N ≤ 32.
    FixedBytes(u8),
    /// `bytes`.
    Bytes,
    /// `string`.
    String,
}

impl AbiType {
    /// Whether the type is encoded in the tail.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::Bytes | Self::String)
    }

    fn check_width(self) -> Result<(), EncodeError> {
        match self {
            Self::Uint(bits) | Self::Int(bits) if bits == 0 || bits > 256 || bits % 8 != 0 => {
                Err(EncodeError::InvalidWidth {
                    kind: if matches!(self, Self::Uint(_)) { "uint" } else { "int" },
                    bits,
                })
            }
            Self::FixedBytes(size) if size == 0 || size > 32 => Err(EncodeError::InvalidWidth {
                kind: "bytes",
                bits: u16::from(size),
            }),
            _ => Ok(()),
        }
    }
}

impl Display for AbiType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Address => f.write_str("address"),
            Self::Bool => f.write_str("bool"),
            Self::FixedBytes(size) => write!(f, "bytes{size}"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
        }
    }
}

impl FromStr for AbiType {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || EncodeError::MalformedSignature(s.to_owned());
        let ty = match s {
            "address" => Self::Address,
            "bool" => Self::Bool,
            "bytes" => Self::Bytes,
            "string" => Self::String,
            "uint" => Self::Uint(256),
            "int" => Self::Int(256),
            _ => {
                if let Some(bits) = s.strip_prefix("uint") {
                    Self::Uint(bits.parse().map_err(|_| malformed())?)
                } else if let Some(bits) = s.strip_prefix("int") {
                    Self::Int(bits.parse().map_err(|_| malformed())?)
                } else if let Some(size) = s.strip_prefix("bytes") {
                    Self::FixedBytes(size.parse().map_err(|_| malformed())?)
                } else {
                    return Err(malformed());
                }
            }
        };
        ty.check_width()?;
        Ok(ty)
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    /// Unsigned integer of the given width.
    Uint {
        /// Declared width in bits.
        bits: u16,
        /// The value.
        value: U256,
    },
    /// Signed integer of the given width.
    Int {
        /// Declared width in bits.
        bits: u16,
        /// The value.
        value: I256,
    },
    /// 20-byte account address.
    Address(Address),
    /// Boolean.
    Bool(bool),
    /// Fixed-size byte sequence, placed at the start of its slot.
    FixedBytes {
        /// Declared size in bytes.
        size: u8,
        /// The raw bytes; must be exactly `size` long.
        data: Vec<u8>,
    },
    /// Variable-length bytes.
    Bytes(Vec<u8>),
    /// UTF-8 string.
    String(String),
}

impl AbiValue {
    /// A `uint256`.
    #[must_use]
    pub const fn uint256(value: U256) -> Self {
        Self::Uint { bits: 256, value }
    }

    /// A `uint8`.
    #[must_use]
    pub fn uint8(value: u8) -> Self {
        Self::Uint {
            bits: 8,
            value: U256::from(value),
        }
    }

    /// An `int128`.
    #[must_use]
    pub fn int128(value: i128) -> Self {
        Self::Int {
            bits: 128,
            value: i256_from_i128(value),
        }
    }

    /// An `int256`.
    #[must_use]
    pub const fn int256(value: I256) -> Self {
        Self::Int { bits: 256, value }
    }

    /// A `bytes32`.
    #[must_use]
    pub fn bytes32(value: B256) -> Self {
        Self::FixedBytes {
            size: 32,
            data: value.to_vec(),
        }
    }

    /// A `string`.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// The declared type of this value.
    #[must_use]
    pub const fn abi_type(&self) -> AbiType {
        match self {
            Self::Uint { bits, .. } => AbiType::Uint(*bits),
            Self::Int { bits, .. } => AbiType::Int(*bits),
            Self::Address(_) => AbiType::Address,
            Self::Bool(_) => AbiType::Bool,
            Self::FixedBytes { size, .. } => AbiType::FixedBytes(*size),
            Self::Bytes(_) => AbiType::Bytes,
            Self::String(_) => AbiType::String,
        }
    }

    /// Encodes this value on its own, without head/tail placement.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value does not fit its declared type.
    pub fn encode(&self) -> Result<EncodedParameter, EncodeError> {
        let ty = self.abi_type();
        ty.check_width()?;
        let mut word = [0u8; WORD];
        match self {
            Self::Uint { bits, value } => {
                if value.bit_len() > usize::from(*bits) {
                    return Err(EncodeError::ValueOutOfRange {
                        ty,
                        value: value.to_string(),
                    });
                }
                word = value.to_be_bytes::<WORD>();
            }
            Self::Int { bits, value } => {
                if !int_fits(*value, *bits) {
                    return Err(EncodeError::ValueOutOfRange {
                        ty,
                        value: value.to_string(),
                    });
                }
                // Two's complement over the full slot: negatives read as 2^256 + value.
                word = value.into_raw().to_be_bytes::<WORD>();
            }
            Self::Address(address) => word[12..].copy_from_slice(address.as_slice()),
            Self::Bool(flag) => word[WORD - 1] = u8::from(*flag),
            Self::FixedBytes { size, data } => {
                let size = usize::from(*size);
                if data.len() != size {
                    return Err(EncodeError::LengthMismatch {
                        ty,
                        expected: size,
                        actual: data.len(),
                    });
                }
                word[..size].copy_from_slice(data);
            }
            Self::Bytes(data) => return Ok(EncodedParameter::Dynamic(encode_dynamic(data))),
            Self::String(text) => {
                return Ok(EncodedParameter::Dynamic(encode_dynamic(text.as_bytes())));
            }
        }
        Ok(EncodedParameter::Static(word))
    }
}

impl Display for AbiValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint { value, .. } => write!(f, "{value}"),
            Self::Int { value, .. } => write!(f, "{value}"),
            Self::Address(address) => write!(f, "{address}"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::FixedBytes { data, .. } | Self::Bytes(data) => {
                f.write_str(&hex::encode_prefixed(data))
            }
            Self::String(text) => write!(f, "{text:?}"),
        }
    }
}

/// One encoded parameter before head/tail placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedParameter {
    /// A single slot written directly into the head.
    Static([u8; WORD]),
    /// A length-prefixed, slot-padded body appended to the tail.
    Dynamic(Vec<u8>),
}

impl EncodedParameter {
    /// Encoded length in bytes; always a multiple of [`WORD`].
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Static(_) => WORD,
            Self::Dynamic(body) => body.len(),
        }
    }

    /// Encoded parameters are never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// A 4-byte function selector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    /// Derives the selector from a canonical signature such as `register(string)`.
    #[must_use]
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        Self([hash[0], hash[1], hash[2], hash[3]])
    }

    /// The raw selector bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({self})")
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

/// Encoded calldata: selector followed by the parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calldata(Bytes);

impl Calldata {
    /// The selector prefix.
    #[must_use]
    pub fn selector(&self) -> Selector {
        Selector([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The parameter block following the selector.
    #[must_use]
    pub fn params(&self) -> &[u8] {
        &self.0[4..]
    }

    /// The full calldata.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consumes the calldata, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Decodes the parameter block against a declared type list.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the block does not match the layout.
    pub fn decode_params(&self, types: &[AbiType]) -> Result<Vec<AbiValue>, DecodeError> {
        decode(self.params(), types)
    }
}

impl TryFrom<Bytes> for Calldata {
    type Error = DecodeError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < 4 {
            return Err(DecodeError::MissingSelector);
        }
        Ok(Self(bytes))
    }
}

impl Display for Calldata {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(&self.0))
    }
}

/// A call to one contract entry point.
///
/// Parameter order and types always match `signature`; [`CallSpec::new`]
/// rejects anything else, so a constructed call is always well-typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    target: Address,
    signature: String,
    selector: Selector,
    params: Vec<AbiValue>,
}

impl CallSpec {
    /// Builds a call to `target` using a canonical signature.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::MalformedSignature`] for an unparseable signature
    /// and [`EncodeError::SignatureMismatch`] when `params` differ from it.
    pub fn new(
        target: Address,
        signature: &str,
        params: Vec<AbiValue>,
    ) -> Result<Self, EncodeError> {
        let declared = parse_signature(signature)?;
        let actual: Vec<AbiType> = params.iter().map(AbiValue::abi_type).collect();
        if declared != actual {
            return Err(EncodeError::SignatureMismatch {
                signature: signature.to_owned(),
                actual: render_tuple(&actual),
            });
        }
        Ok(Self {
            target,
            signature: signature.to_owned(),
            selector: Selector::from_signature(signature),
            params,
        })
    }

    /// The contract the call is addressed to.
    #[must_use]
    pub const fn target(&self) -> Address {
        self.target
    }

    /// The canonical signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The function selector.
    #[must_use]
    pub const fn selector(&self) -> Selector {
        self.selector
    }

    /// The ordered parameters.
    #[must_use]
    pub fn params(&self) -> &[AbiValue] {
        &self.params
    }

    /// The declared parameter types.
    #[must_use]
    pub fn param_types(&self) -> Vec<AbiType> {
        self.params.iter().map(AbiValue::abi_type).collect()
    }

    /// Encodes the call.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if a value does not fit its declared type.
    pub fn encode(&self) -> Result<Calldata, EncodeError> {
        encode(self.selector, &self.params)
    }
}

/// Encodes `selector` followed by the head/tail layout of `params`.
///
/// # Errors
///
/// Returns [`EncodeError`] if a value does not fit its declared type.
pub fn encode(selector: Selector, params: &[AbiValue]) -> Result<Calldata, EncodeError> {
    let block = encode_params(params)?;
    let mut out = Vec::with_capacity(4 + block.len());
    out.extend_from_slice(selector.as_bytes());
    out.extend_from_slice(&block);
    Ok(Calldata(out.into()))
}

/// Encodes a parameter block (no selector).
///
/// # Errors
///
/// Returns [`EncodeError`] if a value does not fit its declared type.
pub fn encode_params(params: &[AbiValue]) -> Result<Vec<u8>, EncodeError> {
    let encoded = params
        .iter()
        .map(AbiValue::encode)
        .collect::<Result<Vec<_>, _>>()?;

    let head_len = WORD * encoded.len();
    let tail_len: usize = encoded
        .iter()
        .filter(|p| matches!(p, EncodedParameter::Dynamic(_)))
        .map(EncodedParameter::len)
        .sum();
    let mut head = Vec::with_capacity(head_len + tail_len);
    let mut tail = Vec::with_capacity(tail_len);

    for parameter in &encoded {
        match parameter {
            EncodedParameter::Static(word) => head.extend_from_slice(word),
            EncodedParameter::Dynamic(body) => {
                let offset = U256::from(head_len + tail.len());
                head.extend_from_slice(&offset.to_be_bytes::<WORD>());
                tail.extend_from_slice(body);
            }
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

/// Decodes a parameter block (no selector) against a declared type list.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidType`] if a declared width is out of range,
/// and other [`DecodeError`]s if the block is truncated, an offset is invalid
/// or a slot holds bits its type cannot have.
pub fn decode(block: &[u8], types: &[AbiType]) -> Result<Vec<AbiValue>, DecodeError> {
    for (index, &ty) in types.iter().enumerate() {
        ty.check_width()
            .map_err(|_| DecodeError::InvalidType { index, ty })?;
    }

    let head_len = WORD * types.len();
    read_slice(block, 0, head_len)?;

    types
        .iter()
        .enumerate()
        .map(|(index, &ty)| {
            let word = read_word(block, index * WORD)?;
            if ty.is_dynamic() {
                decode_dynamic(block, head_len, index, ty, &word)
            } else {
                decode_static(index, ty, &word)
            }
        })
        .collect()
}

/// Parses the parameter types out of a canonical signature.
///
/// Only flat parameter lists are supported; tuples and arrays are rejected.
///
/// # Errors
///
/// Returns [`EncodeError::MalformedSignature`] if the signature is malformed.
pub fn parse_signature(signature: &str) -> Result<Vec<AbiType>, EncodeError> {
    let malformed = || EncodeError::MalformedSignature(signature.to_owned());
    let open = signature.find('(').ok_or_else(malformed)?;
    let inner = signature[open + 1..]
        .strip_suffix(')')
        .ok_or_else(malformed)?;
    if open == 0 || inner.contains(['(', ')', '[', ']', ' ']) {
        return Err(malformed());
    }
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|ty| ty.parse().map_err(|_| malformed()))
        .collect()
}

fn encode_dynamic(data: &[u8]) -> Vec<u8> {
    let padded = data.len().div_ceil(WORD) * WORD;
    let mut body = Vec::with_capacity(WORD + padded);
    body.extend_from_slice(&U256::from(data.len()).to_be_bytes::<WORD>());
    body.extend_from_slice(data);
    body.resize(WORD + padded, 0);
    body
}

fn int_fits(value: I256, bits: u16) -> bool {
    if bits == 256 {
        return true;
    }
    let limit = U256::from(1u8) << (usize::from(bits) - 1);
    let magnitude = value.unsigned_abs();
    if value.is_negative() {
        magnitude <= limit
    } else {
        magnitude < limit
    }
}

fn i256_from_i128(value: i128) -> I256 {
    let mut word = if value < 0 { [0xff; WORD] } else { [0; WORD] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    I256::from_raw(U256::from_be_bytes(word))
}

fn render_tuple(types: &[AbiType]) -> String {
    let parts: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(","))
}

fn read_slice(block: &[u8], start: usize, len: usize) -> Result<&[u8], DecodeError> {
    let end = start.checked_add(len).ok_or(DecodeError::Truncated {
        needed: usize::MAX,
        available: block.len(),
    })?;
    block.get(start..end).ok_or(DecodeError::Truncated {
        needed: end,
        available: block.len(),
    })
}

fn read_word(block: &[u8], start: usize) -> Result<[u8; WORD], DecodeError> {
    let mut word = [0u8; WORD];
    word.copy_from_slice(read_slice(block, start, WORD)?);
    Ok(word)
}

fn decode_static(index: usize, ty: AbiType, word: &[u8; WORD]) -> Result<AbiValue, DecodeError> {
    let invalid = || DecodeError::InvalidValue { index, ty };
    let value = match ty {
        AbiType::Uint(bits) => {
            let value = U256::from_be_bytes(*word);
            if value.bit_len() > usize::from(bits) {
                return Err(invalid());
            }
            AbiValue::Uint { bits, value }
        }
        AbiType::Int(bits) => {
            let value = I256::from_raw(U256::from_be_bytes(*word));
            if !int_fits(value, bits) {
                return Err(invalid());
            }
            AbiValue::Int { bits, value }
        }
        AbiType::Address => {
            if word[..12].iter().any(|&b| b != 0) {
                return Err(invalid());
            }
            AbiValue::Address(Address::from_slice(&word[12..]))
        }
        AbiType::Bool => match U256::from_be_bytes(*word) {
            v if v.is_zero() => AbiValue::Bool(false),
            v if v == U256::from(1u8) => AbiValue::Bool(true),
            _ => return Err(invalid()),
        },
        AbiType::FixedBytes(size) => {
            let size_usize = usize::from(size);
            if word[size_usize..].iter().any(|&b| b != 0) {
                return Err(invalid());
            }
            AbiValue::FixedBytes {
                size,
                data: word[..size_usize].to_vec(),
            }
        }
        AbiType::Bytes | AbiType::String => return Err(invalid()),
    };
    Ok(value)
}

fn decode_dynamic(
    block: &[u8],
    head_len: usize,
    index: usize,
    ty: AbiType,
    word: &[u8; WORD],
) -> Result<AbiValue, DecodeError> {
    let raw_offset = U256::from_be_bytes(*word);
    let invalid_offset = || DecodeError::InvalidOffset {
        index,
        offset: raw_offset.to_string(),
    };
    let offset = usize::try_from(raw_offset).map_err(|_| invalid_offset())?;
    if offset < head_len || offset % WORD != 0 {
        return Err(invalid_offset());
    }

    let length_word = read_word(block, offset)?;
    let length = usize::try_from(U256::from_be_bytes(length_word))
        .map_err(|_| DecodeError::InvalidValue { index, ty })?;
    let data = read_slice(block, offset + WORD, length)?.to_vec();

    match ty {
        AbiType::String => String::from_utf8(data)
            .map(AbiValue::String)
            .map_err(|_| DecodeError::InvalidValue { index, ty }),
        _ => Ok(AbiValue::Bytes(data)),
    }
}
