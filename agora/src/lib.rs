#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the agora services marketplace.
//!
//! This crate is transport-agnostic: it builds contract calldata, signs
//! typed data through an injected wallet, guards the wallet's active chain,
//! and defines the wire types of the pay-per-request protocol. HTTP lives in
//! `agora-http`, EVM specifics in `agora-evm`, and the user-facing write flows
//! in `agora-market`.
//!
//! # Modules
//!
//! - [`abi`] - Calldata encoder and decoder (head/tail layout)
//! - [`wallet`] - EIP-1193 style wallet capability
//! - [`eip712`] - Typed-data documents and the signing adapter
//! - [`chain`] - Chain IDs and the chain guard
//! - [`networks`] - Network name registry
//! - [`proto`] - Payment requirement, proof and settlement wire types
//! - [`authorization`] - Transfer authorization construction and signing
//! - [`encoding`] - Base64 JSON header envelopes
//! - [`timestamp`] - Unix timestamps for validity windows
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod abi;
pub mod authorization;
pub mod chain;
pub mod eip712;
pub mod encoding;
pub mod networks;
pub mod proto;
pub mod timestamp;
pub mod wallet;
