#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM support for the agora marketplace.
//!
//! - [`calls`] - `register` and `giveFeedback` call builders for the
//!   identity and reputation registries
//! - [`networks`] - Known EVM networks and USDC deployments
//! - [`wallet`] - [`LocalWallet`], a private-key wallet speaking the same
//!   requests as a browser wallet
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod calls;
pub mod networks;
pub mod wallet;

pub use networks::*;
pub use wallet::LocalWallet;
