#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP layer for the agora marketplace.
//!
//! Carries the pay-per-request negotiation client and the clients for the
//! marketplace backend, all written against small capability traits so the
//! core logic can be exercised without a network.
//!
//! # Modules
//!
//! - [`constants`] - Header names, backend paths, default timeouts
//! - [`headers`] - Payment header encoding and decoding
//! - [`error`] - Header and transport error types
//! - [`transport`] - The [`HttpTransport`](transport::HttpTransport) capability and its reqwest implementation
//! - [`negotiate`] - Probe, sign, retry and settle
//! - [`backend`] - Metadata preparation endpoints
//! - [`registry`] - Cached registry reads with explicit fallback
//! - [`wallet`] - JSON-RPC bridged wallet
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod backend;
pub mod constants;
pub mod error;
pub mod headers;
pub mod negotiate;
pub mod registry;
pub mod transport;
pub mod wallet;

pub use negotiate::{NegotiationError, PaidResponse, PaymentClient};
pub use transport::{HttpTransport, ReqwestTransport, ResourceRequest, ResourceResponse};
