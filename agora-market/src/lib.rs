#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Write flows and configuration for the agora marketplace.
//!
//! - [`flows`] - Registration, feedback and booking orchestrators, each
//!   allowing one attempt in flight and reporting one [`flows::FlowError`]
//! - [`config`] - TOML configuration with environment expansion

pub mod config;
pub mod flows;
