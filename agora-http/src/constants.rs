//! HTTP-specific constants for the payment protocol and the marketplace backend.

use std::time::Duration;

// Header names are lowercase so they can be used with `HeaderName::from_static`;
// HTTP matches them case-insensitively.

/// HTTP header for V2 payment proofs (client → server).
pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";

/// HTTP header for 402 payment requirements (server → client).
pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";

/// HTTP header for settlement results (server → client).
pub const PAYMENT_RESPONSE_HEADER: &str = "payment-response";

/// V1 legacy header for payment proofs (client → server).
pub const X_PAYMENT_HEADER: &str = "x-payment";

/// V1 legacy header for settlement results.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";

/// Default bound on each probe and retry round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TTL for registry reads.
pub const DEFAULT_REGISTRY_CACHE_TTL: Duration = Duration::from_secs(60);

/// Backend path preparing agent registration metadata.
pub const AGENT_METADATA_PATH: &str = "api/agents/metadata";

/// Backend path preparing feedback metadata.
pub const FEEDBACK_METADATA_PATH: &str = "api/feedback/metadata";

/// Backend path accepting paid service orders.
pub const ORDERS_PATH: &str = "api/orders";

/// Backend path listing registered agents.
pub const AGENTS_PATH: &str = "api/agents";
