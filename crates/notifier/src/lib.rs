//! Push gateway delivery with retry and partial-failure reconciliation.
//!
//! - [`GatewayClient`] performs exactly one request per call.
//! - [`DispatchEngine`] re-drives sends, narrowing to the recipients that
//!   have not been reached yet.
//! - [`GroupOperationEngine`] re-drives notification-key operations.

pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod group;
pub mod transport;
pub mod wire;

pub use backoff::{BackoffPolicy, ExponentialBackoff, NoBackoff};
pub use client::GatewayClient;
pub use dispatch::DispatchEngine;
pub use group::GroupOperationEngine;
pub use transport::{GatewayRequest, GatewayResponse, MockTransport, ReqwestTransport, Transport};
