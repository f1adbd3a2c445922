//! Shared data model, error taxonomy and configuration for the push gateway client.

pub mod config;
pub mod error;
pub mod types;

pub use error::GatewayError;
