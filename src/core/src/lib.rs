//! Attestor Core - shared types for attestation issuance and validation.
//!
//! Holds the error taxonomy, the configuration consumed by both sides of
//! the protocol, and the launcher wire types.

pub mod config;
pub mod error;
pub mod tee;

pub use config::AttestationConfig;
pub use error::{AttestError, Result};
pub use tee::{TokenRequest, TokenType};

/// Attestor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
