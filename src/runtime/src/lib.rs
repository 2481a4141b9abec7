//! Attestor Runtime - attestation token issuance and verification.
//!
//! Requests hardware-backed attestation tokens from the confidential-VM
//! launcher, and validates tokens against pinned roots of trust and a
//! claims policy.

#![allow(clippy::result_large_err)]

pub mod tee;

// Re-export common types
pub use tee::{assemble, AttestationRequest, AttestationToken, Claims, NonceSet, QuoteSigner};
pub use tee::{Attester, SimulatedAttester, TeeServerClient};
pub use tee::{ClaimsPolicy, TrustedRoots, ValidationResult, Verifier, VerifierMode};

/// Attestor Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
