//! Attestation token issuance and verification.
//!
//! - `requester`: Token requests to the launcher over its Unix socket.
//! - `assembler`: Signing raw quotes and claims into compact tokens.
//! - `token`: Compact token encoding and parsing.
//! - `chain`, `roots`, `cache`: Certificate chain verification.
//! - `verifier`: The validation pipeline.
//! - `policy`: Claims policy definitions.
//! - `simulate`: Deterministic stand-in for development without a TEE.

pub mod assembler;
pub mod cache;
pub mod chain;
pub mod claims;
pub mod nonce;
pub mod policy;
pub mod requester;
pub mod roots;
pub mod simulate;
pub mod token;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

pub use assembler::{assemble, QuoteSigner};
pub use cache::ChainCache;
pub use chain::{CertificateChain, PublicKey, MAX_CHAIN_LEN};
pub use claims::{Claims, ContainerClaims, Submods, DEBUG_DISABLED};
pub use nonce::{AttestationRequest, NonceSet};
pub use policy::ClaimsPolicy;
pub use requester::{Attester, TeeServerClient, MAX_RESPONSE_BYTES};
pub use roots::{fingerprint, fingerprint_hex, split_pem_bundle, TrustedRoots};
pub use simulate::{
    build_simulated_quote, is_simulated_quote, SimulatedAttester, SIMULATED_ISSUER,
    SIMULATED_KID,
};
pub use token::{peek_simulated, AttestationToken, SigningAlgorithm, TokenHeader};
pub use verifier::{ValidationReport, ValidationResult, Verifier, VerifierMode};
