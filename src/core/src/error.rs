use thiserror::Error;

/// Attestor error types.
///
/// Every issuance or validation failure surfaces as exactly one of these.
/// Only [`AttestError::HardwareUnavailable`] is worth retrying; the trust
/// failures describe the token itself and will not change on a second try.
#[derive(Error, Debug)]
pub enum AttestError {
    /// The local attestation interface could not be reached in time
    #[error("Attestation hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Caller-supplied nonce set is unusable
    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    /// Token does not have the compact three-segment structure
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token carries no certificate chain
    #[error("Token carries no certificate chain")]
    MissingChain,

    /// Payload could not be decoded into claims
    #[error("Malformed claims: {0}")]
    MalformedClaims(String),

    /// Issuer linkage or a certificate signature failed
    #[error("Certificate chain broken: {0}")]
    ChainBroken(String),

    /// A certificate is outside its validity window
    #[error("Certificate outside validity window: {0}")]
    ExpiredCertificate(String),

    /// Terminal certificate is not a pinned root
    #[error("Untrusted root certificate: {fingerprint}")]
    UntrustedRoot { fingerprint: String },

    /// Token signature does not verify under the leaf key
    #[error("Token signature mismatch")]
    SignatureMismatch,

    /// Token `exp` is in the past
    #[error("Token expired at {exp} (now {now})")]
    TokenExpired { exp: i64, now: i64 },

    /// Token `nbf`/`iat` is in the future
    #[error("Token not valid before {not_before} (now {now})")]
    TokenNotYetValid { not_before: i64, now: i64 },

    /// Token nonce claim does not equal the requested nonce set
    #[error("Nonce mismatch: token was not issued for this request")]
    NonceMismatch,

    /// A policy predicate over a claim was not met
    #[error("Policy violation on '{claim}': {reason}")]
    PolicyViolation { claim: String, reason: String },

    /// Simulated token presented to a verifier with simulation disabled
    #[error("Simulated token rejected: verifier simulation mode is off")]
    SimulationNotAllowed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AttestError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::HardwareUnavailable(_) => "HARDWARE_UNAVAILABLE",
            Self::InvalidNonce(_) => "INVALID_NONCE",
            Self::MalformedToken(_) => "MALFORMED_TOKEN",
            Self::MissingChain => "MISSING_CHAIN",
            Self::MalformedClaims(_) => "MALFORMED_CLAIMS",
            Self::ChainBroken(_) => "CHAIN_BROKEN",
            Self::ExpiredCertificate(_) => "EXPIRED_CERTIFICATE",
            Self::UntrustedRoot { .. } => "UNTRUSTED_ROOT",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::TokenExpired { .. } => "TOKEN_EXPIRED",
            Self::TokenNotYetValid { .. } => "TOKEN_NOT_YET_VALID",
            Self::NonceMismatch => "NONCE_MISMATCH",
            Self::PolicyViolation { .. } => "POLICY_VIOLATION",
            Self::SimulationNotAllowed => "SIMULATION_NOT_ALLOWED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether repeating the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HardwareUnavailable(_))
    }

    /// Whether this is a cryptographic trust failure.
    pub fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            Self::ChainBroken(_)
                | Self::ExpiredCertificate(_)
                | Self::UntrustedRoot { .. }
                | Self::SignatureMismatch
        )
    }
}

impl From<serde_json::Error> for AttestError {
    fn from(err: serde_json::Error) -> Self {
        AttestError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AttestError {
    fn from(err: serde_yaml::Error) -> Self {
        AttestError::SerializationError(err.to_string())
    }
}

/// Result type alias for attestor operations
pub type Result<T> = std::result::Result<T, AttestError>;
