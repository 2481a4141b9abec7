//! Wire types for the confidential-space launcher attestation endpoint.
//!
//! The launcher exposes an HTTP/1.1 server on a Unix socket. A workload
//! posts a [`TokenRequest`] to [`TOKEN_ENDPOINT`] and receives the signed
//! token as the raw response body.

use serde::{Deserialize, Serialize};

/// Launcher attestation socket inside a confidential-space VM.
pub const TEESERVER_SOCKET_PATH: &str = "/run/container_launcher/teeserver.sock";

/// Token endpoint path on the launcher socket.
pub const TOKEN_ENDPOINT: &str = "/v1/token";

/// Audience the launcher uses when none is requested.
pub const DEFAULT_AUDIENCE: &str = "https://sts.google.com";

/// Minimum nonce length in bytes.
pub const MIN_NONCE_BYTES: usize = 10;

/// Maximum nonce length in bytes.
pub const MAX_NONCE_BYTES: usize = 74;

/// Maximum number of nonces per token.
pub const MAX_NONCES: usize = 6;

/// Token flavour requested from the launcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Chain-of-trust token carrying its certificate chain inline.
    #[default]
    #[serde(rename = "PKI")]
    Pki,
    /// OIDC token verified against published signing keys.
    #[serde(rename = "OIDC")]
    Oidc,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pki => write!(f, "PKI"),
            Self::Oidc => write!(f, "OIDC"),
        }
    }
}

impl std::str::FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PKI" => Ok(Self::Pki),
            "OIDC" => Ok(Self::Oidc),
            _ => Err(format!("unknown token type: '{}' (supported: PKI, OIDC)", s)),
        }
    }
}

/// JSON body posted to the launcher token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRequest {
    pub audience: String,
    pub token_type: TokenType,
    pub nonces: Vec<String>,
}
