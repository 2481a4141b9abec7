//! Attestation configuration.
//!
//! Loaded once at process start from a YAML or JSON file, then adjusted by
//! environment overrides. The resulting value is treated as immutable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AttestError, Result};
use crate::tee::{TokenType, DEFAULT_AUDIENCE, TEESERVER_SOCKET_PATH};

/// Enables simulated issuance and validation when set to `1` or `true`.
pub const SIMULATE_ENV: &str = "SIMULATE_ATTESTATION";

/// Overrides [`AttestationConfig::socket_path`].
pub const SOCKET_PATH_ENV: &str = "ATTESTOR_SOCKET_PATH";

/// Overrides [`AttestationConfig::clock_skew_secs`].
pub const CLOCK_SKEW_ENV: &str = "ATTESTOR_CLOCK_SKEW_SECS";

/// Comma-separated pinned root fingerprints, appended to the file's list.
pub const TRUSTED_ROOTS_ENV: &str = "ATTESTOR_TRUSTED_ROOTS";

/// Attestation settings for both the issuing and the verifying side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Pinned root fingerprints (hex SHA-256 of the root certificate DER).
    #[serde(default)]
    pub trusted_root_fingerprints: Vec<String>,

    /// PEM files whose certificates are pinned as roots.
    #[serde(default)]
    pub trusted_root_certs: Vec<PathBuf>,

    /// Symmetric tolerance applied to every time comparison.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// Use the simulation shim instead of hardware.
    #[serde(default)]
    pub simulate: bool,

    /// Launcher attestation socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Upper bound for one hardware token request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Cache successful chain verifications for at most this long.
    /// Disabled when unset.
    #[serde(default)]
    pub chain_cache_ttl_secs: Option<u64>,

    /// Audience used when a request does not name one.
    #[serde(default = "default_audience")]
    pub default_audience: String,

    /// Token flavour requested from the launcher.
    #[serde(default)]
    pub token_type: TokenType,
}

fn default_clock_skew_secs() -> u64 {
    60
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(TEESERVER_SOCKET_PATH)
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            trusted_root_fingerprints: Vec::new(),
            trusted_root_certs: Vec::new(),
            clock_skew_secs: default_clock_skew_secs(),
            simulate: false,
            socket_path: default_socket_path(),
            request_timeout_ms: default_request_timeout_ms(),
            chain_cache_ttl_secs: None,
            default_audience: default_audience(),
            token_type: TokenType::default(),
        }
    }
}

impl AttestationConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension),
    /// apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but without validation. The issuing side
    /// needs no trusted roots.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AttestError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let mut config: Self = if is_json {
            serde_json::from_str(&data)?
        } else {
            serde_yaml::from_str(&data)?
        };

        config.apply_env();
        tracing::debug!(
            path = %path.display(),
            simulate = config.simulate,
            roots = config.trusted_root_fingerprints.len() + config.trusted_root_certs.len(),
            "Loaded attestation config"
        );
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(SIMULATE_ENV) {
            self.simulate = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var(SOCKET_PATH_ENV) {
            if !v.is_empty() {
                self.socket_path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var(CLOCK_SKEW_ENV) {
            match v.parse() {
                Ok(secs) => self.clock_skew_secs = secs,
                Err(_) => tracing::warn!(value = %v, "Ignoring invalid {}", CLOCK_SKEW_ENV),
            }
        }
        if let Ok(v) = std::env::var(TRUSTED_ROOTS_ENV) {
            self.trusted_root_fingerprints.extend(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }
    }

    /// Reject configurations that could never accept a hardware token.
    pub fn validate(&self) -> Result<()> {
        if !self.simulate
            && self.trusted_root_fingerprints.is_empty()
            && self.trusted_root_certs.is_empty()
        {
            return Err(AttestError::ConfigError(
                "at least one trusted root is required unless simulate is enabled".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(AttestError::ConfigError(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.chain_cache_ttl_secs == Some(0) {
            return Err(AttestError::ConfigError(
                "chain_cache_ttl_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clock_skew(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.clock_skew_secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}
