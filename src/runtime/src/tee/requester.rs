//! Quote requester.
//!
//! Obtains attestation tokens from the confidential-VM launcher, which
//! serves `POST /v1/token` over HTTP/1.1 on a local Unix socket and answers
//! with a compact token signed by the hardware-backed attestation service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use attestor_core::config::AttestationConfig;
use attestor_core::error::{AttestError, Result};
use attestor_core::tee::{TokenRequest, DEFAULT_AUDIENCE, TOKEN_ENDPOINT};

use super::nonce::AttestationRequest;
use super::simulate::SimulatedAttester;
use super::token::{peek_simulated, AttestationToken};

/// Largest launcher response accepted, headers included.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Default bound on one launcher exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the launcher's token endpoint.
#[derive(Debug, Clone)]
pub struct TeeServerClient {
    socket_path: PathBuf,
    timeout: Duration,
    default_audience: String,
}

impl TeeServerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            default_audience: DEFAULT_AUDIENCE.to_string(),
        }
    }

    pub fn from_config(config: &AttestationConfig) -> Self {
        Self::new(&config.socket_path)
            .with_timeout(config.request_timeout())
            .with_default_audience(config.default_audience.clone())
    }

    /// Bound on connect, write and read together.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_audience(mut self, audience: impl Into<String>) -> Self {
        self.default_audience = audience.into();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a token bound to the request's nonces.
    ///
    /// Any transport failure, including the timeout, is
    /// `HardwareUnavailable`. The returned token has only been parsed, not
    /// verified.
    pub async fn request_token(&self, request: &AttestationRequest) -> Result<AttestationToken> {
        let body = serde_json::to_string(&TokenRequest {
            audience: request
                .audience
                .clone()
                .unwrap_or_else(|| self.default_audience.clone()),
            token_type: request.token_type,
            nonces: request.nonces.to_vec(),
        })?;

        tracing::debug!(
            socket = %self.socket_path.display(),
            nonces = request.nonces.len(),
            token_type = %request.token_type,
            "Requesting attestation token"
        );

        let response = tokio::time::timeout(self.timeout, self.exchange(&body))
            .await
            .map_err(|_| {
                AttestError::HardwareUnavailable(format!(
                    "Attestation request to {} timed out after {}ms",
                    self.socket_path.display(),
                    self.timeout.as_millis()
                ))
            })??;

        if peek_simulated(&response)? {
            tracing::warn!("Launcher returned a simulated token");
            return Err(AttestError::SimulationNotAllowed);
        }
        let token = AttestationToken::parse(&response)?;

        tracing::info!(
            alg = %token.header().alg,
            chain_len = token.header().x5c.len(),
            "Received attestation token"
        );
        Ok(token)
    }

    /// One HTTP exchange. Returns the response body.
    async fn exchange(&self, body: &str) -> Result<String> {
        let http_request = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            TOKEN_ENDPOINT,
            body.len(),
            body,
        );

        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            AttestError::HardwareUnavailable(format!(
                "Attestation connection failed to {}: {}",
                self.socket_path.display(),
                e,
            ))
        })?;

        stream.write_all(http_request.as_bytes()).await.map_err(|e| {
            AttestError::HardwareUnavailable(format!("Attestation request write failed: {}", e))
        })?;

        let response = read_response(&mut stream).await?;
        let (status, body) = split_response(&response)?;

        tracing::debug!(status, body_len = body.len(), "Launcher responded");

        if status != 200 {
            return Err(AttestError::HardwareUnavailable(format!(
                "Attestation request failed with status {}: {}",
                status,
                body.chars().take(200).collect::<String>(),
            )));
        }

        Ok(body.to_string())
    }
}

/// Read until EOF or until the announced Content-Length has arrived.
async fn read_response(stream: &mut UnixStream) -> Result<String> {
    let mut response = Vec::with_capacity(8192);
    let mut buf = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut buf).await.map_err(|e| {
            AttestError::HardwareUnavailable(format!("Attestation response read failed: {}", e))
        })?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
        if response.len() > MAX_RESPONSE_BYTES {
            return Err(AttestError::HardwareUnavailable(format!(
                "Attestation response exceeds {} bytes",
                MAX_RESPONSE_BYTES
            )));
        }
        if body_complete(&response) {
            break;
        }
    }
    String::from_utf8(response).map_err(|_| {
        AttestError::HardwareUnavailable("Attestation response is not UTF-8".to_string())
    })
}

fn body_complete(response: &[u8]) -> bool {
    let Some(header_end) = find_header_end(response) else {
        return false;
    };
    let headers = String::from_utf8_lossy(&response[..header_end]);
    match content_length(&headers) {
        Some(len) => response.len() - (header_end + 4) >= len,
        None => false,
    }
}

fn find_header_end(response: &[u8]) -> Option<usize> {
    response.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &str) -> Option<usize> {
    headers.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Split a raw HTTP response into status code and body.
fn split_response(response: &str) -> Result<(u16, &str)> {
    let (head, body) = response.split_once("\r\n\r\n").ok_or_else(|| {
        AttestError::HardwareUnavailable("Malformed attestation response: no HTTP body".to_string())
    })?;

    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let status = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code.parse::<u16>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        AttestError::HardwareUnavailable(format!(
            "Malformed attestation response status line: {}",
            status_line.chars().take(100).collect::<String>()
        ))
    })?;

    Ok((status, body))
}

/// Token issuing backend, chosen once from configuration.
#[derive(Debug)]
pub enum Attester {
    /// Tokens from the launcher's hardware-backed attestation service.
    HardwareBacked(TeeServerClient),
    /// Deterministic software tokens marked as simulated.
    Simulated(SimulatedAttester),
}

impl Attester {
    pub fn from_config(config: &AttestationConfig) -> Result<Self> {
        if config.simulate {
            tracing::warn!("Attestation simulation enabled: tokens carry no hardware evidence");
            Ok(Self::Simulated(
                SimulatedAttester::new()?.with_default_audience(config.default_audience.clone()),
            ))
        } else {
            Ok(Self::HardwareBacked(TeeServerClient::from_config(config)))
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }

    /// Obtain a token bound to the request's nonces.
    pub async fn generate(&self, request: &AttestationRequest) -> Result<AttestationToken> {
        if request.nonces.is_empty() {
            return Err(AttestError::InvalidNonce(
                "at least one nonce is required".to_string(),
            ));
        }
        match self {
            Self::HardwareBacked(client) => client.request_token(request).await,
            Self::Simulated(attester) => attester.issue(request, chrono::Utc::now().timestamp()),
        }
    }
}
