//! `attestor issue` command - Request an attestation token.
//!
//! Asks the launcher (or the simulation shim) for a token bound to the given
//! nonces and prints it. Random nonces are generated when none are given.

use std::path::PathBuf;

use attestor_core::tee::TokenType;
use attestor_runtime::{AttestationRequest, Attester};
use clap::Args;

use super::ConfigArgs;

#[derive(Args)]
pub struct IssueArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Nonce to bind into the token (repeatable). A random nonce is
    /// generated if none is provided.
    #[arg(long = "nonce")]
    pub nonces: Vec<String>,

    /// Token audience. Defaults to the configured audience.
    #[arg(long)]
    pub audience: Option<String>,

    /// Token type to request (PKI or OIDC)
    #[arg(long)]
    pub token_type: Option<TokenType>,

    /// Launcher socket path override
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Print a JSON object with the token and its nonces instead of the
    /// bare token.
    #[arg(long)]
    pub json: bool,
}

/// JSON output for the issue command.
#[derive(serde::Serialize)]
struct IssueOutput {
    token: String,
    nonces: Vec<String>,
    simulated: bool,
}

pub async fn execute(args: IssueArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.config.resolve()?;
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    let nonces = if args.nonces.is_empty() {
        vec![generate_random_nonce()]
    } else {
        args.nonces
    };

    let request = AttestationRequest::new(nonces, args.audience)?
        .with_token_type(args.token_type.unwrap_or(config.token_type));
    let attester = Attester::from_config(&config)?;
    let token = attester.generate(&request).await?;

    if args.json {
        let output = IssueOutput {
            token: token.to_string(),
            nonces: request.nonces.to_vec(),
            simulated: token.is_simulated(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", token);
    }

    Ok(())
}

/// Generate a random nonce: 32 random bytes, hex-encoded.
fn generate_random_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut nonce = [0u8; 32];
    rng.fill(&mut nonce[..]);
    hex::encode(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_core::tee::{MAX_NONCE_BYTES, MIN_NONCE_BYTES};

    #[test]
    fn test_generate_random_nonce() {
        let nonce = generate_random_nonce();
        assert_eq!(nonce.len(), 64);
        assert!((MIN_NONCE_BYTES..=MAX_NONCE_BYTES).contains(&nonce.len()));
        // Two random nonces should (almost certainly) differ
        assert_ne!(nonce, generate_random_nonce());
    }

    #[tokio::test]
    async fn test_issue_simulated() {
        let args = IssueArgs {
            config: ConfigArgs {
                config: None,
                simulate: true,
            },
            nonces: vec!["nonce-0000000001".to_string()],
            audience: None,
            token_type: None,
            socket: None,
            json: true,
        };
        assert!(execute(args).await.is_ok());
    }

    #[tokio::test]
    async fn test_issue_rejects_short_nonce() {
        let args = IssueArgs {
            config: ConfigArgs {
                config: None,
                simulate: true,
            },
            nonces: vec!["short".to_string()],
            audience: None,
            token_type: None,
            socket: None,
            json: false,
        };
        let err = execute(args).await.unwrap_err();
        assert!(err.to_string().contains("Invalid nonce"));
    }
}
