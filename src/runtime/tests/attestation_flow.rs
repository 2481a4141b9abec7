//! Attestation flow integration test: issue through the launcher socket,
//! validate against pinned roots.
//!
//! 1. Start a fake launcher on a Unix socket in a temp directory. It signs
//!    tokens for whatever nonces it is asked for, using an rcgen chain.
//! 2. Request a token through `Attester::HardwareBacked`
//! 3. Validate it with a `Verifier` pinned to the chain's root
//! 4. Repeat the round trip with simulation enabled on both sides
//!
//! ## Running
//!
//! ```bash
//! cargo test -p attestor-runtime --test attestation_flow
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use attestor_core::config::AttestationConfig;
use attestor_core::error::AttestError;
use attestor_core::tee::TokenRequest;
use attestor_runtime::tee::{fingerprint_hex, ContainerClaims, Submods};
use attestor_runtime::{
    assemble, AttestationRequest, Attester, Claims, ClaimsPolicy, NonceSet, QuoteSigner,
    TeeServerClient, TrustedRoots, Verifier, VerifierMode,
};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

const ISSUER: &str = "https://confidentialcomputing.googleapis.com";
const AUDIENCE: &str = "https://verifier.example.com";

struct Pki {
    signer: QuoteSigner,
    root_der: Vec<u8>,
}

fn pki() -> Pki {
    let alg = &rcgen::PKCS_ECDSA_P384_SHA384;
    let ca_params = |cn: &str| {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
    };

    let root_key = KeyPair::generate_for(alg).unwrap();
    let root = ca_params("Flow Root").self_signed(&root_key).unwrap();
    let int_key = KeyPair::generate_for(alg).unwrap();
    let intermediate = ca_params("Flow Intermediate")
        .signed_by(&int_key, &root, &root_key)
        .unwrap();

    let leaf_key = KeyPair::generate_for(alg).unwrap();
    let mut leaf_params = CertificateParams::default();
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "Flow Signer");
    let leaf = leaf_params
        .signed_by(&leaf_key, &intermediate, &int_key)
        .unwrap();

    let chain = vec![
        leaf.der().to_vec(),
        intermediate.der().to_vec(),
        root.der().to_vec(),
    ];
    Pki {
        signer: QuoteSigner::from_pkcs8_der(&leaf_key.serialize_der(), chain).unwrap(),
        root_der: root.der().to_vec(),
    }
}

fn claims_for(request: &TokenRequest) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        iss: ISSUER.to_string(),
        sub: "flow-test".to_string(),
        aud: request.audience.clone(),
        iat: now,
        exp: now + 600,
        eat_nonce: request.nonces.clone(),
        secboot: true,
        submods: Submods {
            container: ContainerClaims {
                image_digest: "sha256:1234".to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Fake launcher answering `POST /v1/token` until the test ends.
fn spawn_launcher(signer: QuoteSigner) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teeserver.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let signer = Arc::new(signer);

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let signer = signer.clone();
            tokio::spawn(async move {
                let mut data = Vec::new();
                let mut buf = [0u8; 4096];
                let request = loop {
                    let n = stream.read(&mut buf).await.unwrap();
                    data.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&data).to_string();
                    if let Some((_, body)) = text.split_once("\r\n\r\n") {
                        if let Ok(request) = serde_json::from_str::<TokenRequest>(body) {
                            break request;
                        }
                    }
                    assert!(n > 0, "client closed before sending a full request");
                };

                let token = assemble(b"raw-quote", &claims_for(&request), &signer).unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                    token.as_str().len(),
                    token.as_str()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            });
        }
    });

    (dir, path)
}

fn nonces() -> Vec<String> {
    (0..3).map(|i| format!("flow-nonce-{:08}", i)).collect()
}

#[tokio::test]
async fn test_hardware_backed_round_trip() {
    let pki = pki();
    let root_der = pki.root_der.clone();
    let (_dir, socket) = spawn_launcher(pki.signer);

    let attester = Attester::HardwareBacked(
        TeeServerClient::new(&socket).with_timeout(Duration::from_secs(5)),
    );
    let request = AttestationRequest::new(nonces(), Some(AUDIENCE.to_string())).unwrap();
    let token = attester.generate(&request).await.unwrap();
    assert!(!token.is_simulated());

    let config = AttestationConfig {
        trusted_root_fingerprints: vec![fingerprint_hex(&root_der)],
        chain_cache_ttl_secs: Some(60),
        ..Default::default()
    };
    let verifier = Verifier::from_config(&config).unwrap();
    let policy = ClaimsPolicy::new(request.nonces.clone())
        .with_issuer(ISSUER)
        .with_audience(AUDIENCE);

    let claims = verifier
        .validate(token.as_str(), &policy)
        .into_result()
        .unwrap();
    assert_eq!(claims.nonce_set(), request.nonces);
    assert!(claims.quote.is_some());

    // Same token, different request
    let replay = ClaimsPolicy::new(NonceSet::new(["flow-nonce-99999999"]).unwrap());
    assert!(matches!(
        verifier.validate(token.as_str(), &replay).into_result(),
        Err(AttestError::NonceMismatch)
    ));
}

#[tokio::test]
async fn test_concurrent_validation_shares_verifier() {
    let pki = pki();
    let verifier = Arc::new(
        Verifier::new(
            Arc::new(TrustedRoots::default().with_certificate(&pki.root_der)),
            Duration::from_secs(60),
            VerifierMode::HardwareBacked,
        )
        .with_cache(Duration::from_secs(60)),
    );
    let (_dir, socket) = spawn_launcher(pki.signer);
    let attester = Arc::new(Attester::HardwareBacked(TeeServerClient::new(&socket)));

    let mut handles = Vec::new();
    for i in 0..8 {
        let verifier = verifier.clone();
        let attester = attester.clone();
        handles.push(tokio::spawn(async move {
            let request = AttestationRequest::new([format!("concurrent-{:06}", i)], None).unwrap();
            let token = attester.generate(&request).await.unwrap();
            let policy = ClaimsPolicy::new(request.nonces.clone());
            let raw = token.as_str().to_string();
            tokio::task::spawn_blocking(move || verifier.validate(&raw, &policy).is_accepted())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(verifier.cache().unwrap().len(), 1);
}

#[tokio::test]
async fn test_simulated_round_trip() {
    let config = AttestationConfig {
        simulate: true,
        ..Default::default()
    };
    let attester = Attester::from_config(&config).unwrap();
    assert!(attester.is_simulated());

    let request = AttestationRequest::new(nonces(), None).unwrap();
    let token = attester.generate(&request).await.unwrap();
    assert!(token.is_simulated());

    let policy = ClaimsPolicy::new(request.nonces.clone());
    let verifier = Verifier::from_config(&config).unwrap();
    assert!(verifier.validate(token.as_str(), &policy).is_accepted());

    // A hardware verifier never accepts it.
    let pki = pki();
    let strict = Verifier::new(
        Arc::new(TrustedRoots::default().with_certificate(&pki.root_der)),
        Duration::from_secs(60),
        VerifierMode::HardwareBacked,
    );
    assert!(matches!(
        strict.validate(token.as_str(), &policy).into_result(),
        Err(AttestError::SimulationNotAllowed)
    ));
}

#[tokio::test]
async fn test_unreachable_launcher() {
    let attester = Attester::HardwareBacked(
        TeeServerClient::new("/tmp/attestor-flow-missing.sock")
            .with_timeout(Duration::from_millis(500)),
    );
    let request = AttestationRequest::new(nonces(), None).unwrap();
    let err = attester.generate(&request).await.unwrap_err();
    assert!(err.is_retryable());
}
