//! Certificate chains and claims for unit tests.

use std::sync::OnceLock;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384,
    PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};

use super::assembler::QuoteSigner;
use super::claims::{Claims, ContainerClaims, Submods, DEBUG_DISABLED};
use super::roots::TrustedRoots;

pub const TEST_ISSUER: &str = "https://confidentialcomputing.googleapis.com";
pub const TEST_AUDIENCE: &str = "https://verifier.example.com";
pub const TEST_IMAGE_DIGEST: &str =
    "sha256:abababababababababababababababababababababababababababababababab";

/// Root -> intermediate -> leaf chain with the leaf private key.
pub struct TestChain {
    pub root_der: Vec<u8>,
    pub intermediate_der: Vec<u8>,
    pub leaf_der: Vec<u8>,
    pub leaf_key_der: Vec<u8>,
}

fn params(cn: &str, ca: bool) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationName, "Attestor Test");
    params.distinguished_name = dn;
    if ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
    } else {
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    }
    params
}

/// rcgen cannot generate RSA keys, so one 2048-bit key is made with `rsa`
/// and shared by every RSA certificate in the test run.
fn rsa_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
    })
}

fn key_for(alg: &'static SignatureAlgorithm) -> KeyPair {
    if *alg == PKCS_RSA_SHA256 {
        KeyPair::from_pem_and_sign_algo(rsa_key_pem(), alg).unwrap()
    } else {
        KeyPair::generate_for(alg).unwrap()
    }
}

fn build(
    root_alg: &'static SignatureAlgorithm,
    intermediate_alg: &'static SignatureAlgorithm,
    leaf_alg: &'static SignatureAlgorithm,
    leaf_not_after_year: Option<i32>,
) -> TestChain {
    let root_key = key_for(root_alg);
    let root = params("Attestation Root", true).self_signed(&root_key).unwrap();

    let intermediate_key = key_for(intermediate_alg);
    let intermediate = params("Attestation Intermediate", true)
        .signed_by(&intermediate_key, &root, &root_key)
        .unwrap();

    let leaf_key = key_for(leaf_alg);
    let mut leaf_params = params("Attestation Signer", false);
    if let Some(year) = leaf_not_after_year {
        leaf_params.not_after = rcgen::date_time_ymd(year, 1, 1);
    }
    let leaf = leaf_params
        .signed_by(&leaf_key, &intermediate, &intermediate_key)
        .unwrap();

    TestChain {
        root_der: root.der().to_vec(),
        intermediate_der: intermediate.der().to_vec(),
        leaf_der: leaf.der().to_vec(),
        leaf_key_der: leaf_key.serialize_der(),
    }
}

impl TestChain {
    pub fn p384() -> Self {
        build(
            &PKCS_ECDSA_P384_SHA384,
            &PKCS_ECDSA_P384_SHA384,
            &PKCS_ECDSA_P384_SHA384,
            None,
        )
    }

    pub fn p256() -> Self {
        build(
            &PKCS_ECDSA_P256_SHA256,
            &PKCS_ECDSA_P256_SHA256,
            &PKCS_ECDSA_P256_SHA256,
            None,
        )
    }

    /// RSA 2048 / SHA-256 throughout, the shape of hosted attestation
    /// service chains.
    pub fn rs256() -> Self {
        build(&PKCS_RSA_SHA256, &PKCS_RSA_SHA256, &PKCS_RSA_SHA256, None)
    }

    /// P-384 chain whose leaf expires on January 1st of `year`.
    pub fn p384_expiring_at(year: i32) -> Self {
        build(
            &PKCS_ECDSA_P384_SHA384,
            &PKCS_ECDSA_P384_SHA384,
            &PKCS_ECDSA_P384_SHA384,
            Some(year),
        )
    }

    /// Leaf first.
    pub fn chain_der(&self) -> Vec<Vec<u8>> {
        vec![
            self.leaf_der.clone(),
            self.intermediate_der.clone(),
            self.root_der.clone(),
        ]
    }

    pub fn signer(&self) -> QuoteSigner {
        QuoteSigner::from_pkcs8_der(&self.leaf_key_der, self.chain_der()).unwrap()
    }

    pub fn roots(&self) -> TrustedRoots {
        TrustedRoots::default().with_certificate(&self.root_der)
    }
}

/// RSA root over a P-384 intermediate and leaf.
pub fn rsa_rooted_chain() -> TestChain {
    build(
        &PKCS_RSA_SHA256,
        &PKCS_ECDSA_P384_SHA384,
        &PKCS_ECDSA_P384_SHA384,
        None,
    )
}

/// P-384 root and intermediate over a P-256 leaf.
pub fn mixed_curve_chain() -> TestChain {
    build(
        &PKCS_ECDSA_P384_SHA384,
        &PKCS_ECDSA_P256_SHA256,
        &PKCS_ECDSA_P256_SHA256,
        None,
    )
}

/// Claims that pass the default policy, issued at `now` and valid for an
/// hour.
pub fn sample_claims(nonces: &[&str], now: i64) -> Claims {
    Claims {
        iss: TEST_ISSUER.to_string(),
        sub: "https://www.googleapis.com/compute/v1/projects/p/zones/z/instances/agent".to_string(),
        aud: TEST_AUDIENCE.to_string(),
        iat: now,
        exp: now + 3600,
        nbf: Some(now),
        eat_nonce: nonces.iter().map(|n| n.to_string()).collect(),
        secboot: true,
        submods: Submods {
            container: ContainerClaims {
                image_digest: TEST_IMAGE_DIGEST.to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        hwmodel: Some("GCP_AMD_SEV".to_string()),
        swname: Some("CONFIDENTIAL_SPACE".to_string()),
        dbgstat: Some(DEBUG_DISABLED.to_string()),
        ..Default::default()
    }
}
