//! Proof Key for Code Exchange (RFC 7636) and the anti-forgery `state`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Characters allowed in a code verifier.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const VERIFIER_LEN: usize = 64;

/// A code verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh random verifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let verifier: String = (0..VERIFIER_LEN)
            .map(|_| char::from(UNRESERVED[rng.gen_range(0..UNRESERVED.len())]))
            .collect();
        Self::from_verifier(verifier)
    }

    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    #[must_use]
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Generate the opaque `state` value echoed back by the authorization server.
#[must_use]
pub fn generate_state() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
