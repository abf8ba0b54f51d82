use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Checks submitted passwords against the configured administrator secret.
#[derive(Clone)]
pub struct CredentialVerifier {
    secret_digest: Zeroizing<[u8; 32]>,
    configured: bool,
}

fn digest(value: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(value).into())
}

impl CredentialVerifier {
    /// Creates a verifier for the given administrator secret.
    pub fn new(secret: &str) -> Self {
        Self {
            secret_digest: digest(secret.as_bytes()),
            configured: !secret.is_empty(),
        }
    }

    /// Returns `true` only when `submitted` equals the administrator secret.
    ///
    /// Both values are hashed to fixed-size digests first, so the comparison
    /// time depends neither on the length of the input nor on how many
    /// leading bytes match.
    pub fn verify(&self, submitted: &str) -> bool {
        if submitted.is_empty() || !self.configured {
            return false;
        }

        let candidate = digest(submitted.as_bytes());
        candidate.as_slice().ct_eq(self.secret_digest.as_slice()).into()
    }
}
