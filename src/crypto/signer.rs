use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The primitives the session codec needs from its host environment.
///
/// Implementations must be cheap to call per request: no I/O, no shared
/// mutable state beyond the random source.
pub trait Signer: Send + Sync {
    /// Computes a MAC over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Checks `signature` against `message` in constant time.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;

    /// Returns `len` cryptographically secure random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// HMAC-SHA256 signer backed by the operating system's RNG.
#[derive(Clone)]
pub struct HmacSha256Signer {
    keyed: HmacSha256,
}

impl HmacSha256Signer {
    /// Creates a signer for the given key.
    pub fn new(key: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            keyed: <HmacSha256 as Mac>::new_from_slice(key)?,
        })
    }
}

impl Signer for HmacSha256Signer {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.keyed.clone();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let expected = self.sign(message);
        if expected.len() != signature.len() {
            return false;
        }
        expected.ct_eq(signature).into()
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // RFC 4231 test case 2.
        let signer = HmacSha256Signer::new(b"Jefe").unwrap();
        let sig = signer.sign(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(sig),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_rejects_other_keys_and_truncation() {
        let signer = HmacSha256Signer::new(&[1u8; 32]).unwrap();
        let other = HmacSha256Signer::new(&[2u8; 32]).unwrap();
        let sig = signer.sign(b"payload");

        assert!(signer.verify(b"payload", &sig));
        assert!(!other.verify(b"payload", &sig));
        assert!(!signer.verify(b"payload!", &sig));
        assert!(!signer.verify(b"payload", &sig[..16]));
    }
}
