use base64::{Engine as _, engine::general_purpose};

use crate::crypto::signer::Signer;

/// The size of a session nonce in bytes.
pub const NONCE_SIZE: usize = 32;

/// Generates a new random session nonce.
///
/// # Returns
///
/// A URL-safe base64-encoded nonce.
pub fn generate_nonce(signer: &dyn Signer) -> String {
    let bytes = signer.random_bytes(NONCE_SIZE);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
