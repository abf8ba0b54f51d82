use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use thiserror::Error;

use crate::clock::Clock;
use crate::crypto::{nonce::generate_nonce, signer::Signer};
use crate::error::{AppError, Result};
use crate::models::session::{SessionData, SessionEnvelope};

/// Upper bound on an encoded token; anything longer is rejected before decoding.
pub const MAX_TOKEN_LENGTH: usize = 4096;

/// Why a token failed validation. Only ever logged, clients just see `Invalid`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token has expired")]
    Expired,
}

/// The externally visible outcome of validating a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    Valid(SessionData),
    Invalid,
}

/// Issues and validates self-contained admin session tokens.
///
/// A token is unpadded URL-safe `base64(JSON {data, signature})` where `signature` is the
/// lowercase hex HMAC of the compact JSON encoding of `data`. Validation is a
/// pure function of the token, the signing key and the clock, so it needs no
/// session store.
#[derive(Clone)]
pub struct SessionCodec {
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    duration: Duration,
    renewal_threshold: Duration,
}

impl SessionCodec {
    pub fn new(
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        duration: Duration,
        renewal_threshold: Duration,
    ) -> Self {
        Self {
            signer,
            clock,
            duration,
            renewal_threshold,
        }
    }

    /// The lifetime given to every issued session.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Creates a fresh session and its signed token.
    ///
    /// # Returns
    ///
    /// A `Result` containing the encoded token and the session it carries.
    pub fn issue(&self) -> Result<(String, SessionData)> {
        // The wire format carries milliseconds; anything finer would not survive a round trip.
        let issued_at = self.clock.now().trunc_subsecs(3);
        let data = SessionData {
            issued_at,
            expires_at: issued_at + self.duration,
            nonce: generate_nonce(self.signer.as_ref()),
        };

        let payload = sonic_rs::to_vec(&data)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;
        let envelope = SessionEnvelope {
            signature: hex::encode(self.signer.sign(&payload)),
            data: data.clone(),
        };
        let json = sonic_rs::to_vec(&envelope)
            .map_err(|e| AppError::Internal(format!("Token serialization failed: {}", e)))?;

        tracing::debug!("🔑 Session issued, expires at {}", data.expires_at);
        Ok((general_purpose::URL_SAFE_NO_PAD.encode(json), data))
    }

    /// Validates a token, collapsing every failure into `Invalid`.
    pub fn validate(&self, token: &str) -> SessionValidation {
        match self.decode(token) {
            Ok(data) => SessionValidation::Valid(data),
            Err(reason) => {
                tracing::debug!("❌ Session token rejected: {}", reason);
                SessionValidation::Invalid
            }
        }
    }

    /// Validates a token, keeping the reason for a rejection.
    ///
    /// Expiry is inclusive: a token is already rejected at `now == expires_at`.
    pub fn decode(&self, token: &str) -> std::result::Result<SessionData, TokenError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LENGTH {
            return Err(TokenError::Malformed);
        }

        let json = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::Malformed)?;
        let envelope: SessionEnvelope =
            sonic_rs::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        // Only the exact encoding `issue` produces is accepted, so no two
        // distinct token strings carry the same claims.
        let canonical = sonic_rs::to_vec(&envelope).map_err(|_| TokenError::Malformed)?;
        if canonical != json {
            return Err(TokenError::Malformed);
        }

        let signature = hex::decode(&envelope.signature).map_err(|_| TokenError::Malformed)?;
        if hex::encode(&signature) != envelope.signature {
            return Err(TokenError::Malformed);
        }
        let payload = sonic_rs::to_vec(&envelope.data).map_err(|_| TokenError::Malformed)?;
        if !self.signer.verify(&payload, &signature) {
            return Err(TokenError::SignatureMismatch);
        }

        if self.clock.now() >= envelope.data.expires_at {
            return Err(TokenError::Expired);
        }

        Ok(envelope.data)
    }

    /// Whether the session's remaining lifetime has dropped below the renewal threshold.
    pub fn is_expiring_soon(&self, session: &SessionData) -> bool {
        is_expiring_soon(session, self.clock.now(), self.renewal_threshold)
    }
}

/// Pure form of [`SessionCodec::is_expiring_soon`].
pub fn is_expiring_soon(session: &SessionData, now: DateTime<Utc>, threshold: Duration) -> bool {
    session.expires_at - now < threshold
}
