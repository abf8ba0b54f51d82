use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The claims carried inside an admin session token.
///
/// Nothing is stored server-side: the token itself holds this data plus an
/// HMAC over it. Field order is part of the signed encoding, do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// When the session was issued (Unix milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// When the session stops being accepted (Unix milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Random value making every token unique.
    pub nonce: String,
}

/// The decoded form of a session token: the claims and their hex signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub data: SessionData,
    pub signature: String,
}
