use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Payload carried inside a CV download token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub reason: String,
    /// Issue time, unix seconds.
    pub iat: i64,
    /// Random nonce so two links for the same request never collide.
    pub jti: String,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

/// Stateless signer for time-limited tokens.
/// Format: `base64url(json claims) "." base64url(hmac_sha256(secret, payload))`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    max_age: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, max_age: Duration) -> Self {
        TokenSigner {
            secret: secret.as_bytes().to_vec(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let json = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, sig))
    }

    /// Check the signature first, then the age against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, sig) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        // `iat` has whole-second precision, so the age is compared in seconds too.
        claims.issued_at().ok_or(TokenError::Malformed)?;
        if now.timestamp() - claims.iat > self.max_age.num_seconds() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
