use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

use super::claims::SessionClaim;

pub type SessionToken = String;

/// Default token lifetime: seven days.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies HS256 session tokens. Verification is offline: it never
/// consults the employee store.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self { ttl, encoding: EncodingKey::from_secret(secret), decoding: DecodingKey::from_secret(secret) }
    }

    pub fn issue(&self, subject_id: &str, email: &str) -> Result<SessionToken, TokenError> {
        self.issue_at(subject_id, email, Utc::now().timestamp())
    }

    pub fn issue_at(&self, subject_id: &str, email: &str, now: i64) -> Result<SessionToken, TokenError> {
        let claim = SessionClaim {
            sub: subject_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: i64::try_from(self.ttl.as_secs())
                .ok()
                .and_then(|ttl| now.checked_add(ttl))
                .ok_or_else(|| TokenError::Signing(format!("token ttl of {}s overflows the expiry", self.ttl.as_secs())))?,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claim, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(target: "auth", "session.issue sub={} ttl_secs={}", subject_id, self.ttl.as_secs());
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaim, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Check signature, then the `[iat, exp)` window against `now`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaim, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Window is checked below against the caller's clock, without leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);
        let data = decode::<SessionClaim>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;
        let claim = data.claims;
        if !claim.is_valid_at(now) {
            return Err(if now < claim.iat { TokenError::NotYetValid } else { TokenError::Expired });
        }
        Ok(claim)
    }
}
