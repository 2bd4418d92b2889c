use serde::{Deserialize, Serialize};

/// Verified payload of a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaim {
    /// Employee id.
    pub sub: String,
    pub email: String,
    /// Issued at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch. Valid while `iat <= now < exp`.
    pub exp: i64,
}

impl SessionClaim {
    /// Inside the half-open `[iat, exp)` window at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool { self.iat <= now && now < self.exp }
}

/// Caller identity for one request or one subscription connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentityContext {
    #[default]
    Anonymous,
    Authenticated(SessionClaim),
}

impl IdentityContext {
    pub fn claim(&self) -> Option<&SessionClaim> {
        match self {
            IdentityContext::Authenticated(c) => Some(c),
            IdentityContext::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool { self.claim().is_some() }
}
