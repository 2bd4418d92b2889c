use std::sync::Arc;

use tracing::warn;

use super::claims::IdentityContext;
use super::session::SessionManager;

/// Turns inbound credentials into an [`IdentityContext`].
///
/// Parsing is lenient: a missing token is Anonymous, and a token that fails
/// verification is logged and also becomes Anonymous. Rejection happens later, at
/// the authorization gate, and only for operations that need an identity.
#[derive(Clone, Debug)]
pub struct RequestContextBuilder {
    sessions: Arc<SessionManager>,
}

/// `Bearer <token>` (scheme case-insensitive) to `<token>`.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = rest.trim();
    if token.is_empty() { None } else { Some(token) }
}

impl RequestContextBuilder {
    pub fn new(sessions: Arc<SessionManager>) -> Self { Self { sessions } }

    /// Build from the raw `Authorization` header of an HTTP request.
    pub fn from_authorization_header(&self, header: Option<&str>) -> IdentityContext {
        match header.and_then(bearer_token) {
            Some(token) => self.from_token(token),
            None => IdentityContext::Anonymous,
        }
    }

    /// Build from subscription connection params: `authorization`/`Authorization`
    /// in bearer form, or a raw `token`.
    pub fn from_connection_params(&self, params: Option<&serde_json::Value>) -> IdentityContext {
        let Some(obj) = params.and_then(|p| p.as_object()) else { return IdentityContext::Anonymous; };
        let header = obj.get("authorization").or_else(|| obj.get("Authorization")).and_then(|v| v.as_str());
        if header.is_some() {
            return self.from_authorization_header(header);
        }
        match obj.get("token").and_then(|v| v.as_str()).map(str::trim) {
            Some(token) if !token.is_empty() => self.from_token(token),
            _ => IdentityContext::Anonymous,
        }
    }

    fn from_token(&self, token: &str) -> IdentityContext {
        match self.sessions.verify(token) {
            Ok(claim) => IdentityContext::Authenticated(claim),
            Err(e) => {
                warn!(target: "auth", "ignoring invalid session token: {}", e);
                IdentityContext::Anonymous
            }
        }
    }
}
