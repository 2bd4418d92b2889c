use tracing::debug;

use super::claims::{IdentityContext, SessionClaim};
use crate::error::{AppError, AppResult};

/// Authorization gate. Every protected operation calls this first and propagates
/// the error unchanged; Anonymous yields the `UNAUTHORIZED` classification.
pub fn require_authenticated(ctx: &IdentityContext) -> AppResult<&SessionClaim> {
    match ctx {
        IdentityContext::Authenticated(claim) => Ok(claim),
        IdentityContext::Anonymous => {
            debug!(target: "auth", "gate rejected anonymous caller");
            Err(AppError::unauthorized())
        }
    }
}

/// Gate for reads scoped to a conversation: the caller must be one of the two
/// participants.
pub fn require_participant<'a>(ctx: &'a IdentityContext, a: &str, b: &str) -> AppResult<&'a SessionClaim> {
    let claim = require_authenticated(ctx)?;
    if claim.sub == a || claim.sub == b {
        Ok(claim)
    } else {
        Err(AppError::authorization("not_a_participant", "caller is not a participant of this conversation"))
    }
}
