//! Identity, session tokens and the authorization gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod claims;
mod session;
mod provider;
mod request_context;
mod authorizer;

pub use claims::{IdentityContext, SessionClaim};
pub use session::{SessionManager, SessionToken, TokenError, DEFAULT_TOKEN_TTL};
pub use provider::{LocalAuthProvider, LoginRequest, LoginResponse, SignupRequest, UserSummary};
pub use request_context::{bearer_token, RequestContextBuilder};
pub use authorizer::{require_authenticated, require_participant};
