//! Session-based authentication: password hashing, the session view, the
//! gate that protects routes, and the extractor handlers use to learn who
//! is calling.

pub mod extractors;
pub mod middleware;
pub mod password;
pub mod session;

pub use extractors::{authenticated_user, AuthenticatedUser};
pub use middleware::{resolve_identity, RequireAuthenticatedUser};
pub use password::{BcryptHasher, HashError, HashService};
pub use session::{
    session_middleware, ServerSessionStore, SessionContext, SessionError, SessionSettings,
    SessionStore,
};

pub const DEFAULT_IDENTITY_KEY: &str = "authenticatedUser";

/// Name of the session entry that holds the authenticated user's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IdentityKey {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_KEY)
    }
}
