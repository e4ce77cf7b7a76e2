use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::error::AppError;

/// Id of the user the authentication gate admitted for this request.
///
/// `RequireAuthenticatedUser` inserts it into the request extensions; the type
/// itself is the lookup key, so nothing else can collide with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Returns the authenticated user of `req`, if the gate admitted one.
pub fn authenticated_user(req: &HttpRequest) -> Option<AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>().cloned()
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match authenticated_user(req) {
            Some(user) => ready(Ok(user)),
            None => {
                // Only reachable when a route using this extractor is not wrapped by the gate.
                log::error!(
                    "no authenticated user on {} {}; route is missing the authentication gate",
                    req.method(),
                    req.path()
                );
                ready(Err(AppError::Internal(
                    "authenticated user missing from request".to_string(),
                )))
            }
        }
    }
}
