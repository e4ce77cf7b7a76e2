use std::rc::Rc;
use std::sync::Arc;

use actix_session::SessionExt;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use super::extractors::AuthenticatedUser;
use super::session::SessionStore;
use super::IdentityKey;
use crate::error::AppError;
use crate::store::UserExister;

/// Admits a request only when its session names a user that still exists.
///
/// On success the user id is attached to the request as [`AuthenticatedUser`]
/// before the wrapped service runs; otherwise the rejection is rendered
/// directly and the wrapped service never sees the request. Must be
/// registered inside the session middleware.
pub struct RequireAuthenticatedUser<U: ?Sized> {
    users: Arc<U>,
    identity_key: IdentityKey,
}

impl<U: ?Sized> RequireAuthenticatedUser<U> {
    pub fn new(users: Arc<U>, identity_key: IdentityKey) -> Self {
        Self {
            users,
            identity_key,
        }
    }
}

impl<U: ?Sized> Clone for RequireAuthenticatedUser<U> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            identity_key: self.identity_key.clone(),
        }
    }
}

impl<S, B, U> Transform<S, ServiceRequest> for RequireAuthenticatedUser<U>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    U: UserExister + ?Sized + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireAuthenticatedUserService<S, U>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthenticatedUserService {
            service: Rc::new(service),
            users: Arc::clone(&self.users),
            identity_key: self.identity_key.clone(),
        }))
    }
}

pub struct RequireAuthenticatedUserService<S, U: ?Sized> {
    service: Rc<S>,
    users: Arc<U>,
    identity_key: IdentityKey,
}

impl<S, B, U> Service<ServiceRequest> for RequireAuthenticatedUserService<S, U>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    U: UserExister + ?Sized + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let users = Arc::clone(&self.users);
        let identity_key = self.identity_key.clone();

        Box::pin(async move {
            let session = req.get_session();
            match resolve_identity(&session, &*users, &identity_key).await {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(err) => Ok(req.error_response(err).map_into_right_body()),
            }
        })
    }
}

/// Resolves the caller from `session`, confirming the user still exists.
///
/// Any missing or blank identity is `Unauthorized`; a failed existence check
/// is a server error.
pub async fn resolve_identity<S, U>(
    session: &S,
    users: &U,
    identity_key: &IdentityKey,
) -> Result<AuthenticatedUser, AppError>
where
    S: SessionStore + ?Sized,
    U: UserExister + ?Sized,
{
    if !session.exists(identity_key.as_str()) {
        return Err(AppError::Unauthorized);
    }

    let id = session.get_string(identity_key.as_str()).trim().to_string();
    if id.is_empty() {
        return Err(AppError::Unauthorized);
    }

    match users.exists(&id).await {
        Ok(true) => Ok(AuthenticatedUser(id)),
        Ok(false) => Err(AppError::Unauthorized),
        Err(err) => Err(AppError::Internal(format!(
            "checking that user {id} exists: {err}"
        ))),
    }
}
