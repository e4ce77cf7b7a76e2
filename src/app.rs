use std::sync::Arc;

use actix_web::{
    body::BoxBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::NormalizePath,
    web, App,
};

use crate::{
    auth::{
        session_middleware, BcryptHasher, HashService, IdentityKey, RequireAuthenticatedUser,
        SessionSettings,
    },
    envelope::DecodeConfig,
    middleware::{RateLimit, RequireJson},
    routes,
    store::{SessionRecords, StoreError, TaskStore, UserStore},
};

/// Services shared by every worker, registered as app data by [`AppState::configure`].
#[derive(Clone)]
pub struct AppState {
    users: Arc<dyn UserStore>,
    tasks: Arc<dyn TaskStore>,
    sessions: Arc<dyn SessionRecords>,
    hasher: Arc<dyn HashService>,
    identity_key: IdentityKey,
    decode: DecodeConfig,
    session: SessionSettings,
    rate_limit: RateLimit,
}

impl AppState {
    /// Uses `store` for users, tasks and sessions, with default hashing,
    /// identity key, body limit, session cookie and rate limit.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: UserStore + TaskStore + SessionRecords + 'static,
    {
        Self {
            users: store.clone(),
            tasks: store.clone(),
            sessions: store,
            hasher: Arc::new(BcryptHasher::default()),
            identity_key: IdentityKey::default(),
            decode: DecodeConfig::default(),
            session: SessionSettings::default(),
            rate_limit: RateLimit::default(),
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn HashService>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_identity_key(mut self, identity_key: IdentityKey) -> Self {
        self.identity_key = identity_key;
        self
    }

    pub fn with_decode_config(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_session_settings(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Clones of `rate_limit` share its quota, so pass one limiter to every worker.
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Registers the shared services and all routes, without any middleware.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(Arc::clone(&self.users)))
            .app_data(web::Data::from(Arc::clone(&self.tasks)))
            .app_data(web::Data::from(Arc::clone(&self.hasher)))
            .app_data(web::Data::new(self.identity_key.clone()))
            .app_data(self.decode);

        let gate = RequireAuthenticatedUser::new(Arc::clone(&self.users), self.identity_key.clone());
        routes::config(cfg, gate);
    }

    /// Removes expired session records and idle rate-limit buckets.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.rate_limit.retain_recent();
        let purged = self.sessions.purge_expired().await?;
        if purged > 0 {
            log::info!("purged {purged} expired sessions");
        }
        Ok(purged)
    }
}

/// The whole service: routes behind path normalisation, the JSON check,
/// the rate limit and server-side sessions, in that order.
pub fn build_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<BoxBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let session = session_middleware(Arc::clone(&state.sessions), &state.session);
    let rate_limit = state.rate_limit.clone();

    App::new()
        .configure(move |cfg| state.configure(cfg))
        .wrap(session)
        .wrap(rate_limit)
        .wrap(RequireJson)
        .wrap(NormalizePath::trim())
}
