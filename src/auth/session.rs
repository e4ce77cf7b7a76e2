//! Session helpers that keep handlers and the gate away from the framework's session API.
//!
//! The session cookie only carries a random token. The state behind it is
//! held in [`SessionRecords`], so renewing the token or logging out removes
//! the old state for every copy of the cookie.

use std::collections::HashMap;
use std::sync::Arc;

use actix_session::{
    config::{CookieContentSecurity, PersistentSession},
    storage::{self, LoadError, SaveError, SessionKey, UpdateError},
    Session, SessionGetError, SessionInsertError, SessionMiddleware,
};
use actix_web::{
    cookie::{time::Duration, Key, SameSite},
    dev::Payload,
    FromRequest, HttpRequest,
};
use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use rand::distributions::{Alphanumeric, DistString};

use crate::store::SessionRecords;

pub const SESSION_COOKIE_NAME: &str = "session";
const SESSION_TOKEN_LENGTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to write session: {0}")]
    Insert(#[from] SessionInsertError),
    #[error("failed to read session: {0}")]
    Get(#[from] SessionGetError),
}

/// Key-value view of the caller's session.
pub trait SessionStore {
    fn put(&self, key: &str, value: &str) -> Result<(), SessionError>;
    /// The string stored under `key`, or an empty string when there is none.
    fn get_string(&self, key: &str) -> String;
    fn exists(&self, key: &str) -> bool;
    fn remove(&self, key: &str);
    /// Issues a fresh session token while keeping the stored values.
    fn renew_token(&self);
}

impl SessionStore for Session {
    fn put(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.insert(key, value)?;
        Ok(())
    }

    fn get_string(&self, key: &str) -> String {
        match self.get::<String>(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                log::debug!("unreadable session value under {key:?}: {err}");
                String::new()
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    fn remove(&self, key: &str) {
        Session::remove(self, key);
    }

    fn renew_token(&self) {
        self.renew();
    }
}

/// Request extractor wrapping the actix session.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }
}

impl SessionStore for SessionContext {
    fn put(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.0.put(key, value)
    }

    fn get_string(&self, key: &str) -> String {
        self.0.get_string(key)
    }

    fn exists(&self, key: &str) -> bool {
        SessionStore::exists(&self.0, key)
    }

    fn remove(&self, key: &str) {
        SessionStore::remove(&self.0, key)
    }

    fn renew_token(&self) {
        self.0.renew_token()
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(SessionContext::new) })
    }
}

/// actix-session backend over [`SessionRecords`].
#[derive(Clone)]
pub struct ServerSessionStore {
    records: Arc<dyn SessionRecords>,
}

impl ServerSessionStore {
    pub fn new(records: Arc<dyn SessionRecords>) -> Self {
        Self { records }
    }
}

fn expiry_after(ttl: &Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(ttl.whole_seconds())
}

impl storage::SessionStore for ServerSessionStore {
    async fn load(
        &self,
        session_key: &SessionKey,
    ) -> Result<Option<HashMap<String, String>>, LoadError> {
        let data = self
            .records
            .find(session_key.as_ref())
            .await
            .map_err(|err| LoadError::Other(err.into()))?;
        data.map(|data| serde_json::from_str(&data))
            .transpose()
            .map_err(|err| LoadError::Deserialization(err.into()))
    }

    async fn save(
        &self,
        session_state: HashMap<String, String>,
        ttl: &Duration,
    ) -> Result<SessionKey, SaveError> {
        let data = serde_json::to_string(&session_state)
            .map_err(|err| SaveError::Serialization(err.into()))?;
        let token = Alphanumeric.sample_string(&mut rand::thread_rng(), SESSION_TOKEN_LENGTH);
        self.records
            .insert(&token, &data, expiry_after(ttl))
            .await
            .map_err(|err| SaveError::Other(err.into()))?;
        SessionKey::try_from(token).map_err(|err| SaveError::Other(err.into()))
    }

    /// Falls back to a new token when the record vanished after it was loaded.
    async fn update(
        &self,
        session_key: SessionKey,
        session_state: HashMap<String, String>,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let data = serde_json::to_string(&session_state)
            .map_err(|err| UpdateError::Serialization(err.into()))?;
        let replaced = self
            .records
            .replace(session_key.as_ref(), &data, expiry_after(ttl))
            .await
            .map_err(|err| UpdateError::Other(err.into()))?;
        if replaced {
            return Ok(session_key);
        }

        storage::SessionStore::save(self, session_state, ttl)
            .await
            .map_err(|err| match err {
                SaveError::Serialization(err) => UpdateError::Serialization(err),
                SaveError::Other(err) => UpdateError::Other(err),
            })
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> anyhow::Result<()> {
        self.records
            .extend(session_key.as_ref(), expiry_after(ttl))
            .await?;
        Ok(())
    }

    async fn delete(&self, session_key: &SessionKey) -> anyhow::Result<()> {
        self.records.destroy(session_key.as_ref()).await?;
        Ok(())
    }
}

/// Signing key and lifetime of the session cookie.
#[derive(Clone)]
pub struct SessionSettings {
    pub key: Key,
    pub cookie_secure: bool,
    pub ttl_hours: i64,
}

impl Default for SessionSettings {
    /// A throwaway key, so sessions do not outlive the process.
    fn default() -> Self {
        Self {
            key: Key::generate(),
            cookie_secure: true,
            ttl_hours: 24,
        }
    }
}

/// Server-side sessions that persist for `settings.ttl_hours`.
pub fn session_middleware(
    records: Arc<dyn SessionRecords>,
    settings: &SessionSettings,
) -> SessionMiddleware<ServerSessionStore> {
    SessionMiddleware::builder(ServerSessionStore::new(records), settings.key.clone())
        .cookie_name(SESSION_COOKIE_NAME.to_owned())
        .cookie_path("/".to_owned())
        .cookie_secure(settings.cookie_secure)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .cookie_content_security(CookieContentSecurity::Private)
        .session_lifecycle(
            PersistentSession::default().session_ttl(Duration::hours(settings.ttl_hours)),
        )
        .build()
}

#[cfg(test)]
pub(crate) fn test_sessions() -> SessionMiddleware<ServerSessionStore> {
    session_middleware(
        Arc::new(crate::store::memory::MemoryStore::new()),
        &SessionSettings {
            key: Key::generate(),
            cookie_secure: false,
            ttl_hours: 1,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::{MockSessionRecords, StoreError};
    use actix_web::{
        cookie::Cookie,
        dev::{Service, ServiceResponse},
        http::StatusCode,
        test, web, App, HttpResponse,
    };

    fn session_routes(cfg: &mut web::ServiceConfig) {
        cfg.route(
            "/put",
            web::get().to(|session: SessionContext| async move {
                session.put("identity", "user-1")?;
                Ok::<_, AppError>(HttpResponse::Ok().finish())
            }),
        )
        .route(
            "/get",
            web::get().to(|session: SessionContext| async move {
                let present = session.exists("identity");
                HttpResponse::Ok().body(format!("{present}:{}", session.get_string("identity")))
            }),
        )
        .route(
            "/remove",
            web::get().to(|session: SessionContext| async move {
                session.renew_token();
                session.remove("identity");
                HttpResponse::Ok().finish()
            }),
        );
    }

    fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
            .map(|cookie| cookie.into_owned())
    }

    async fn read<S, B>(app: &S, cookie: &Cookie<'static>) -> String
    where
        S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: actix_web::body::MessageBody,
    {
        let req = test::TestRequest::get().uri("/get").cookie(cookie.clone()).to_request();
        let body = test::call_and_read_body(app, req).await;
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[actix_rt::test]
    async fn round_trips_values_through_the_store() {
        let app = test::init_service(App::new().wrap(test_sessions()).configure(session_routes))
            .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/put").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp).unwrap();
        assert!(cookie.http_only().unwrap_or(false));
        assert!(!cookie.value().contains("user-1"));

        assert_eq!(read(&app, &cookie).await, "true:user-1");

        let req = test::TestRequest::get().uri("/remove").cookie(cookie.clone()).to_request();
        let resp = test::call_service(&app, req).await;
        let renewed = session_cookie(&resp).unwrap();
        assert_ne!(renewed.value(), cookie.value());
        assert_eq!(read(&app, &renewed).await, "false:");
    }

    #[actix_rt::test]
    async fn renewed_token_retires_the_old_cookie() {
        let app = test::init_service(App::new().wrap(test_sessions()).configure(session_routes))
            .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/put").to_request()).await;
        let old = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/remove").cookie(old.clone()).to_request();
        test::call_service(&app, req).await;

        assert_eq!(read(&app, &old).await, "false:");
    }

    #[actix_rt::test]
    async fn missing_session_reads_as_empty() {
        let app = test::init_service(App::new().wrap(test_sessions()).configure(session_routes))
            .await;

        let body =
            test::call_and_read_body(&app, test::TestRequest::get().uri("/get").to_request()).await;
        assert_eq!(body, "false:");
    }

    #[actix_rt::test]
    async fn unreadable_backend_is_a_server_error() {
        let mut records = MockSessionRecords::new();
        records
            .expect_insert()
            .times(1)
            .returning(|_, _, _| Ok(()));
        records
            .expect_find()
            .times(1)
            .returning(|_| Err(StoreError::OpFailed));

        let app = test::init_service(
            App::new()
                .wrap(session_middleware(
                    Arc::new(records),
                    &SessionSettings {
                        key: Key::generate(),
                        cookie_secure: false,
                        ttl_hours: 1,
                    },
                ))
                .configure(session_routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/put").to_request()).await;
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/get").cookie(cookie).to_request();
        let resp = app.call(req).await;
        let status = match resp {
            Ok(resp) => resp.status(),
            Err(err) => err.error_response().status(),
        };
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
