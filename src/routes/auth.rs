use actix_web::{http::StatusCode, web, HttpResponse};

use super::ensure_valid;
use crate::{
    auth::{AuthenticatedUser, HashService, IdentityKey, SessionContext, SessionStore},
    envelope::{self, sanitize, Envelope, StrictJson},
    error::AppError,
    models::{Credentials, User},
    store::{StoreError, UserCreator, UserGetter},
    validation::{FieldValidator, MAX_PASSWORD_BYTES, MIN_PASSWORD_LENGTH, REQUIRED},
};

/// Escapes the username. The password is hashed exactly as sent.
fn clean(input: Credentials) -> Credentials {
    Credentials {
        username: sanitize(&input.username),
        password: input.password,
    }
}

fn validate(input: &Credentials) -> Result<(), AppError> {
    let mut v = FieldValidator::new();
    v.required_string(&input.username, "username", REQUIRED);
    v.required_string(&input.password, "password", REQUIRED);
    v.min_string(
        &input.password,
        MIN_PASSWORD_LENGTH,
        "password",
        "must be at least 8 characters",
    );
    v.max_bytes(
        &input.password,
        MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes",
    );
    v.check_password(&input.password, "password");
    v.check(input);
    ensure_valid(v)
}

/// Register a new user
///
/// Creates the account and starts a session for it. Responds `201` with the
/// new user id, `409` when the username is taken.
pub async fn signup<U>(
    users: web::Data<U>,
    hasher: web::Data<dyn HashService>,
    identity_key: web::Data<IdentityKey>,
    session: SessionContext,
    input: StrictJson<Credentials>,
) -> Result<HttpResponse, AppError>
where
    U: UserCreator + ?Sized + 'static,
{
    let input = clean(input.into_inner());
    validate(&input)?;

    let hasher = hasher.into_inner();
    let password = input.password;
    let hash = web::block(move || hasher.hash(&password)).await??;

    let user = User::new(input.username, hash);
    users.create(&user).await?;
    log::info!("user {} signed up", user.id);

    session.put(identity_key.as_str(), &user.id)?;
    Ok(envelope::write(StatusCode::CREATED, &Envelope::payload(&user.id))?)
}

/// Login user
///
/// Unknown usernames and wrong passwords are indistinguishable: both are
/// `404 record not found`. On success the session token is renewed before
/// the identity is stored.
pub async fn login<U>(
    users: web::Data<U>,
    hasher: web::Data<dyn HashService>,
    identity_key: web::Data<IdentityKey>,
    session: SessionContext,
    input: StrictJson<Credentials>,
) -> Result<HttpResponse, AppError>
where
    U: UserGetter + ?Sized + 'static,
{
    let input = clean(input.into_inner());
    validate(&input)?;

    let user = users.get_by_username(&input.username).await?;

    let hasher = hasher.into_inner();
    let password = input.password;
    let stored = user.password.clone();
    let matches = web::block(move || hasher.compare(&password, &stored)).await??;
    if !matches {
        return Err(StoreError::RecordNotFound.into());
    }

    session.renew_token();
    session.put(identity_key.as_str(), &user.id)?;
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(&user.id))?)
}

/// Logout user
///
/// Renews the session token and drops the identity from the session.
pub async fn logout(
    user: AuthenticatedUser,
    identity_key: web::Data<IdentityKey>,
    session: SessionContext,
) -> Result<HttpResponse, AppError> {
    session.renew_token();
    session.remove(identity_key.as_str());
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(user.id()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{session::test_sessions, BcryptHasher};
    use crate::store::{MockUserCreator, MockUserGetter};
    use actix_web::{test, App};
    use serde_json::json;
    use std::sync::Arc;

    fn hasher() -> web::Data<dyn HashService> {
        web::Data::from(Arc::new(BcryptHasher::new(4)) as Arc<dyn HashService>)
    }

    #[actix_rt::test]
    async fn test_signup_validation() {
        let mut users = MockUserCreator::new();
        users.expect_create().never();

        let app = test::init_service(
            App::new()
                .wrap(test_sessions())
                .app_data(web::Data::new(users))
                .app_data(hasher())
                .app_data(web::Data::new(IdentityKey::default()))
                .route("/signup", web::post().to(signup::<MockUserCreator>)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "", "password": "short" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["username"], "must not be empty");
        assert_eq!(body["error"]["password"], "must be at least 8 characters");

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "alex", "password": "password" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"]["password"]
            .as_str()
            .unwrap()
            .starts_with("insecure password"));

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "alex", "password": "R#L:>t^9N?%o", "admin": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn signup_store_failure_hides_detail() {
        let mut users = MockUserCreator::new();
        users
            .expect_create()
            .times(1)
            .returning(|_| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let app = test::init_service(
            App::new()
                .wrap(test_sessions())
                .app_data(web::Data::new(users))
                .app_data(hasher())
                .app_data(web::Data::new(IdentityKey::default()))
                .route("/signup", web::post().to(signup::<MockUserCreator>)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "alex", "password": "R#L:>t^9N?%o" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp
            .response()
            .cookies()
            .all(|cookie| cookie.name() != "session"));
        let body = test::read_body(resp).await;
        assert_eq!(body, r#"{"error":"request could not be processed"}"#);
    }

    #[actix_rt::test]
    async fn test_login_unknown_user() {
        let mut users = MockUserGetter::new();
        users
            .expect_get_by_username()
            .withf(|username| username.to_string() == "sam")
            .times(1)
            .returning(|_| Err(StoreError::RecordNotFound));

        let app = test::init_service(
            App::new()
                .wrap(test_sessions())
                .app_data(web::Data::new(users))
                .app_data(hasher())
                .app_data(web::Data::new(IdentityKey::default()))
                .route("/login", web::post().to(login::<MockUserGetter>)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({ "username": "sam", "password": "R#L:>t^9N?%o" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = test::read_body(resp).await;
        assert_eq!(body, r#"{"error":"record not found"}"#);
    }

    #[actix_rt::test]
    async fn password_is_hashed_as_sent() {
        let password = format!("{}R#L:>t^9N?%o", "&".repeat(20));
        let expected = password.clone();

        let mut users = MockUserCreator::new();
        users
            .expect_create()
            .withf(move |user| {
                BcryptHasher::new(4)
                    .compare(&expected, &user.password)
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|_| Ok(()));

        let app = test::init_service(
            App::new()
                .wrap(test_sessions())
                .app_data(web::Data::new(users))
                .app_data(hasher())
                .app_data(web::Data::new(IdentityKey::default()))
                .route("/signup", web::post().to(signup::<MockUserCreator>)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "alex", "password": password }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[actix_rt::test]
    async fn password_limit_counts_bytes() {
        let mut users = MockUserCreator::new();
        users.expect_create().never();

        let app = test::init_service(
            App::new()
                .wrap(test_sessions())
                .app_data(web::Data::new(users))
                .app_data(hasher())
                .app_data(web::Data::new(IdentityKey::default()))
                .route("/signup", web::post().to(signup::<MockUserCreator>)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({ "username": "alex", "password": "é".repeat(37) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["password"], "must not be more than 72 bytes");
    }
}
