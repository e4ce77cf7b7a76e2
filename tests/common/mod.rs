#![allow(dead_code)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::{
    body::MessageBody,
    cookie::{Cookie, Key},
    dev::{Service, ServiceResponse},
    http::{header::ContentType, StatusCode},
    test,
};
use serde_json::Value;
use tasktrack::{
    auth::{BcryptHasher, SessionSettings},
    store::memory::MemoryStore,
    AppState,
};

pub const PASSWORD: &str = "R#L:>t^9N?%o";

/// In-process store, the cheapest bcrypt cost and plain-HTTP session cookies.
pub fn state() -> AppState {
    AppState::new(Arc::new(MemoryStore::new()))
        .with_hasher(Arc::new(BcryptHasher::new(4)))
        .with_session_settings(SessionSettings {
            key: Key::generate(),
            cookie_secure: false,
            ttl_hours: 1,
        })
}

pub struct Reply {
    pub status: StatusCode,
    pub cookie: Option<Cookie<'static>>,
    pub body: Value,
}

pub async fn send<S, B>(app: &S, req: test::TestRequest, cookie: Option<&Cookie<'static>>) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = match cookie {
        Some(cookie) => req.cookie(cookie.clone()),
        None => req,
    };
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status();
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session")
        .map(|c| c.into_owned());
    let bytes = test::read_body(resp).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        cookie,
        body,
    }
}

pub async fn post_json<S, B>(
    app: &S,
    uri: &str,
    body: Value,
    cookie: Option<&Cookie<'static>>,
) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    send(app, test::TestRequest::post().uri(uri).set_json(body), cookie).await
}

pub async fn post_raw<S, B>(app: &S, uri: &str, raw: &'static str) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri(uri)
        .insert_header(ContentType::json())
        .set_payload(raw);
    send(app, req, None).await
}

/// Signs `username` up and returns the session cookie it was issued.
pub async fn signup<S, B>(app: &S, username: &str) -> Cookie<'static>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let reply = post_json(
        app,
        "/signup",
        serde_json::json!({ "username": username, "password": PASSWORD }),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "signup: {}", reply.body);
    reply.cookie.unwrap()
}
