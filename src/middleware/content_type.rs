use std::rc::Rc;

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::error::AppError;

const JSON: &str = "application/json";

/// Rejects request bodies that are not declared as `application/json`.
///
/// Requests without a body pass whatever their headers say.
#[derive(Clone, Copy, Default)]
pub struct RequireJson;

impl<S, B> Transform<S, ServiceRequest> for RequireJson
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RequireJsonService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireJsonService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireJsonService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireJsonService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !has_body(&req) || is_json(&req) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_boxed_body) });
        }

        let err = AppError::UnsupportedMediaType(format!("Content-Type must be {JSON}"));
        Box::pin(ready(Ok(req.error_response(err))))
    }
}

fn has_body(req: &ServiceRequest) -> bool {
    if req.headers().contains_key(TRANSFER_ENCODING) {
        return true;
    }
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(false, |length| length > 0)
}

fn is_json(req: &ServiceRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map_or(false, |media_type| media_type.trim().eq_ignore_ascii_case(JSON))
}
