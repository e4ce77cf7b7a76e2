use std::net::IpAddr;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderValue, RETRY_AFTER},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};

use crate::error::AppError;

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Per-client request quota, keyed by peer address.
///
/// Clones share one limiter, so every worker counts against the same quota.
/// Requests without a peer address share a single bucket.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<Option<IpAddr>>>,
}

impl RateLimit {
    pub fn per_minute(requests: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(requests))),
        }
    }

    /// Seconds the caller must wait, or `None` when the request may proceed.
    fn check(&self, client: Option<IpAddr>) -> Option<u64> {
        match self.limiter.check_key(&client) {
            Ok(()) => None,
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Some(wait.as_secs().max(1))
            }
        }
    }

    /// Drops buckets of clients that are back to a full quota.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        match NonZeroU32::new(DEFAULT_REQUESTS_PER_MINUTE) {
            Some(requests) => Self::per_minute(requests),
            None => Self::per_minute(NonZeroU32::MIN),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            limit: self.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    limit: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
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
        let client = req.peer_addr().map(|addr| addr.ip());
        let Some(retry_after) = self.limit.check(client) else {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_boxed_body) });
        };

        log::warn!("rate limit reached for {client:?} on {}", req.path());
        let err = AppError::TooManyRequests(format!(
            "rate limit exceed for {}. please retry later",
            req.path()
        ));
        let mut resp = req.error_response(err);
        resp.headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        Box::pin(ready(Ok(resp)))
    }
}
