use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;

use super::decode::{decode, read_body, DecodeError, DEFAULT_MAX_BODY_BYTES};
use crate::error::AppError;

/// Body limits for [`StrictJson`], registered with `App::app_data`.
#[derive(Debug, Clone, Copy)]
pub struct DecodeConfig {
    pub max_bytes: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Extracts a `T` from a request body using the strict envelope rules.
///
/// Any failure is reported as `AppError::BadRequest` carrying the
/// [`DecodeError`], whose message goes back to the client unchanged.
#[derive(Debug)]
pub struct StrictJson<T>(pub T);

impl<T> StrictJson<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> FromRequest for StrictJson<T>
where
    T: DeserializeOwned + 'static,
{
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let limit = req
            .app_data::<DecodeConfig>()
            .copied()
            .unwrap_or_default()
            .max_bytes;
        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        let payload = payload.take();

        Box::pin(async move {
            if declared.is_some_and(|len| len > limit) {
                return Err(DecodeError::BodyTooLarge { limit }.into());
            }

            let body = read_body(payload, limit).await?;
            Ok(StrictJson(decode(&body)?))
        })
    }
}
