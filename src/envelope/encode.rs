use actix_web::{http::header::ContentType, http::StatusCode, HttpResponse};
use serde::ser::{Serialize, SerializeMap, Serializer};

pub const PAYLOAD_KEY: &str = "payload";
pub const ERROR_KEY: &str = "error";

/// A single top-level JSON object wrapping a response value under a fixed key.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    key: &'static str,
    value: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(key: &'static str, value: T) -> Self {
        Self { key, value }
    }

    /// `{"payload": value}`
    pub fn payload(value: T) -> Self {
        Self::new(PAYLOAD_KEY, value)
    }

    /// `{"error": value}`
    pub fn error(value: T) -> Self {
        Self::new(ERROR_KEY, value)
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key, &self.value)?;
        map.end()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to encode response envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Serializes `envelope` and builds a JSON response with `status`.
///
/// The body is rendered completely before the response is built, so a
/// serialization failure leaves nothing half-written.
pub fn write<T: Serialize>(
    status: StatusCode,
    envelope: &Envelope<T>,
) -> Result<HttpResponse, EncodeError> {
    let body = serde_json::to_vec(envelope)?;

    Ok(HttpResponse::build(status)
        .content_type(ContentType::json())
        .body(body))
}
