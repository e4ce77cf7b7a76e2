use actix_web::{get, http::StatusCode, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::envelope::{self, Envelope};
use crate::error::AppError;

/// Health check endpoint
///
/// Returns the current status of the API and timestamp inside the payload envelope.
#[get("/health")]
pub async fn health() -> Result<HttpResponse, AppError> {
    let status = json!({
        "status": "ok",
        "timestamp": Utc::now()
    });
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(status))?)
}
