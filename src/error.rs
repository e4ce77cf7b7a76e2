//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! Each variant maps onto one class of client or server failure and onto one
//! HTTP status.
//!
//! `AppError` implements `actix_web::error::ResponseError`, so handlers, extractors and
//! middleware can return it directly. Every error response is rendered through the
//! response envelope (`{"error": ...}`). Client-caused errors are echoed verbatim;
//! server-side failures are logged with full detail and reach the client only as a
//! generic message.

use actix_web::{error::BlockingError, error::ResponseError, http::StatusCode, HttpResponse};

use crate::auth::password::HashError;
use crate::auth::session::SessionError;
use crate::envelope::{self, DecodeError, EncodeError, Envelope};
use crate::store::StoreError;
use crate::validation::FieldErrors;

/// Message returned to clients in place of any server-side failure detail.
pub const SERVER_ERROR_MESSAGE: &str = "request could not be processed";

/// Represents all possible errors that can occur within the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request body could not be decoded (HTTP 400).
    #[error("{0}")]
    BadRequest(#[from] DecodeError),
    /// One or more fields failed validation (HTTP 422).
    #[error("invalid fields: {0:?}")]
    Validation(FieldErrors),
    /// The caller has no authenticated session (HTTP 401).
    #[error("must be an authenticated user")]
    Unauthorized,
    /// The requested record does not exist for this caller (HTTP 404).
    #[error("{0}")]
    NotFound(String),
    /// The path exists but not for this method (HTTP 405).
    #[error("{0}")]
    MethodNotAllowed(String),
    /// The request conflicts with stored data (HTTP 409).
    #[error("{0}")]
    Conflict(String),
    /// The request body is not JSON (HTTP 415).
    #[error("{0}")]
    UnsupportedMediaType(String),
    /// The caller exceeded the request rate (HTTP 429).
    #[error("{0}")]
    TooManyRequests(String),
    /// An unexpected server-side failure (HTTP 500). The detail is only logged.
    #[error("{0}")]
    Internal(String),
    /// The response envelope itself could not be rendered (bare HTTP 500).
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let rendered = match self {
            AppError::Validation(errors) => envelope::write(status, &Envelope::error(errors)),
            AppError::Internal(detail) => {
                log::error!("{detail}");
                envelope::write(status, &Envelope::error(SERVER_ERROR_MESSAGE))
            }
            AppError::Encode(err) => {
                log::error!("{err}");
                return HttpResponse::InternalServerError().finish();
            }
            other => {
                log::debug!("request rejected: {other}");
                envelope::write(status, &Envelope::error(other.to_string()))
            }
        };

        rendered.unwrap_or_else(|err| {
            log::error!("{err}");
            HttpResponse::InternalServerError().finish()
        })
    }
}

/// Conflicts and missing records are the caller's concern; every other
/// storage failure is a server error.
impl From<StoreError> for AppError {
    fn from(error: StoreError) -> AppError {
        match error {
            StoreError::DuplicateUsername
            | StoreError::DuplicateTask
            | StoreError::TaskCompleted => AppError::Conflict(error.to_string()),
            StoreError::RecordNotFound => AppError::NotFound(error.to_string()),
            StoreError::OpFailed | StoreError::Database(_) => AppError::Internal(error.to_string()),
        }
    }
}

impl From<HashError> for AppError {
    fn from(error: HashError) -> AppError {
        AppError::Internal(error.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(error: SessionError) -> AppError {
        AppError::Internal(error.to_string())
    }
}

impl From<BlockingError> for AppError {
    fn from(error: BlockingError) -> AppError {
        AppError::Internal(format!("blocking task failed: {error}"))
    }
}
