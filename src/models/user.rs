use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::envelope::null_as_empty;

lazy_static! {
    /// Usernames are limited to ASCII letters, digits, `_` and `-`.
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// A registered account. The password is a hash and never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: Vec<u8>,
}

impl User {
    /// Creates a user with a fresh time-ordered id.
    pub fn new(username: String, password: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            username,
            password,
        }
    }
}

/// Body of `POST /signup` and `POST /login`.
///
/// Absent and `null` fields decode as empty strings so that validation
/// reports them. The password byte limit is checked by the handlers.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct Credentials {
    #[serde(deserialize_with = "null_as_empty")]
    #[validate(
        length(max = 32, message = "must not be more than 32 characters"),
        regex(
            path = "USERNAME_REGEX",
            message = "must only contain letters, digits, '_' or '-'"
        )
    )]
    pub username: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub password: String,
}
