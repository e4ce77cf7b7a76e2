use std::env;
use std::num::NonZeroU32;

use actix_web::cookie::Key;

use crate::auth::DEFAULT_IDENTITY_KEY;
use crate::envelope::DEFAULT_MAX_BODY_BYTES;

const MIN_SESSION_KEY_BYTES: usize = 64;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

pub struct Config {
    /// `None` runs the service on the in-process store.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    /// `None` means a random key is generated at startup and sessions do not
    /// survive a restart.
    pub session_key: Option<Key>,
    pub session_cookie_secure: bool,
    /// Between 1 hour and a year.
    pub session_ttl_hours: i64,
    pub identity_key: String,
    pub max_body_bytes: usize,
    pub bcrypt_cost: u32,
    pub cors_allowed_origin: Option<String>,
    /// Requests allowed per client address per minute.
    pub rate_limit_per_minute: NonZeroU32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let session_key = match var("SESSION_KEY") {
            Some(secret) if secret.len() >= MIN_SESSION_KEY_BYTES => {
                Some(Key::derive_from(secret.as_bytes()))
            }
            Some(_) => {
                return Err(ConfigError::Invalid {
                    name: "SESSION_KEY",
                    expected: "at least 64 bytes long",
                    value: "<redacted>".to_string(),
                })
            }
            None => None,
        };

        let bcrypt_cost = parse(&var, "BCRYPT_COST", "a number", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                expected: "between 4 and 31",
                value: bcrypt_cost.to_string(),
            });
        }

        let session_ttl_hours = parse(&var, "SESSION_TTL_HOURS", "a number of hours", 24)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(ConfigError::Invalid {
                name: "SESSION_TTL_HOURS",
                expected: "between 1 and 8760",
                value: session_ttl_hours.to_string(),
            });
        }

        let rate_limit: u32 = parse(
            &var,
            "RATE_LIMIT_PER_MINUTE",
            "a positive number",
            DEFAULT_RATE_LIMIT_PER_MINUTE,
        )?;
        let rate_limit_per_minute =
            NonZeroU32::new(rate_limit).ok_or_else(|| ConfigError::Invalid {
                name: "RATE_LIMIT_PER_MINUTE",
                expected: "a positive number",
                value: rate_limit.to_string(),
            })?;

        Ok(Self {
            database_url: var("DATABASE_URL"),
            server_port: parse(&var, "SERVER_PORT", "a port number", 4567)?,
            server_host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            session_key,
            session_cookie_secure: parse_flag(&var, "SESSION_COOKIE_SECURE", true)?,
            session_ttl_hours,
            identity_key: var("SESSION_IDENTITY_KEY")
                .unwrap_or_else(|| DEFAULT_IDENTITY_KEY.to_string()),
            max_body_bytes: parse(
                &var,
                "MAX_BODY_BYTES",
                "a number of bytes",
                DEFAULT_MAX_BODY_BYTES,
            )?,
            bcrypt_cost,
            cors_allowed_origin: var("CORS_ALLOWED_ORIGIN"),
            rate_limit_per_minute,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            }),
    }
}

fn parse_flag(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            expected: "a boolean",
            value: other.to_string(),
        }),
    }
}
