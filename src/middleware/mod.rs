//! Request filters that run before routing: the per-client rate limit and
//! the JSON content-type check.

pub mod content_type;
pub mod rate_limit;

pub use content_type::RequireJson;
pub use rate_limit::RateLimit;
