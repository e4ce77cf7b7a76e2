#![doc = "The `tasktrack` library crate."]
#![doc = ""]
#![doc = "A multi-tenant task tracker: users sign up and log in with server-side sessions and"]
#![doc = "manage their own tasks. The crate holds the request envelope, field validation,"]
#![doc = "the authentication gate, the request filters, the store backends and the route table;"]
#![doc = "`app::build_app` assembles them and `main.rs` serves the result."]

pub mod app;
pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
pub mod validation;

pub use app::{build_app, AppState};
pub use error::AppError;
