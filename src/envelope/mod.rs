//!
//! # Request / response envelope
//!
//! Every request body is a single JSON object and every response is a single
//! JSON object carrying either a `payload` or an `error` key. This module holds
//! both directions: [`decode`] turns a bounded body into a typed input and
//! classifies every way that can fail, and [`write`] renders an [`Envelope`]
//! into a response.
//!
//! Handlers normally go through the [`StrictJson`] extractor, which reads the
//! body under the configured [`DecodeConfig`] limit before decoding it.

mod decode;
mod encode;
mod extract;

pub use decode::{decode, null_as_empty, read_body, DecodeError, DEFAULT_MAX_BODY_BYTES};
pub use encode::{write, EncodeError, Envelope, ERROR_KEY, PAYLOAD_KEY};
pub use extract::{DecodeConfig, StrictJson};

/// HTML-escapes user supplied text before it is validated or stored.
pub fn sanitize(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&#34;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
