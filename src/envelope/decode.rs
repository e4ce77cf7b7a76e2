use actix_web::web::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::de::{DeserializeOwned, Deserializer, IgnoredAny};
use serde::Deserialize;
use serde_json::error::Category;
use std::fmt::Display;

/// Default ceiling for request bodies, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

/// Reasons a request body could not be turned into a typed input.
///
/// The `Display` output of every variant is safe to hand back to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The body was empty or contained only whitespace.
    #[error("body must not be empty")]
    EmptyBody,
    /// The parser hit a syntax error `offset` bytes into the body.
    #[error("body contains badly-formed JSON (at character {offset})")]
    MalformedJson { offset: usize },
    /// The body ended in the middle of a value.
    #[error("body contains badly-formed JSON")]
    Truncated,
    /// A value had the wrong JSON type for its target.
    #[error("{}", type_mismatch_message(.field.as_deref(), *.offset))]
    TypeMismatch { field: Option<String>, offset: usize },
    /// The body carried a field the target does not recognise.
    #[error("body contains unknown key {field:?}")]
    UnknownField { field: String },
    /// The body was larger than the configured ceiling.
    #[error("body must not be larger than {limit} bytes")]
    BodyTooLarge { limit: usize },
    /// Something other than whitespace followed the first value.
    #[error("body must only contain a single JSON value")]
    MultipleValues,
    /// Any other failure while reading or decoding.
    #[error("{0}")]
    DecodeFailed(String),
}

fn type_mismatch_message(field: Option<&str>, offset: usize) -> String {
    match field {
        Some(field) => format!("body contains incorrect JSON type for field {field:?}"),
        None => format!("body contains incorrect JSON type (at character {offset})"),
    }
}

/// Reads a string field that may be `null`, treating `null` like an absent field.
///
/// Use with `#[serde(deserialize_with = "null_as_empty")]` so a `null` value
/// reaches validation as an empty string instead of failing to decode.
pub fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Drains a body stream into memory, failing as soon as it grows past `limit`.
pub async fn read_body<S, E>(mut stream: S, limit: usize) -> Result<BytesMut, DecodeError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| DecodeError::DecodeFailed(err.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(DecodeError::BodyTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Decodes exactly one JSON object from `body` into `T`.
///
/// `T` is expected to deny unknown fields (`#[serde(deny_unknown_fields)]`) for
/// the unknown-key check to apply. The body is first scanned as an untyped
/// value so that syntax problems and trailing values are reported before any
/// type errors, then decoded into `T`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    let start = body
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .ok_or(DecodeError::EmptyBody)?;

    let mut values = serde_json::Deserializer::from_slice(body).into_iter::<IgnoredAny>();
    match values.next() {
        None => return Err(DecodeError::EmptyBody),
        Some(Err(err)) => return Err(syntax_error(body, &err)),
        Some(Ok(_)) => {}
    }

    let end = values.byte_offset();
    if body[end..].iter().any(|byte| !byte.is_ascii_whitespace()) {
        return Err(DecodeError::MultipleValues);
    }

    if body[start] != b'{' {
        return Err(DecodeError::TypeMismatch {
            field: None,
            offset: start + 1,
        });
    }

    serde_json::from_slice(&body[..end]).map_err(|err| data_error(body, &err))
}

fn syntax_error(body: &[u8], err: &serde_json::Error) -> DecodeError {
    match err.classify() {
        Category::Eof => DecodeError::Truncated,
        Category::Syntax => DecodeError::MalformedJson {
            offset: byte_offset(body, err.line(), err.column()),
        },
        Category::Data | Category::Io => DecodeError::DecodeFailed(err.to_string()),
    }
}

fn data_error(body: &[u8], err: &serde_json::Error) -> DecodeError {
    if err.classify() != Category::Data {
        return syntax_error(body, err);
    }

    let message = err.to_string();
    if message.starts_with("unknown field") {
        if let Some(field) = quoted_name(&message) {
            return DecodeError::UnknownField { field };
        }
    }

    if message.starts_with("invalid type")
        || message.starts_with("invalid value")
        || message.starts_with("invalid length")
    {
        let offset = byte_offset(body, err.line(), err.column());
        return DecodeError::TypeMismatch {
            field: field_at(body, offset),
            offset,
        };
    }

    DecodeError::DecodeFailed(message)
}

/// Pulls the first backtick-quoted name out of a serde error message.
fn quoted_name(message: &str) -> Option<String> {
    let rest = &message[message.find('`')? + 1..];
    Some(rest[..rest.find('`')?].to_string())
}

/// Converts serde_json's 1-based line / column pair into a byte offset.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = body
        .split(|byte| *byte == b'\n')
        .take(line.saturating_sub(1))
        .map(|line| line.len() + 1)
        .sum();
    (line_start + column).min(body.len())
}

/// Names the top-level object key whose value spans `offset`, if any.
fn field_at(body: &[u8], offset: usize) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start = 0usize;
    let mut last_string: Option<(usize, usize)> = None;
    let mut current = None;

    for (index, byte) in body.iter().enumerate().take(offset) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
                last_string = Some((string_start, index));
            }
            continue;
        }

        match byte {
            b'"' => {
                in_string = true;
                string_start = index;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 1 => {
                current = last_string
                    .and_then(|(from, to)| serde_json::from_slice::<String>(&body[from..=to]).ok());
            }
            _ => {}
        }
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Input {
        name: String,
        #[serde(default)]
        age: u32,
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields, default)]
    struct Nullable {
        #[serde(deserialize_with = "null_as_empty")]
        title: String,
        #[serde(deserialize_with = "null_as_empty")]
        description: String,
    }

    #[test]
    fn decodes_single_object() {
        let input: Input = decode(br#"{"name": "input", "age": 3}"#).unwrap();
        assert_eq!(
            input,
            Input {
                name: "input".into(),
                age: 3
            }
        );
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let input: Input = decode(b"  \n{\"name\":\"go\"}\n\t ").unwrap();
        assert_eq!(input.name, "go");
    }

    #[test]
    fn rejects_empty_body() {
        assert_eq!(decode::<Input>(b""), Err(DecodeError::EmptyBody));
        assert_eq!(decode::<Input>(b" \r\n "), Err(DecodeError::EmptyBody));
    }

    #[test]
    fn reports_syntax_error_offset() {
        let err = decode::<Input>(br#"{"name": "input",}"#).unwrap_err();
        match err {
            DecodeError::MalformedJson { offset } => assert_eq!(offset, 18),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err_message(br#"{"name": "input",}"#),
            "body contains badly-formed JSON (at character 18)"
        );
    }

    #[test]
    fn truncated_body_is_malformed() {
        assert_eq!(
            decode::<Input>(br#"{"name": "input""#),
            Err(DecodeError::Truncated)
        );
        assert_eq!(
            err_message(br#"{"name": "input""#),
            "body contains badly-formed JSON"
        );
    }

    #[test]
    fn names_the_mistyped_field() {
        let err = decode::<Input>(br#"{"name": 234}"#).unwrap_err();
        match &err {
            DecodeError::TypeMismatch { field, .. } => {
                assert_eq!(field.as_deref(), Some("name"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "body contains incorrect JSON type for field \"name\""
        );
    }

    #[test]
    fn names_the_second_mistyped_field() {
        let err = decode::<Input>(br#"{"name": "ok", "age": "old"}"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TypeMismatch {
                field: Some("age".into()),
                offset: 27
            }
        );
    }

    #[test]
    fn null_strings_decode_as_empty() {
        let input: Nullable = decode(br#"{"title": null, "description": "x"}"#).unwrap();
        assert_eq!(
            input,
            Nullable {
                title: String::new(),
                description: "x".into()
            }
        );

        let input: Nullable = decode(br#"{"description": null}"#).unwrap();
        assert_eq!(input, Nullable::default());

        assert_eq!(
            decode::<Nullable>(br#"{"title": 7}"#).unwrap_err().to_string(),
            "body contains incorrect JSON type for field \"title\""
        );
    }

    #[test]
    fn non_object_reports_offset() {
        let err = decode::<Input>(br#"["foo", "bar"]"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TypeMismatch {
                field: None,
                offset: 1
            }
        );
        assert_eq!(
            err.to_string(),
            "body contains incorrect JSON type (at character 1)"
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert_eq!(
            decode::<Input>(br#"{"name": "a", "email": "x@y"}"#),
            Err(DecodeError::UnknownField {
                field: "email".into()
            })
        );
        assert_eq!(
            err_message(br#"{"colour": 1}"#),
            "body contains unknown key \"colour\""
        );
    }

    #[test]
    fn rejects_concatenated_values() {
        assert_eq!(
            decode::<Input>(br#"{"name":"go"}{"name":"input"}"#),
            Err(DecodeError::MultipleValues)
        );
        assert_eq!(
            decode::<Input>(b"{\"name\":\"go\"}\n  {\"name\":\"input\"}"),
            Err(DecodeError::MultipleValues)
        );
        assert_eq!(
            decode::<Input>(br#"{"name":"go"} trailing"#),
            Err(DecodeError::MultipleValues)
        );
    }

    #[test]
    fn unescapes_field_names() {
        let body = br#"{"na\u006de": 1}"#;
        assert_eq!(field_at(body, body.len() - 1).as_deref(), Some("name"));
        assert_eq!(
            decode::<Input>(body),
            Err(DecodeError::TypeMismatch {
                field: Some("name".into()),
                offset: 15
            })
        );
    }

    #[actix_rt::test]
    async fn read_body_enforces_limit() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"name\":")),
            Ok(Bytes::from_static(b"\"abcdef\"}")),
        ];
        let err = read_body(futures::stream::iter(chunks), 10).await.unwrap_err();
        assert_eq!(err, DecodeError::BodyTooLarge { limit: 10 });
        assert_eq!(err.to_string(), "body must not be larger than 10 bytes");
    }

    #[actix_rt::test]
    async fn read_body_joins_chunks() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"name\":")),
            Ok(Bytes::from_static(b"\"go\"}")),
        ];
        let body = read_body(futures::stream::iter(chunks), 1024).await.unwrap();
        let input: Input = decode(&body).unwrap();
        assert_eq!(input.name, "go");
    }

    #[actix_rt::test]
    async fn read_body_surfaces_stream_errors() {
        let chunks = vec![Err::<Bytes, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))];
        let err = read_body(futures::stream::iter(chunks), 1024).await.unwrap_err();
        assert_eq!(err, DecodeError::DecodeFailed("connection reset".into()));
    }

    fn err_message(body: &[u8]) -> String {
        decode::<Input>(body).unwrap_err().to_string()
    }
}
