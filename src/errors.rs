//! Request-processing error kinds and their HTTP rendering.

use crate::http::{StatusCode, Version};

/// Every condition a remote peer can trigger during request parsing or
/// dispatch. No variant here corresponds to a `panic!`/`.unwrap()` path;
/// each renders to a response via [`ErrorKind::as_http`].
#[derive(Debug)]
pub enum ErrorKind {
    BadRequest,
    UriTooLong,
    PayloadTooLarge,
    TooManyHeaders,
    InvalidMethod,
    InvalidVersion,
    InvalidHeader,
    InvalidContentLength,
    InvalidConnection,
    BodyMismatch,
    UnexpectedBody,
    ServiceUnavailable,
    Io(std::io::Error),
}

impl ErrorKind {
    /// The status code this kind renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest
            | Self::InvalidHeader
            | Self::InvalidContentLength
            | Self::InvalidConnection
            | Self::BodyMismatch
            | Self::UnexpectedBody
            | Self::InvalidMethod
            | Self::InvalidVersion => StatusCode::BadRequest,
            Self::UriTooLong => StatusCode::UriTooLong,
            Self::PayloadTooLarge => StatusCode::PayloadTooLarge,
            Self::TooManyHeaders => StatusCode::BadRequest,
            Self::ServiceUnavailable => StatusCode::ServiceUnavailable,
            Self::Io(_) => StatusCode::InternalServerError,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest => "the request could not be parsed".to_string(),
            Self::UriTooLong => "the request target is too long".to_string(),
            Self::PayloadTooLarge => "the request body exceeds the configured limit".to_string(),
            Self::TooManyHeaders => "the request header block is too large".to_string(),
            Self::InvalidMethod => "unrecognized request method".to_string(),
            Self::InvalidVersion => "unsupported HTTP version".to_string(),
            Self::InvalidHeader => "malformed request header".to_string(),
            Self::InvalidContentLength => "invalid Content-Length value".to_string(),
            Self::InvalidConnection => "malformed Connection header".to_string(),
            Self::BodyMismatch => "request body did not match Content-Length".to_string(),
            Self::UnexpectedBody => "request body present where none was expected".to_string(),
            Self::ServiceUnavailable => "the server is not accepting requests".to_string(),
            Self::Io(err) => err.to_string(),
        }
    }

    /// Renders this error as a complete HTTP/1.1 response.
    ///
    /// `server_name` is the configured `Server:` header value;
    /// `json_errors` selects a `{"error": "..."}` body over an HTML page.
    pub fn as_http(&self, version: Version, server_name: &str, json_errors: bool) -> Vec<u8> {
        let status = self.status();
        let message = self.message();

        let (content_type, body) = if json_errors {
            (
                "application/json; charset=utf-8",
                format!(
                    "{{\"error\":\"{}\",\"status\":{}}}",
                    escape_json(&message),
                    status.code()
                ),
            )
        } else {
            (
                "text/html; charset=utf-8",
                format!(
                    "<html><head><title>{code} {reason}</title></head>\
                     <body><h1>{code} {reason}</h1><p>{message}</p>\
                     <hr><address>{server}</address></body></html>",
                    code = status.code(),
                    reason = status.reason(),
                    message = message,
                    server = server_name,
                ),
            )
        };

        let mut out = format!(
            "{version} {status}\r\nServer: {server_name}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
            version = version,
            status = status,
            server_name = server_name,
            content_type = content_type,
            len = body.len(),
        )
        .into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ErrorKind {}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BadRequest);
        assert_eq!(ErrorKind::PayloadTooLarge.status(), StatusCode::PayloadTooLarge);
        assert_eq!(ErrorKind::UriTooLong.status(), StatusCode::UriTooLong);
    }

    #[test]
    fn html_rendering_contains_server_name() {
        let rendered = ErrorKind::BadRequest.as_http(Version::Http11, "XKOJ/1.0", false);
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("XKOJ/1.0"));
        assert!(text.contains("Content-Length:"));
    }

    #[test]
    fn json_rendering_escapes_quotes() {
        let rendered = ErrorKind::Io(std::io::Error::new(std::io::ErrorKind::Other, "bad \"value\""))
            .as_http(Version::Http11, "XKOJ/1.0", true);
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("application/json"));
        assert!(text.contains("\\\"value\\\""));
    }
}
