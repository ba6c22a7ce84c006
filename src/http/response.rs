//! Response building and wire serialization.

use std::collections::HashMap;

use crate::http::cookie::Cookie;
use crate::http::types::{StatusCode, Version};

/// A mutable response builder. Any body mutation re-synchronizes the
/// `Content-Length` header.
pub struct Response {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    cookies: Vec<Cookie>,
}

impl Default for Response {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        headers.insert("content-length".to_string(), "0".to_string());

        Self {
            status: StatusCode::Ok,
            headers,
            body: Vec::new(),
            cookies: Vec::new(),
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_lowercase())
    }

    /// Sets a header, overwriting any prior value with this name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Adds a header, joining onto an existing value with `, ` if present.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        self.headers
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replaces the body, re-synchronizing `Content-Length`.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self.sync_content_length();
        self
    }

    /// Appends to the body, re-synchronizing `Content-Length`.
    pub fn append_body(&mut self, chunk: impl AsRef<[u8]>) -> &mut Self {
        self.body.extend_from_slice(chunk.as_ref());
        self.sync_content_length();
        self
    }

    fn sync_content_length(&mut self) {
        self.headers
            .insert("content-length".to_string(), self.body.len().to_string());
    }

    /// Sets the body to a UTF-8 string with `Content-Type: text/plain`.
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.set_header("content-type", "text/plain; charset=utf-8");
        self.set_body(text.into().into_bytes())
    }

    /// Sets the body to a UTF-8 string with `Content-Type: text/html`.
    pub fn html(&mut self, html: impl Into<String>) -> &mut Self {
        self.set_header("content-type", "text/html; charset=utf-8");
        self.set_body(html.into().into_bytes())
    }

    /// Sets the body to a pre-serialized JSON string.
    pub fn json(&mut self, json: impl Into<String>) -> &mut Self {
        self.set_header("content-type", "application/json; charset=utf-8");
        self.set_body(json.into().into_bytes())
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    /// Serializes the response to its wire representation.
    pub fn to_bytes(&self, version: Version) -> Vec<u8> {
        let mut out = format!("{} {}\r\n", version, self.status).into_bytes();

        for (name, value) in &self.headers {
            out.extend_from_slice(title_case_header(name).as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        for cookie in &self.cookies {
            out.extend_from_slice(b"Set-Cookie: ");
            out.extend_from_slice(cookie.to_header_value().as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Converts a lower-case, dash-separated header name into canonical
/// `Title-Case-With-Dashes` form.
fn title_case_header(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_response_is_200_html() {
        let response = Response::new();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(
            response.get_header("content-type"),
            Some("text/html; charset=utf-8")
        );
    }

    #[test]
    fn set_body_syncs_content_length() {
        let mut response = Response::new();
        response.set_body(b"hello".to_vec());
        assert_eq!(response.get_header("content-length"), Some("5"));
        response.append_body(b" world");
        assert_eq!(response.get_header("content-length"), Some("11"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut response = Response::new();
        response.set_header("X-Custom", "value");
        assert_eq!(response.get_header("x-custom"), Some("value"));
        assert!(response.has_header("X-CUSTOM"));
    }

    #[test]
    fn title_case_folds_header_names_on_emission() {
        let mut response = Response::new();
        response.set_header("x-rate-limit-remaining", "4");
        let bytes = response.to_bytes(Version::Http11);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("X-Rate-Limit-Remaining: 4"));
    }

    #[test]
    fn cookies_each_get_their_own_set_cookie_line() {
        let mut response = Response::new();
        response.add_cookie(Cookie::new("a", "1"));
        response.add_cookie(Cookie::new("b", "2"));
        let text = String::from_utf8(response.to_bytes(Version::Http11)).unwrap();
        assert_eq!(text.matches("Set-Cookie:").count(), 2);
    }
}
