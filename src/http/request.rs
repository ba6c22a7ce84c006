//! Request parsing: request line, headers, and body.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::ErrorKind;
use crate::http::cookie::parse_cookie_header;
use crate::http::multipart::{extract_boundary, parse_multipart, UploadedFile};
use crate::http::query::{parse_pairs, percent_decode_str};
use crate::http::types::{Method, Version};

/// Limits enforced while parsing a request. Populated from server
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub max_header_size: usize,
    pub max_request_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_header_size: 8192,
            max_request_size: 1024 * 1024,
        }
    }
}

/// Lazily parsed body-derived data: the form fields and uploaded files
/// present in an `application/x-www-form-urlencoded` or
/// `multipart/form-data` body.
#[derive(Default)]
struct BodyData {
    form_data: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

/// A fully parsed HTTP request. Immutable once built; form data and
/// uploaded files are decoded from the body on first access.
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query_string: String,
    pub query: HashMap<String, String>,
    pub version: Version,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub client_ip: String,
    body_data: RefCell<Option<BodyData>>,
}

impl Request {
    /// Parses a complete request (request line, headers, and body
    /// already assembled by the connection layer) into a `Request`.
    pub fn parse(buffer: &[u8], client_ip: String, limits: ParseLimits) -> Result<Self, ErrorKind> {
        let header_end = find_header_terminator(buffer).ok_or(ErrorKind::BadRequest)?;
        let head = &buffer[..header_end];
        if head.len() > limits.max_header_size {
            return Err(ErrorKind::TooManyHeaders);
        }

        let mut lines = split_lines(head);
        let request_line = lines.next().ok_or(ErrorKind::BadRequest)?;
        let (method, path, query_string, query, version) = parse_request_line(request_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let line = simdutf8::basic::from_utf8(line).map_err(|_| ErrorKind::InvalidHeader)?;
            let (name, value) = line.split_once(':').ok_or(ErrorKind::InvalidHeader)?;
            let name = name.trim().to_lowercase();
            let value = value.trim().to_string();
            headers
                .entry(name)
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body_start = header_terminator_len(buffer, header_end);
        let mut body = Vec::new();
        if let Some(content_length) = headers.get("content-length") {
            let content_length: usize = content_length
                .trim()
                .parse()
                .map_err(|_| ErrorKind::InvalidContentLength)?;
            if content_length > limits.max_request_size {
                return Err(ErrorKind::PayloadTooLarge);
            }
            let available = &buffer[body_start..];
            if available.len() < content_length {
                return Err(ErrorKind::BodyMismatch);
            }
            body = available[..content_length].to_vec();
        }

        let cookies = headers
            .get("cookie")
            .map(|value| parse_cookie_header(value))
            .unwrap_or_default();

        Ok(Self {
            method,
            path,
            query_string,
            query,
            version,
            headers,
            body,
            path_params: HashMap::new(),
            cookies,
            client_ip,
            body_data: RefCell::new(None),
        })
    }

    /// Returns a header's value (case-insensitive), or `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Returns whether a header is present (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_lowercase())
    }

    /// Returns a query-string parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns a router-populated path parameter value.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    fn ensure_body_parsed(&self) {
        if self.body_data.borrow().is_some() {
            return;
        }

        let content_type = self.header("content-type").unwrap_or("").to_string();
        let data = if content_type.starts_with("application/x-www-form-urlencoded") {
            let raw = String::from_utf8_lossy(&self.body);
            BodyData {
                form_data: parse_pairs(&raw),
                files: Vec::new(),
            }
        } else if content_type.starts_with("multipart/form-data") {
            match extract_boundary(&content_type) {
                Some(boundary) => {
                    let (form_data, files) = parse_multipart(&self.body, &boundary);
                    BodyData { form_data, files }
                }
                None => BodyData::default(),
            }
        } else {
            BodyData::default()
        };

        *self.body_data.borrow_mut() = Some(data);
    }

    /// Returns a field from a URL-encoded or multipart form body,
    /// decoding the body lazily on first access.
    pub fn form_data(&self, name: &str) -> Option<String> {
        self.ensure_body_parsed();
        self.body_data
            .borrow()
            .as_ref()
            .and_then(|data| data.form_data.get(name).cloned())
    }

    /// Returns every uploaded file from a multipart body, decoding the
    /// body lazily on first access.
    pub fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.ensure_body_parsed();
        self.body_data
            .borrow()
            .as_ref()
            .map(|data| data.files.clone())
            .unwrap_or_default()
    }
}

fn find_header_terminator(buffer: &[u8]) -> Option<usize> {
    memchr::memmem::find(buffer, b"\r\n\r\n")
        .or_else(|| memchr::memmem::find(buffer, b"\n\n"))
}

fn header_terminator_len(buffer: &[u8], header_end: usize) -> usize {
    if buffer[header_end..].starts_with(b"\r\n\r\n") {
        header_end + 4
    } else {
        header_end + 2
    }
}

fn split_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

type RequestLineParts = (Method, String, String, HashMap<String, String>, Version);

fn parse_request_line(line: &[u8]) -> Result<RequestLineParts, ErrorKind> {
    let mut tokens = line.split(|&b| b == b' ').filter(|token| !token.is_empty());
    let method_token = tokens.next().ok_or(ErrorKind::BadRequest)?;
    let target = tokens.next().ok_or(ErrorKind::BadRequest)?;
    let version_token = tokens.next().ok_or(ErrorKind::BadRequest)?;
    if tokens.next().is_some() {
        return Err(ErrorKind::BadRequest);
    }

    let method = Method::parse(method_token).ok_or(ErrorKind::InvalidMethod)?;
    let version = Version::parse(version_token).ok_or(ErrorKind::InvalidVersion)?;

    let (path_raw, query_string) = match memchr::memchr(b'?', target) {
        Some(pos) => (&target[..pos], &target[pos + 1..]),
        None => (target, &target[target.len()..]),
    };

    let path = percent_decode_str(path_raw, false);
    if path.is_empty() || !path.starts_with('/') {
        return Err(ErrorKind::BadRequest);
    }

    let query_string = String::from_utf8_lossy(query_string).into_owned();
    let query = parse_pairs(&query_string);

    Ok((method, path, query_string, query, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Request {
        Request::parse(raw.as_bytes(), "127.0.0.1".to_string(), ParseLimits::default()).unwrap()
    }

    #[test]
    fn parses_basic_get_request() {
        let req = parse("GET /test HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/test");
        assert_eq!(req.header("host"), Some("x"));
        assert_eq!(req.header("Host"), Some("x"));
    }

    #[test]
    fn parses_query_and_auth_header() {
        let req = parse(
            "GET /api/users/123?active=true HTTP/1.1\r\nHost: localhost:8080\r\nAuthorization: Bearer test-token\r\n\r\n",
        );
        assert_eq!(req.param("active"), Some("true"));
        assert_eq!(req.header("authorization"), Some("Bearer test-token"));
    }

    #[test]
    fn accepts_bare_lf_line_endings() {
        let req = parse("GET /a HTTP/1.1\nHost: x\n\n");
        assert_eq!(req.path, "/a");
    }

    #[test]
    fn rejects_empty_path() {
        let result = Request::parse(
            b"GET ? HTTP/1.1\r\nHost: x\r\n\r\n",
            "127.0.0.1".to_string(),
            ParseLimits::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn reads_exact_content_length_body() {
        let raw = "POST /f HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let req = parse(raw);
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn form_urlencoded_body_is_parsed_lazily() {
        let raw = "POST /f HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 21\r\n\r\nname=alice&role=admin";
        let req = parse(raw);
        assert_eq!(req.form_data("name").as_deref(), Some("alice"));
        assert_eq!(req.form_data("role").as_deref(), Some("admin"));
    }

    #[test]
    fn duplicate_headers_are_joined_with_comma_space() {
        let raw = "GET /a HTTP/1.1\r\nHost: x\r\nX-Tag: one\r\nX-Tag: two\r\n\r\n";
        let req = parse(raw);
        assert_eq!(req.header("x-tag"), Some("one, two"));
    }

    #[test]
    fn cookies_are_parsed() {
        let raw = "GET /a HTTP/1.1\r\nHost: x\r\nCookie: a=1; b=2\r\n\r\n";
        let req = parse(raw);
        assert_eq!(req.cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(req.cookies.get("b").map(String::as_str), Some("2"));
    }
}
