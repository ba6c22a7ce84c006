//! Request `Cookie` header parsing and response `Set-Cookie` building.

use std::collections::HashMap;

/// Parses a single `Cookie` header value into a name -> value map.
/// Splits on `;`, then each element on the first `=`; both sides are
/// trimmed. Last write wins on duplicate names.
pub(crate) fn parse_cookie_header(value: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for part in value.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (name, value) = match part.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => (part, ""),
        };

        map.insert(name.to_string(), value.to_string());
    }

    map
}

/// A `Set-Cookie` entry queued onto a [`Response`](crate::Response).
#[derive(Debug, Clone)]
pub struct Cookie {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) domain: Option<String>,
    pub(crate) path: Option<String>,
    /// Negative is the sentinel for "omit the `Max-Age` attribute".
    pub(crate) max_age: Option<i64>,
    pub(crate) expires: Option<String>,
    pub(crate) secure: bool,
    pub(crate) http_only: bool,
    pub(crate) same_site: Option<String>,
}

impl Cookie {
    /// Creates a minimal cookie with only a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn expires(mut self, rfc1123: impl Into<String>) -> Self {
        self.expires = Some(rfc1123.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, value: impl Into<String>) -> Self {
        self.same_site = Some(value.into());
        self
    }

    /// Renders the `Set-Cookie:` header line (without the trailing CRLF).
    pub(crate) fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);

        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            if max_age >= 0 {
                out.push_str("; Max-Age=");
                out.push_str(&max_age.to_string());
            }
        }
        if let Some(expires) = &self.expires {
            out.push_str("; Expires=");
            out.push_str(expires);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = &self.same_site {
            if !same_site.is_empty() {
                out.push_str("; SameSite=");
                out.push_str(same_site);
            }
        }

        out
    }
}
