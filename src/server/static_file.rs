//! Static file serving: URL-prefix → filesystem-root mounts with
//! traversal protection, MIME mapping, caching headers, and optional
//! directory listing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::http::{Response, StatusCode};

/// One registered static mount.
pub struct StaticMount {
    prefix: String,
    root: PathBuf,
    allowed_extensions: Option<Vec<String>>,
    directory_listing: bool,
}

impl StaticMount {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
            allowed_extensions: None,
            directory_listing: false,
        }
    }

    /// Restricts this mount to serving only the given extensions
    /// (without the leading dot). An extension-less path is rejected
    /// once an allowlist is configured.
    pub fn allow_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = Some(extensions);
        self
    }

    /// Enables a generated directory listing when a directory has no
    /// `index.html`.
    pub fn with_directory_listing(mut self, enabled: bool) -> Self {
        self.directory_listing = enabled;
        self
    }
}

/// Outcome of attempting to serve a path from a set of mounts.
pub enum StaticOutcome {
    /// No mount's prefix matched the path; the caller should fall
    /// through to its own miss handling.
    NoMountMatched,
    /// A mount matched but produced a final response (success,
    /// traversal rejection, not-found, or I/O error).
    Served(Response),
}

/// Attempts to serve `path` from the first mount (in registration
/// order) whose prefix is a prefix of it.
pub fn serve(mounts: &[StaticMount], path: &str) -> StaticOutcome {
    for mount in mounts {
        if let Some(remainder) = path.strip_prefix(&mount.prefix) {
            return StaticOutcome::Served(serve_from_mount(mount, remainder));
        }
    }
    StaticOutcome::NoMountMatched
}

fn serve_from_mount(mount: &StaticMount, remainder: &str) -> Response {
    let remainder = remainder.trim_start_matches('/');

    if remainder.contains("..") {
        return forbidden();
    }

    let mut candidate = mount.root.clone();
    for segment in remainder.split('/') {
        if segment.is_empty() {
            continue;
        }
        candidate.push(segment);
    }

    let normalized = candidate.to_string_lossy();
    if normalized.contains("..") {
        return forbidden();
    }

    serve_path(mount, &candidate)
}

fn forbidden() -> Response {
    let mut response = Response::new();
    response.set_status(StatusCode::Forbidden);
    response.text("Forbidden");
    response
}

fn serve_path(mount: &StaticMount, candidate: &Path) -> Response {
    let metadata = match std::fs::metadata(candidate) {
        Ok(metadata) => metadata,
        Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(_) => return internal_error(),
    };

    if metadata.is_dir() {
        let index = candidate.join("index.html");
        if index.is_file() {
            return serve_file(mount, &index);
        }
        if mount.directory_listing {
            return directory_listing(candidate);
        }
        return not_found();
    }

    serve_file(mount, candidate)
}

fn serve_file(mount: &StaticMount, path: &Path) -> Response {
    if let Some(allowlist) = &mount.allowed_extensions {
        let extension = path.extension().and_then(|ext| ext.to_str());
        match extension {
            Some(ext) if allowlist.iter().any(|allowed| allowed == ext) => {}
            _ => return forbidden(),
        }
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(_) => return internal_error(),
    };

    let mut response = Response::new();
    response.set_header("Content-Type", mime_for(path));
    response.set_header("Cache-Control", "public, max-age=3600");
    response.set_header("ETag", format!("\"{:x}\"", hash_bytes(&bytes)));
    response.set_status(StatusCode::Ok);
    response.set_body(bytes);
    response
}

fn directory_listing(dir: &Path) -> Response {
    let mut entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect::<Vec<_>>(),
        Err(_) => return internal_error(),
    };
    entries.sort();

    let mut html = String::from("<html><body><ul>");
    for entry in entries {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }
        let suffix = if entry.is_dir() { "/" } else { "" };
        html.push_str(&format!("<li>{name}{suffix}</li>"));
    }
    html.push_str("</ul></body></html>");

    let mut response = Response::new();
    response.html(html);
    response
}

fn not_found() -> Response {
    let mut response = Response::new();
    response.set_status(StatusCode::NotFound);
    response.text("Not Found");
    response
}

fn internal_error() -> Response {
    let mut response = Response::new();
    response.set_status(StatusCode::InternalServerError);
    response.text("Internal Server Error");
    response
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Maps a file extension to its MIME type, falling back to
/// `application/octet-stream`.
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xkoj_web_test_{name}_{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn serves_a_file_with_caching_headers() {
        let root = temp_root("serve");
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let mount = StaticMount::new("/static", root);

        match serve(&[mount], "/static/a.txt") {
            StaticOutcome::Served(response) => {
                assert_eq!(response.status(), StatusCode::Ok);
                assert_eq!(response.body(), b"hello");
                assert!(response.get_header("Cache-Control").is_some());
                assert!(response.get_header("ETag").is_some());
            }
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }

    #[test]
    fn traversal_is_rejected_before_filesystem_access() {
        let root = temp_root("traversal");
        let mount = StaticMount::new("/static", root);

        match serve(&[mount], "/static/../etc/passwd") {
            StaticOutcome::Served(response) => assert_eq!(response.status(), StatusCode::Forbidden),
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }

    #[test]
    fn missing_file_yields_404() {
        let root = temp_root("missing");
        let mount = StaticMount::new("/static", root);

        match serve(&[mount], "/static/nope.txt") {
            StaticOutcome::Served(response) => assert_eq!(response.status(), StatusCode::NotFound),
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }

    #[test]
    fn no_mount_matches_unrelated_prefix() {
        let mount = StaticMount::new("/static", temp_root("unrelated"));
        assert!(matches!(serve(&[mount], "/api/x"), StaticOutcome::NoMountMatched));
    }

    #[test]
    fn extension_allowlist_rejects_disallowed_extension() {
        let root = temp_root("allowlist");
        std::fs::write(root.join("a.exe"), b"bin").unwrap();
        let mount = StaticMount::new("/static", root).allow_extensions(vec!["txt".to_string()]);

        match serve(&[mount], "/static/a.exe") {
            StaticOutcome::Served(response) => assert_eq!(response.status(), StatusCode::Forbidden),
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }

    #[test]
    fn directory_listing_when_enabled_and_no_index() {
        let root = temp_root("listing");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        let mount = StaticMount::new("/static", root).with_directory_listing(true);

        match serve(&[mount], "/static") {
            StaticOutcome::Served(response) => {
                assert_eq!(response.status(), StatusCode::Ok);
                let body = String::from_utf8(response.body().to_vec()).unwrap();
                assert!(body.contains("a.txt"));
            }
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }

    #[test]
    fn index_html_is_served_for_a_directory() {
        let root = temp_root("index");
        let mut file = std::fs::File::create(root.join("index.html")).unwrap();
        file.write_all(b"<h1>hi</h1>").unwrap();
        let mount = StaticMount::new("/static", root);

        match serve(&[mount], "/static") {
            StaticOutcome::Served(response) => {
                assert_eq!(response.status(), StatusCode::Ok);
                assert_eq!(response.body(), b"<h1>hi</h1>");
            }
            StaticOutcome::NoMountMatched => panic!("expected a mount match"),
        }
    }
}
