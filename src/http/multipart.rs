//! `multipart/form-data` body parsing.

use std::collections::HashMap;

/// A single uploaded file extracted from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub size: usize,
    pub field_name: String,
}

/// Extracts the `boundary` parameter from a `Content-Type` header value,
/// honoring optional surrounding quotes.
pub(crate) fn extract_boundary(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("boundary=") {
            let value = value.trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// One parsed `multipart/form-data` part: its headers and raw content.
struct Part<'a> {
    headers: HashMap<String, String>,
    content: &'a [u8],
}

/// Splits a multipart body at `--<boundary>` delimiters and sub-parses
/// each part's headers and content, stopping at the `--<boundary>--`
/// sentinel.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut search_start = 0usize;

    let Some(first) = find(body, &delimiter, search_start) else {
        return parts;
    };
    search_start = first + delimiter.len();

    loop {
        if body[search_start..].starts_with(b"--") {
            break;
        }

        let next = match find(body, &delimiter, search_start) {
            Some(pos) => pos,
            None => break,
        };

        let mut segment = &body[search_start..next];
        segment = strip_crlf_edges(segment);

        if let Some(part) = parse_part(segment) {
            parts.push(part);
        }

        search_start = next + delimiter.len();
    }

    parts
}

fn strip_crlf_edges(mut segment: &[u8]) -> &[u8] {
    if let Some(rest) = segment.strip_prefix(b"\r\n") {
        segment = rest;
    } else if let Some(rest) = segment.strip_prefix(b"\n") {
        segment = rest;
    }
    if let Some(rest) = segment.strip_suffix(b"\r\n") {
        segment = rest;
    } else if let Some(rest) = segment.strip_suffix(b"\n") {
        segment = rest;
    }
    segment
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    memchr::memmem::find(&haystack[from..], needle).map(|pos| pos + from)
}

fn parse_part(segment: &[u8]) -> Option<Part<'_>> {
    let header_end = find(segment, b"\r\n\r\n", 0)
        .map(|pos| (pos, pos + 4))
        .or_else(|| find(segment, b"\n\n", 0).map(|pos| (pos, pos + 2)))?;

    let header_block = &segment[..header_end.0];
    let content = &segment[header_end.1..];

    let mut headers = HashMap::new();
    for line in header_block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let line = simdutf8::basic::from_utf8(line).ok()?;
        let (name, value) = line.split_once(':')?;
        headers.insert(name.trim().to_lowercase(), value.trim().to_string());
    }

    Some(Part { headers, content })
}

/// `Content-Disposition` parameters relevant to a multipart part.
struct Disposition {
    is_form_data: bool,
    name: Option<String>,
    filename: Option<String>,
}

fn parse_disposition(value: &str) -> Disposition {
    let mut fields = value.split(';');
    let is_form_data = fields
        .next()
        .map(|kind| kind.trim() == "form-data")
        .unwrap_or(false);

    let mut name = None;
    let mut filename = None;

    for field in fields {
        let field = field.trim();
        if let Some(v) = field.strip_prefix("name=") {
            name = Some(v.trim_matches('"').to_string());
        } else if let Some(v) = field.strip_prefix("filename=") {
            filename = Some(v.trim_matches('"').to_string());
        }
    }

    Disposition {
        is_form_data,
        name,
        filename,
    }
}

/// Parses a `multipart/form-data` body, splitting form fields from
/// uploaded files.
pub(crate) fn parse_multipart(
    body: &[u8],
    boundary: &str,
) -> (HashMap<String, String>, Vec<UploadedFile>) {
    let mut form_data = HashMap::new();
    let mut files = Vec::new();

    for part in split_parts(body, boundary) {
        let Some(disposition_header) = part.headers.get("content-disposition") else {
            continue;
        };
        let disposition = parse_disposition(disposition_header);
        if !disposition.is_form_data {
            continue;
        }

        match disposition.filename {
            Some(filename) => {
                let content_type = part
                    .headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                files.push(UploadedFile {
                    size: part.content.len(),
                    filename,
                    content_type,
                    content: part.content.to_vec(),
                    field_name: disposition.name.unwrap_or_default(),
                });
            }
            None => {
                if let Some(name) = disposition.name {
                    form_data.insert(name, String::from_utf8_lossy(part.content).into_owned());
                }
            }
        }
    }

    (form_data, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_and_quoted_boundary() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=B"),
            Some("B".to_string())
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"B2\""),
            Some("B2".to_string())
        );
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn parses_single_file_part() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hello\r\n",
            "--B--\r\n",
        );
        let (form_data, files) = parse_multipart(body.as_bytes(), "B");
        assert!(form_data.is_empty());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.txt");
        assert_eq!(files[0].content_type, "text/plain");
        assert_eq!(files[0].content, b"hello");
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].field_name, "file");
    }

    #[test]
    fn parses_mixed_fields_and_files() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n",
            "\r\n",
            "My Title\r\n",
            "--B\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"x.bin\"\r\n",
            "\r\n",
            "\x00\x01\x02\r\n",
            "--B--\r\n",
        );
        let (form_data, files) = parse_multipart(body.as_bytes(), "B");
        assert_eq!(form_data.get("title").map(String::as_str), Some("My Title"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content_type, "application/octet-stream");
    }

    #[test]
    fn ignores_non_form_data_disposition() {
        let body = concat!(
            "--B\r\n",
            "Content-Disposition: attachment; filename=\"x.txt\"\r\n",
            "\r\n",
            "data\r\n",
            "--B--\r\n",
        );
        let (form_data, files) = parse_multipart(body.as_bytes(), "B");
        assert!(form_data.is_empty());
        assert!(files.is_empty());
    }
}
