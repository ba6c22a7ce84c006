//! Percent-decoding and `key=value&...` parsing shared by query strings,
//! `application/x-www-form-urlencoded` bodies, and path decoding.

use std::collections::HashMap;

/// Hex-decodes `%XX` triples in `src`. A malformed triple (missing or
/// non-hex digits) is passed through verbatim rather than rejected.
///
/// `plus_as_space` controls whether a literal `+` decodes to a space;
/// that is only correct inside a query string or form body, never inside
/// a path.
pub(crate) fn percent_decode(src: &[u8], plus_as_space: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        match src[i] {
            b'%' => match hex_pair(src.get(i + 1..i + 3)) {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    out
}

fn hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    if pair.len() != 2 {
        return None;
    }
    let hi = (pair[0] as char).to_digit(16)?;
    let lo = (pair[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decodes a percent-encoded byte string into a lossy UTF-8 `String`.
pub(crate) fn percent_decode_str(src: &[u8], plus_as_space: bool) -> String {
    String::from_utf8_lossy(&percent_decode(src, plus_as_space)).into_owned()
}

/// Parses a `key=value&key2=value2` string (the leading `?` is optional),
/// percent-decoding both sides and mapping `+` to space. Last write wins
/// on duplicate keys.
pub(crate) fn parse_pairs(raw: &str) -> HashMap<String, String> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut map = HashMap::new();

    if raw.is_empty() {
        return map;
    }

    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };

        map.insert(
            percent_decode_str(key.as_bytes(), true),
            percent_decode_str(value.as_bytes(), true),
        );
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decode_total_correctness() {
        for b in 0u16..256 {
            let b = b as u8;
            let encoded = format!("%{:02X}", b);
            assert_eq!(percent_decode(encoded.as_bytes(), false), vec![b]);
        }
    }

    #[test]
    fn malformed_triple_passes_through() {
        assert_eq!(percent_decode(b"%zz", false), b"%zz");
        assert_eq!(percent_decode(b"%2", false), b"%2");
        assert_eq!(percent_decode(b"%", false), b"%");
    }

    #[test]
    fn plus_only_decodes_when_requested() {
        assert_eq!(percent_decode(b"a+b", true), b"a b");
        assert_eq!(percent_decode(b"a+b", false), b"a+b");
    }

    #[test]
    fn parse_pairs_last_write_wins() {
        let map = parse_pairs("a=1&b=2&a=3");
        assert_eq!(map.get("a").map(String::as_str), Some("3"));
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn parse_pairs_missing_equals_and_empty() {
        let map = parse_pairs("?debug&name=");
        assert_eq!(map.get("debug").map(String::as_str), Some(""));
        assert_eq!(map.get("name").map(String::as_str), Some(""));
    }
}
