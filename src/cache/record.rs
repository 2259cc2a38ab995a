//! Text encoding of the `meta` and `responseHeaders` records.
//!
//! Both records are line oriented. A line is `field:value;value;...;` with
//! the value separator and line breaks percent-escaped inside values:
//!
//! ```text
//! meta                          responseHeaders
//! 200                           Content-Type:text/css%3B charset=utf-8;
//! Expires:<raw expiry>;         Cache-Control:max-age=60;
//! Request:<normalized request>; Vary:Accept;Accept-Encoding;
//! ```

use crate::cache::entry::{Expiry, EXPIRES};
use crate::cache::error::CacheError;
use crate::proxy::headers::HeaderSet;

pub const META_FILE: &str = "meta";
pub const HEADERS_FILE: &str = "responseHeaders";
pub const BODY_FILE: &str = "responseBody";

const REQUEST_FIELD: &str = "Request";
const VALUE_DELIMITER: char = ';';

/// Decoded contents of a `meta` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub code: u16,
    pub expiry: Expiry,
    /// Full request this entry was stored for, when recorded.
    pub request: Option<String>,
}

pub fn encode_meta(code: u16, expiry: &Expiry, request: &str) -> String {
    let mut out = format!("{}\n", code);
    out.push_str(&format_line(EXPIRES, std::iter::once(expiry.raw())));
    out.push_str(&format_line(REQUEST_FIELD, std::iter::once(request)));
    out
}

pub fn decode_meta(text: &str) -> Result<Meta, CacheError> {
    let mut lines = text.lines();

    let code = lines
        .next()
        .ok_or_else(|| CacheError::malformed(META_FILE, "empty record"))?;
    let code: u16 = code
        .trim()
        .parse()
        .map_err(|_| CacheError::malformed(META_FILE, format!("bad status line `{}`", code)))?;

    let mut expiry = None;
    let mut request = None;
    for line in lines.filter(|line| !line.is_empty()) {
        let (field, values) = parse_line(line)
            .ok_or_else(|| CacheError::malformed(META_FILE, format!("bad line `{}`", line)))?;
        if field.eq_ignore_ascii_case(EXPIRES) {
            expiry = values.into_iter().next().map(Expiry::parse);
        } else if field.eq_ignore_ascii_case(REQUEST_FIELD) {
            request = values.into_iter().next();
        }
    }

    let expiry = expiry.ok_or_else(|| CacheError::malformed(META_FILE, "missing expiry"))?;
    Ok(Meta {
        code,
        expiry,
        request,
    })
}

pub fn encode_headers(headers: &HeaderSet) -> String {
    headers
        .iter()
        .map(|(name, values)| format_line(name, values.iter().map(String::as_str)))
        .collect()
}

pub fn decode_headers(text: &str) -> Result<HeaderSet, CacheError> {
    let mut headers = HeaderSet::new();
    for line in text.lines().filter(|line| !line.is_empty()) {
        let (name, values) = parse_line(line)
            .ok_or_else(|| CacheError::malformed(HEADERS_FILE, format!("bad line `{}`", line)))?;
        headers.insert(&name, values);
    }
    Ok(headers)
}

fn format_line<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> String {
    let mut line = format!("{}:", escape(field));
    for value in values {
        line.push_str(&escape(value));
        line.push(VALUE_DELIMITER);
    }
    line.push('\n');
    line
}

/// Split `field:v1;v2;` into the field and its unescaped values.
fn parse_line(line: &str) -> Option<(String, Vec<String>)> {
    let (field, rest) = line.split_once(':')?;
    if field.is_empty() {
        return None;
    }
    let mut values: Vec<String> = rest.split(VALUE_DELIMITER).map(unescape).collect();
    // The final delimiter leaves one trailing empty piece.
    if rest.ends_with(VALUE_DELIMITER) || rest.is_empty() {
        values.pop();
    }
    Some((unescape(field), values))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let code = rest.get(i + 1..i + 3);
        let decoded = match code {
            Some("25") => Some('%'),
            Some("3B") | Some("3b") => Some(';'),
            Some("0D") | Some("0d") => Some('\r'),
            Some("0A") | Some("0a") => Some('\n'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[i + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[i + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_layout() {
        let expiry = Expiry::parse("Wed, 21 Oct 2015 07:28:00 GMT");
        let text = encode_meta(200, &expiry, "example.com/a;b");
        assert_eq!(
            text,
            "200\nExpires:Wed, 21 Oct 2015 07:28:00 GMT;\nRequest:example.com/a%3Bb;\n"
        );

        let meta = decode_meta(&text).unwrap();
        assert_eq!(meta.code, 200);
        assert_eq!(meta.expiry, expiry);
        assert_eq!(meta.request.as_deref(), Some("example.com/a;b"));
    }

    #[test]
    fn meta_without_request_line_still_decodes() {
        let meta = decode_meta("204\nExpires:1500;\n").unwrap();
        assert_eq!(meta.code, 204);
        assert_eq!(meta.expiry.raw(), "1500");
        assert_eq!(meta.request, None);
    }

    #[test]
    fn broken_meta_is_rejected() {
        assert!(decode_meta("").is_err());
        assert!(decode_meta("ok\nExpires:1;\n").is_err());
        assert!(decode_meta("200\n").is_err());
        assert!(decode_meta("200\nno delimiter here\n").is_err());
    }

    #[test]
    fn header_values_with_delimiters_survive() {
        let mut headers = HeaderSet::new();
        headers.append("Content-Type", "text/css; charset=utf-8");
        headers.append("Vary", "Accept");
        headers.append("Vary", "Accept-Encoding");
        headers.append("X-Odd", "100%\r\nsure");

        let text = encode_headers(&headers);
        assert_eq!(
            text,
            "Content-Type:text/css%3B charset=utf-8;\nVary:Accept;Accept-Encoding;\nX-Odd:100%25%0D%0Asure;\n"
        );
        assert_eq!(decode_headers(&text).unwrap(), headers);
    }

    #[test]
    fn unescape_leaves_unknown_sequences() {
        assert_eq!(unescape("50%off%2"), "50%off%2");
        assert_eq!(unescape("a%3bb"), "a;b");
    }

    #[test]
    fn empty_value_lists_are_kept() {
        let headers = decode_headers("X-Empty:\nServer:nginx;\n").unwrap();
        assert_eq!(headers.get("X-Empty"), Some(&[][..]));
        assert_eq!(headers.first("server"), Some("nginx"));
    }
}
