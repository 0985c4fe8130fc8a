//! Form values and request body parsing
//!
//! Handles `application/x-www-form-urlencoded` and `multipart/form-data`
//! bodies. Multipart text fields land in the [`Form`]; parts carrying a
//! filename are kept as [`FilePart`]s.

use std::collections::BTreeMap;

use serde::Serialize;

/// Multi-valued form map, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Form(BTreeMap<String, Vec<String>>);

impl Form {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Replace all values of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// Append `value` to `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Encode as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| format!("{}={}", url_encode(k), url_encode(v))))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Form {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = Self::new();
        for (k, v) in iter {
            form.add(k, v);
        }
        form
    }
}

/// An uploaded file from a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    /// Client-supplied filename
    pub filename: String,
    /// Part Content-Type, if declared
    pub content_type: Option<String>,
    /// Raw file bytes
    pub data: Vec<u8>,
}

/// Result of parsing a request body.
#[derive(Debug, Default)]
pub struct ParsedBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

/// Parse `application/x-www-form-urlencoded` text.
///
/// Pairs that are not valid percent-encoding are skipped.
#[must_use]
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Some((url_decode(k)?, url_decode(v)?))
        })
        .collect()
}

/// Decode a percent-encoded form component (`+` is a space).
#[must_use]
pub fn url_decode(s: &str) -> Option<String> {
    let mut result = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();

    while let Some(byte) = bytes.next() {
        match byte {
            b'%' => {
                let hi = char::from(bytes.next()?).to_digit(16)?;
                let lo = char::from(bytes.next()?).to_digit(16)?;
                result.push(u8::try_from(hi * 16 + lo).ok()?);
            }
            b'+' => result.push(b' '),
            other => result.push(other),
        }
    }

    String::from_utf8(result).ok()
}

/// Percent-encode a form component.
#[must_use]
pub fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Media type without parameters, lower-cased.
#[must_use]
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Parse a body according to its Content-Type.
///
/// Unknown media types yield an empty result. At most `max_bytes` of the
/// body are considered.
///
/// # Errors
///
/// Returns error if a urlencoded body is not UTF-8 or a multipart body is malformed.
pub fn parse_body(
    content_type: &str,
    body: &[u8],
    max_bytes: usize,
) -> Result<ParsedBody, FormError> {
    let body = &body[..body.len().min(max_bytes)];
    match media_type(content_type).as_str() {
        "application/x-www-form-urlencoded" => {
            let text = std::str::from_utf8(body).map_err(|_| FormError::InvalidUtf8)?;
            Ok(ParsedBody {
                fields: parse_urlencoded(text),
                files: Vec::new(),
            })
        }
        "multipart/form-data" => {
            let boundary = boundary(content_type).ok_or(FormError::MissingBoundary)?;
            parse_multipart(body, &boundary)
        }
        _ => Ok(ParsedBody::default()),
    }
}

/// Extract the `boundary` parameter from a multipart Content-Type.
fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a `multipart/form-data` body.
fn parse_multipart(body: &[u8], boundary: &str) -> Result<ParsedBody, FormError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parsed = ParsedBody::default();

    let start = find(body, delimiter).ok_or(FormError::InvalidFormat("missing opening boundary"))?;
    let mut rest = &body[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            return Ok(parsed);
        }
        rest = rest
            .strip_prefix(b"\r\n")
            .ok_or(FormError::InvalidFormat("boundary not followed by CRLF"))?;

        let header_end = find(rest, b"\r\n\r\n").ok_or(FormError::UnexpectedEof)?;
        let headers = std::str::from_utf8(&rest[..header_end]).map_err(|_| FormError::InvalidUtf8)?;
        let content = &rest[header_end + 4..];

        let mut closing = b"\r\n".to_vec();
        closing.extend_from_slice(delimiter);
        let content_end = find(content, &closing).ok_or(FormError::UnexpectedEof)?;
        let data = &content[..content_end];
        rest = &content[content_end + closing.len()..];

        let part = PartHeaders::parse(headers)?;
        match part.filename {
            Some(filename) => parsed.files.push(FilePart {
                field: part.name,
                filename,
                content_type: part.content_type,
                data: data.to_vec(),
            }),
            None => {
                let value = String::from_utf8(data.to_vec()).map_err(|_| FormError::InvalidUtf8)?;
                parsed.fields.push((part.name, value));
            }
        }
    }
}

struct PartHeaders {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn parse(block: &str) -> Result<Self, FormError> {
        let mut disposition = None;
        let mut content_type = None;
        for line in block.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-disposition") {
                disposition = Some(value.trim().to_string());
            } else if name.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }

        let disposition = disposition.ok_or(FormError::MissingContentDisposition)?;
        let mut name = None;
        let mut filename = None;
        for param in disposition.split(';').skip(1) {
            if let Some((key, value)) = param.trim().split_once('=') {
                let value = value.trim().trim_matches('"').to_string();
                match key.trim() {
                    "name" => name = Some(value),
                    "filename" => filename = Some(value),
                    _ => {}
                }
            }
        }

        Ok(Self {
            name: name.ok_or(FormError::MissingContentDisposition)?,
            filename,
            content_type,
        })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("body is not valid UTF-8")]
    InvalidUtf8,
    #[error("missing boundary in multipart Content-Type")]
    MissingBoundary,
    #[error("missing Content-Disposition name in multipart part")]
    MissingContentDisposition,
    #[error("unexpected end of multipart data")]
    UnexpectedEof,
    #[error("invalid multipart format: {0}")]
    InvalidFormat(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARY: &str = "XyZ";

    fn multipart_body() -> Vec<u8> {
        [
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "hello world\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "file contents\r\n",
            "--XyZ--\r\n",
        ]
        .concat()
        .into_bytes()
    }

    #[test]
    fn form_set_replaces_add_appends() {
        let mut form = Form::new();
        form.add("tag", "a");
        form.add("tag", "b");
        assert_eq!(form.get_all("tag"), ["a", "b"]);

        form.set("tag", "c");
        assert_eq!(form.get_all("tag"), ["c"]);
        assert_eq!(form.get("missing"), None);
    }

    #[test]
    fn urlencoded_decodes_plus_and_percent() {
        let pairs = parse_urlencoded("name=John+Doe&city=K%C3%B6ln&flag");
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "John Doe".to_string()),
                ("city".to_string(), "Köln".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn urlencoded_skips_broken_escapes() {
        assert_eq!(parse_urlencoded("a=%zz&b=2"), vec![("b".to_string(), "2".to_string())]);
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(
            media_type("Multipart/Form-Data; boundary=abc"),
            "multipart/form-data"
        );
    }

    #[test]
    fn multipart_fields_and_files() {
        let body = multipart_body();
        let parsed = parse_body(
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            &body,
            usize::MAX,
        )
        .unwrap();

        assert_eq!(parsed.fields, vec![("title".to_string(), "hello world".to_string())]);
        assert_eq!(parsed.files.len(), 1);
        let file = &parsed.files[0];
        assert_eq!(file.field, "upload");
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.data, b"file contents");
    }

    #[test]
    fn multipart_without_boundary_is_error() {
        let err = parse_body("multipart/form-data", b"", usize::MAX).unwrap_err();
        assert_eq!(err, FormError::MissingBoundary);
    }

    #[test]
    fn multipart_truncated_by_limit_is_eof() {
        let body = multipart_body();
        let err = parse_body(
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            &body,
            40,
        )
        .unwrap_err();
        assert_eq!(err, FormError::UnexpectedEof);
    }

    #[test]
    fn unknown_media_type_is_ignored() {
        let parsed = parse_body("application/json", br#"{"a":1}"#, usize::MAX).unwrap();
        assert!(parsed.fields.is_empty());
        assert!(parsed.files.is_empty());
    }

    proptest! {
        #[test]
        fn encode_then_parse_preserves_pairs(key in "[a-z]{1,8}", value in "\\PC{0,16}") {
            let form: Form = [(key.clone(), value.clone())].into_iter().collect();
            let pairs = parse_urlencoded(&form.encode());
            prop_assert_eq!(pairs, vec![(key, value)]);
        }
    }
}
