//! In-memory response writer

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Records what a controller writes instead of sending it over a socket.
///
/// The status defaults to `200 OK` until a handler writes one; like a real
/// writer, only the first written status sticks.
#[derive(Debug, Clone, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the status line. Later calls are ignored.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Append body bytes, implicitly committing `200 OK`.
    pub fn write(&mut self, bytes: &[u8]) {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(bytes);
    }

    /// Set a header. Invalid names or values are dropped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
    }

    /// Write `message` as a plain-text error response.
    pub fn error(&mut self, message: &str, status: StatusCode) {
        self.set_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8");
        self.set_header("x-content-type-options", "nosniff");
        self.write_header(status);
        self.body.extend_from_slice(message.as_bytes());
        self.body.push(b'\n');
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns error if `value` cannot be serialized.
    pub fn write_json<T: serde::Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        self.set_header(CONTENT_TYPE.as_str(), "application/json; charset=utf-8");
        self.write(&bytes);
        Ok(())
    }

    /// Recorded status (`200 OK` if none was written).
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status has been committed.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.status.is_some()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_headers_are_dropped() {
        let mut rec = ResponseRecorder::new();
        rec.set_header("bad name", "v");
        rec.set_header("x-note", "line\nbreak");
        rec.set_header("x-note", "kept");
        assert_eq!(rec.headers().len(), 1);
        assert_eq!(rec.header("x-note"), Some("kept"));
    }

    #[test]
    fn defaults_to_ok_and_empty() {
        let rec = ResponseRecorder::new();
        assert_eq!(rec.status(), StatusCode::OK);
        assert!(!rec.is_written());
        assert!(rec.body().is_empty());
    }

    #[test]
    fn first_status_wins() {
        let mut rec = ResponseRecorder::new();
        rec.write_header(StatusCode::CREATED);
        rec.write_header(StatusCode::NOT_FOUND);
        rec.write(b"x");
        assert_eq!(rec.status(), StatusCode::CREATED);
    }

    #[test]
    fn error_writes_plain_text() {
        let mut rec = ResponseRecorder::new();
        rec.error("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rec.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rec.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(rec.header("x-content-type-options"), Some("nosniff"));
        let text = rec.text();
        assert!(text.ends_with('\n'));
        insta::assert_snapshot!(text.trim_end(), @"Method Not Allowed");
    }

    #[test]
    fn json_body_round_trips() {
        let mut rec = ResponseRecorder::new();
        rec.write_json(&serde_json::json!({"id": 7})).unwrap();
        let value: serde_json::Value = rec.json().unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(
            rec.header("content-type"),
            Some("application/json; charset=utf-8")
        );
    }
}
