//! Synthetic HTTP request handed to the controller under test

use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;
use tracing::warn;

use crate::form::{Form, url_encode};

/// Base every request target is resolved against.
const BASE_URL: &str = "http://localhost/";

/// Methods the dispatcher accepts; anything else is answered with 405.
pub const HTTP_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "TRACE", "CONNECT",
];

/// An in-memory HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    form: Form,
}

impl Request {
    /// Create a request for `target` (absolute URL or path, optionally with a query).
    ///
    /// Extension methods are accepted here and rejected later by the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns error if the method token or the target is malformed.
    pub fn new(method: &str, target: &str) -> Result<Self, RequestError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;
        let url = base_url()
            .join(target)
            .map_err(|e| RequestError::InvalidUrl(format!("{target}: {e}")))?;
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
            form: Form::new(),
        })
    }

    /// A `GET /` request with no headers.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            method: Method::GET,
            url: base_url(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            form: Form::new(),
        }
    }

    pub fn get(target: &str) -> Result<Self, RequestError> {
        Self::new("GET", target)
    }

    pub fn post(target: &str) -> Result<Self, RequestError> {
        Self::new("POST", target)
    }

    pub fn put(target: &str) -> Result<Self, RequestError> {
        Self::new("PUT", target)
    }

    pub fn delete(target: &str) -> Result<Self, RequestError> {
        Self::new("DELETE", target)
    }

    /// Set a header, replacing existing values.
    ///
    /// # Errors
    ///
    /// Returns error if the name or value is not valid in HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// Set a header in place.
    ///
    /// # Errors
    ///
    /// Returns error if the name or value is not valid in HTTP.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), RequestError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Set a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns error if `value` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, RequestError> {
        self.body = serde_json::to_vec(value).map_err(|e| RequestError::Body(e.to_string()))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Set a urlencoded body from `pairs`.
    #[must_use]
    pub fn with_form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let form: Form = pairs.into_iter().collect();
        self.body = form.encode().into_bytes();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    /// Append a cookie to the `Cookie` header.
    pub fn add_cookie(&mut self, name: &str, value: &str) {
        let pair = format!("{}={}", name.trim(), url_encode(value));
        let joined = match self.headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{existing}; {pair}"),
            _ => pair,
        };
        match HeaderValue::from_str(&joined) {
            Ok(value) => {
                self.headers.insert(COOKIE, value);
            }
            Err(_) => warn!(cookie = name, "dropping cookie that is not a valid header value"),
        }
    }

    /// Look up a cookie sent with this request.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .and_then(|(_, v)| crate::form::url_decode(v))
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether the dispatcher recognizes the method.
    #[must_use]
    pub fn is_known_method(&self) -> bool {
        HTTP_METHODS.contains(&self.method.as_str())
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Decoded query pairs.
    pub fn query_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as text, if present and visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::blank()
    }
}

fn base_url() -> Url {
    Url::parse(BASE_URL).expect("base url is a valid absolute URL")
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("cannot encode body: {0}")]
    Body(String),
}
