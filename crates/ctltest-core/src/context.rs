//! Per-request context: parsed input, path parameters, session and response

use serde::de::DeserializeOwned;

use crate::form::{FilePart, Form};
use crate::recorder::ResponseRecorder;
use crate::request::Request;
use crate::session::SessionStore;

/// Ordered path parameters. Setting an existing name replaces its value.
///
/// Names may be given with or without the leading `:` used in route patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = normalize(name);
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = normalize(name);
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn normalize(name: &str) -> &str {
    name.strip_prefix(':').unwrap_or(name)
}

/// Request-side half of the context.
#[derive(Debug, Clone, Default)]
pub struct Input {
    request: Request,
    route_path: String,
    params: Params,
    body: Vec<u8>,
    files: Vec<FilePart>,
    session: Option<SessionStore>,
}

impl Input {
    #[must_use]
    pub fn new(request: Request) -> Self {
        let route_path = request.path().to_string();
        Self {
            request,
            route_path,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[must_use]
    pub fn method(&self) -> &str {
        self.request.method().as_str()
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method() == "GET"
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method() == "POST"
    }

    /// Request path as sent.
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Path after router normalization (lower-cased when routing is case-insensitive).
    #[must_use]
    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    pub fn set_route_path(&mut self, path: impl Into<String>) {
        self.route_path = path.into();
    }

    /// Path parameter by name (`"id"` and `":id"` are equivalent).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        self.params.set(name, value);
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Path parameter, then form value, for `key`.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.param(key)
            .filter(|v| !v.is_empty())
            .or_else(|| self.request.form().get(key))
    }

    #[must_use]
    pub fn form(&self) -> &Form {
        self.request.form()
    }

    pub fn form_mut(&mut self) -> &mut Form {
        self.request.form_mut()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.request.cookie(name)
    }

    /// Whether the request is a multipart upload.
    #[must_use]
    pub fn is_upload(&self) -> bool {
        self.request
            .content_type()
            .is_some_and(|ct| crate::form::media_type(ct) == "multipart/form-data")
    }

    /// Copy up to `max_bytes` of the request body into the context.
    pub fn copy_body(&mut self, max_bytes: usize) -> &[u8] {
        let body = self.request.body();
        self.body = body[..body.len().min(max_bytes)].to_vec();
        &self.body
    }

    /// Body captured by [`Input::copy_body`] (empty when capture is disabled).
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decode the captured body as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    #[must_use]
    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    pub fn add_file(&mut self, file: FilePart) {
        self.files.push(file);
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionStore> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<SessionStore>) {
        self.session = session;
    }
}

/// Everything a controller sees for one request.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub input: Input,
    pub output: ResponseRecorder,
}

impl Context {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            input: Input::new(request),
            output: ResponseRecorder::new(),
        }
    }

    /// Context around a blank `GET /` request.
    #[must_use]
    pub fn blank() -> Self {
        Self::new(Request::blank())
    }
}
