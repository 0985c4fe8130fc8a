//! ctltest-core: the framework surface a controller test drives
//!
//! Requests, form parsing, the response recorder, sessions, the per-request
//! context and the controller lifecycle contract. The harness that runs a
//! controller lives in `ctltest-runner`.

pub mod config;
pub mod context;
pub mod controller;
pub mod convert;
pub mod form;
pub mod recorder;
pub mod request;
pub mod route;
pub mod session;

pub use config::{Config, ConfigError, config_schema};
pub use context::{Context, Input, Params};
pub use controller::{Abort, Controller, ControllerBase, Flow, IntoFlow, JSON_KEY};
pub use convert::{ConvertError, receive, reshape};
pub use form::{FilePart, Form, FormError};
pub use recorder::ResponseRecorder;
pub use request::{HTTP_METHODS, Request, RequestError};
pub use route::{RouteError, RoutePattern, SPLAT};
pub use session::{MemoryProvider, SessionManager, SessionProvider, SessionStore};

pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};
