//! Controller lifecycle contract
//!
//! A controller is driven through `init` → `prepare` → handler body →
//! `finish`. Handlers stop early by returning [`Abort`] (or, from deep
//! inside a call stack, with [`Abort::raise`]); that is a normal outcome,
//! not a failure.

use std::fmt;
use std::panic;

use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::session::SessionStore;

/// Data key holding the controller's JSON output.
pub const JSON_KEY: &str = "json";

/// Signal that the handler stopped itself on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort;

impl Abort {
    /// Unwind out of the current handler with an `Abort` payload.
    ///
    /// The panic hook is not invoked.
    #[track_caller]
    pub fn raise() -> ! {
        panic::resume_unwind(Box::new(Self))
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("handler stopped the run")
    }
}

impl std::error::Error for Abort {}

/// Outcome of a handler body.
pub type Flow = Result<(), Abort>;

/// Handler body return types the runner accepts.
pub trait IntoFlow {
    fn into_flow(self) -> Flow;
}

impl IntoFlow for () {
    fn into_flow(self) -> Flow {
        Ok(())
    }
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Flow {
        self
    }
}

/// State every controller embeds.
#[derive(Debug, Default)]
pub struct ControllerBase {
    ctx: Option<Context>,
    data: Map<String, Value>,
    session: Option<SessionStore>,
    controller_name: String,
    action_name: String,
}

impl ControllerBase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fresh context and reset per-request state.
    pub fn init(&mut self, mut ctx: Context, controller_name: &str, action_name: &str) {
        if ctx.input.session().is_none() {
            ctx.input.set_session(self.session.clone());
        }
        self.ctx = Some(ctx);
        self.data = Map::new();
        self.controller_name = controller_name.to_string();
        self.action_name = action_name.to_string();
    }

    /// Replace the context without resetting data.
    pub fn set_context(&mut self, ctx: Context) {
        self.ctx = Some(ctx);
    }

    #[must_use]
    pub fn ctx(&self) -> Option<&Context> {
        self.ctx.as_ref()
    }

    pub fn ctx_mut(&mut self) -> Option<&mut Context> {
        self.ctx.as_mut()
    }

    #[must_use]
    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    /// Store the JSON output.
    pub fn set_json(&mut self, value: impl Into<Value>) {
        self.data.insert(JSON_KEY.to_string(), value.into());
    }

    /// The JSON output, if the handler produced one.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.data.get(JSON_KEY)
    }

    /// Path parameter from the current context.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.ctx.as_ref().and_then(|c| c.input.param(name))
    }

    /// Path parameter or form value from the current context.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.ctx.as_ref().and_then(|c| c.input.query(key))
    }

    /// Attach the session this controller reads and writes.
    pub fn attach_session(&mut self, session: SessionStore) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.input.set_session(Some(session.clone()));
        }
        self.session = Some(session);
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionStore> {
        self.session.as_ref()
    }

    /// Write a session value. No-op when no session is attached.
    pub fn set_session(&mut self, name: &str, value: Value) {
        if let Some(session) = &self.session {
            session.set(name, value);
        }
    }

    #[must_use]
    pub fn get_session(&self, name: &str) -> Option<Value> {
        self.session.as_ref().and_then(|s| s.get(name))
    }

    pub fn del_session(&mut self, name: &str) {
        if let Some(session) = &self.session {
            session.delete(name);
        }
    }

    /// Stop the handler; return the result from the body.
    #[must_use]
    pub fn stop_run(&self) -> Abort {
        Abort
    }

    /// Write `status` with `body` and stop the handler.
    #[must_use]
    pub fn abort_with(&mut self, status: StatusCode, body: &str) -> Abort {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.output.write_header(status);
            ctx.output.write(body.as_bytes());
        }
        Abort
    }
}

/// A request handler with an init/prepare/finish lifecycle.
pub trait Controller: Send {
    fn base(&self) -> &ControllerBase;

    fn base_mut(&mut self) -> &mut ControllerBase;

    fn init(&mut self, ctx: Context, controller_name: &str, action_name: &str) {
        self.base_mut().init(ctx, controller_name, action_name);
    }

    /// Runs after `init`, before the handler body.
    fn prepare(&mut self) {}

    /// Runs after the handler body, even when it panicked.
    fn finish(&mut self) {}

    fn set_session(&mut self, name: &str, value: Value) {
        self.base_mut().set_session(name, value);
    }
}

impl Controller for ControllerBase {
    fn base(&self) -> &ControllerBase {
        self
    }

    fn base_mut(&mut self) -> &mut ControllerBase {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::session::SessionManager;

    #[test]
    fn init_resets_data_and_names() {
        let mut base = ControllerBase::new();
        base.set_json("stale");
        base.init(Context::blank(), "UserController", "Get");
        assert!(base.json().is_none());
        assert_eq!(base.controller_name(), "UserController");
        assert_eq!(base.action_name(), "Get");
    }

    #[test]
    fn init_shares_attached_session_with_context() {
        let manager = SessionManager::memory("");
        let mut base = ControllerBase::new();
        base.attach_session(manager.regenerate_id());
        base.set_session("user", Value::from("alice"));

        base.init(Context::new(Request::blank()), "", "");
        let ctx_session = base.ctx().and_then(|c| c.input.session()).unwrap();
        assert_eq!(ctx_session.get("user"), Some(Value::from("alice")));
    }

    #[test]
    fn set_session_without_store_is_noop() {
        let mut base = ControllerBase::new();
        base.set_session("k", Value::Null);
        assert!(base.get_session("k").is_none());
    }

    #[test]
    fn abort_with_writes_response() {
        let mut base = ControllerBase::new();
        base.init(Context::blank(), "", "");
        let abort = base.abort_with(StatusCode::FORBIDDEN, "denied");
        assert_eq!(abort, Abort);
        let output = &base.ctx().unwrap().output;
        assert_eq!(output.status(), StatusCode::FORBIDDEN);
        assert_eq!(output.text(), "denied");
    }

    #[test]
    fn unit_and_flow_convert() {
        assert_eq!(().into_flow(), Ok(()));
        assert_eq!(Err::<(), _>(Abort).into_flow(), Err(Abort));
    }

    #[test]
    fn raise_unwinds_with_abort_payload() {
        let payload = std::panic::catch_unwind(|| -> () { Abort::raise() }).unwrap_err();
        assert!(payload.downcast_ref::<Abort>().is_some());
    }
}
