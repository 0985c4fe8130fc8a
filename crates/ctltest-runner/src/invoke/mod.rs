//! One simulated request: context construction, lifecycle and recovery
//!
//! Order of a run: before-hook, context construction, `init`, `prepare`,
//! parameter merge into the form, handler body (guarded), `finish`,
//! after-hook.

mod context;
mod recovery;

pub use recovery::PanicReport;

use std::error::Error;

use serde_json::Value;
use tracing::{debug, warn};

use ctltest_core::{Config, Controller, IntoFlow, Request};

use crate::harness::{HookError, RunConfiguration, controller_name};
use context::param_text;
use recovery::Outcome;

/// Why a run did not produce output.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("before callback failed: {0}")]
    BeforeCallback(#[source] HookError),
    #[error("after callback failed: {0}")]
    AfterCallback(#[source] HookError),
    #[error("method not allowed: {method}")]
    MethodNotAllowed { method: String },
    #[error("{0}")]
    Panicked(PanicReport),
}

impl RunError {
    /// The error a hook returned, for downcasting to its concrete type.
    #[must_use]
    pub fn hook_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::BeforeCallback(e) | Self::AfterCallback(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn panic_report(&self) -> Option<&PanicReport> {
        match self {
            Self::Panicked(report) => Some(report),
            _ => None,
        }
    }
}

/// The request used when none was supplied: `GET /` with the default content type.
fn default_request(config: &Config) -> Request {
    let mut request = Request::blank();
    if let Err(e) = request.set_header("Content-Type", &config.default_content_type) {
        warn!(error = %e, "ignoring invalid default content type");
    }
    request
}

pub(crate) fn execute<C, F, R>(
    state: &mut RunConfiguration<C>,
    body: F,
) -> Result<Option<Value>, RunError>
where
    C: Controller,
    F: FnOnce(&mut C) -> R,
    R: IntoFlow,
{
    let RunConfiguration {
        controller,
        sessions,
        session,
        request,
        cookies,
        params,
        before,
        after,
        action,
        config,
        last_error,
        last_response,
    } = state;
    let Some(controller) = controller.as_mut() else {
        panic!("run: no controller bound");
    };

    *last_error = None;
    *last_response = None;

    let mut request = request.clone().unwrap_or_else(|| default_request(config));
    let name = controller_name::<C>();
    debug!(
        controller = name,
        action = action.as_str(),
        method = %request.method(),
        path = request.path(),
        "run started"
    );

    if let Some(hook) = before.as_mut() {
        if let Err(e) = hook() {
            warn!(error = %e, "before callback failed");
            *last_error = Some(e.to_string());
            return Err(RunError::BeforeCallback(e));
        }
    }

    let params = std::mem::take(params);
    for (cookie, value) in cookies.iter() {
        request.add_cookie(cookie, value);
    }
    if let (Some(sessions), Some(session)) = (sessions.as_ref(), session.as_ref()) {
        if !sessions.cookie_name().is_empty() {
            request.add_cookie(sessions.cookie_name(), session.id());
        }
    }

    let mut ctx = match context::build(request, config, &params) {
        Ok(ctx) => ctx,
        Err(rejected) => {
            let err = RunError::MethodNotAllowed {
                method: rejected.method,
            };
            warn!(error = %err, "request rejected before dispatch");
            *last_error = Some(err.to_string());
            *last_response = Some(rejected.response);
            return Err(err);
        }
    };
    ctx.input.set_session(session.clone());

    controller.init(ctx, name, action);
    controller.prepare();

    if let Some(ctx) = controller.base_mut().ctx_mut() {
        for (key, value) in &params {
            ctx.input.form_mut().set(key.clone(), param_text(value));
        }
    }

    let failure = match recovery::guarded(|| body(&mut *controller).into_flow()) {
        Outcome::Completed => None,
        Outcome::Aborted => {
            debug!(controller = name, "handler aborted");
            None
        }
        Outcome::Panicked(report) => {
            warn!(
                controller = name,
                message = %report.message,
                location = report.location.as_deref().unwrap_or("unknown"),
                "handler panicked"
            );
            debug!(backtrace = %report.backtrace, "panic backtrace");
            *last_error = Some(report.to_string());
            Some(report)
        }
    };

    controller.finish();
    *last_response = controller.base().ctx().map(|c| c.output.clone());

    if let Some(hook) = after.as_mut() {
        if let Err(e) = hook() {
            warn!(error = %e, "after callback failed");
            *last_error = Some(e.to_string());
            return Err(RunError::AfterCallback(e));
        }
    }

    match failure {
        Some(report) => Err(RunError::Panicked(report)),
        None => Ok(controller.base().json().cloned()),
    }
}
