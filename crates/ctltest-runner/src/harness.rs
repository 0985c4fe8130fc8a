//! Harness: per-run configuration behind one lock
//!
//! Every method takes `&self`, so a harness can be shared between threads;
//! configuration calls and runs are serialized.

use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use ctltest_core::{
    Config, Context, Controller, IntoFlow, Request, ResponseRecorder, SessionManager, SessionStore,
};

use crate::invoke::{self, RunError};

/// Error a before/after hook reports.
pub type HookError = Box<dyn Error + Send + Sync>;

/// A before/after hook.
pub type Hook = Box<dyn FnMut() -> Result<(), HookError> + Send>;

/// Everything a run reads; only reachable through the harness lock.
pub(crate) struct RunConfiguration<C> {
    pub(crate) controller: Option<C>,
    pub(crate) sessions: Option<SessionManager>,
    pub(crate) session: Option<SessionStore>,
    pub(crate) request: Option<Request>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) params: Map<String, Value>,
    pub(crate) before: Option<Hook>,
    pub(crate) after: Option<Hook>,
    pub(crate) action: String,
    pub(crate) config: Config,
    pub(crate) last_error: Option<String>,
    pub(crate) last_response: Option<ResponseRecorder>,
}

impl<C> RunConfiguration<C> {
    fn new(config: Config) -> Self {
        Self {
            controller: None,
            sessions: None,
            session: None,
            request: None,
            cookies: Vec::new(),
            params: Map::new(),
            before: None,
            after: None,
            action: String::new(),
            config,
            last_error: None,
            last_response: None,
        }
    }
}

/// Drives one controller through simulated requests.
pub struct Harness<C> {
    state: Mutex<RunConfiguration<C>>,
}

impl<C: Controller> Harness<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            state: Mutex::new(RunConfiguration::new(config)),
        }
    }

    /// Create a harness with `controller` already bound.
    #[must_use]
    pub fn bound(controller: C) -> Self {
        let harness = Self::new();
        harness.bind(controller);
        harness
    }

    fn state(&self) -> MutexGuard<'_, RunConfiguration<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn into_configuration(self) -> RunConfiguration<C> {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the controller under test.
    ///
    /// The controller gets a blank context and a fresh in-memory session.
    /// Binding again replaces the previous controller and session.
    pub fn bind(&self, mut controller: C) -> &Self {
        let mut state = self.state();
        let sessions = SessionManager::memory(state.config.session_cookie_name.clone());
        let session = sessions.regenerate_id();

        controller.init(Context::blank(), controller_name::<C>(), &state.action);
        controller.base_mut().attach_session(session.clone());

        state.controller = Some(controller);
        state.sessions = Some(sessions);
        state.session = Some(session);
        self
    }

    /// Store a value in the bound controller's session.
    ///
    /// # Panics
    ///
    /// Panics if no controller is bound.
    pub fn set_session(&self, name: &str, value: impl Into<Value>) -> &Self {
        let mut state = self.state();
        let Some(controller) = state.controller.as_mut() else {
            panic!("set_session: no controller bound");
        };
        controller.set_session(name, value.into());
        self
    }

    /// Send a cookie with every subsequent run. A cookie with the same name
    /// replaces the earlier value.
    ///
    /// # Panics
    ///
    /// Panics if no controller is bound.
    pub fn add_cookie(&self, name: &str, value: &str) -> &Self {
        let mut state = self.state();
        assert!(state.controller.is_some(), "add_cookie: no controller bound");
        match state.cookies.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => state.cookies.push((name.to_string(), value.to_string())),
        }
        self
    }

    /// Replace the pending parameters for the next run.
    ///
    /// Each value becomes both a path parameter and a form value. The map is
    /// consumed by the next run.
    pub fn set_params<I, K, V>(&self, params: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.state().params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Alias for [`Harness::set_params`].
    pub fn params<I, K, V>(&self, params: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.set_params(params)
    }

    /// Run `hook` before each run's context is built. An error stops the run.
    pub fn before_callback<F>(&self, hook: F) -> &Self
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.state().before = Some(Box::new(hook));
        self
    }

    /// Run `hook` after `finish`. An error becomes the run's result.
    pub fn after_callback<F>(&self, hook: F) -> &Self
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.state().after = Some(Box::new(hook));
        self
    }

    pub fn clear_before_callback(&self) -> &Self {
        self.state().before = None;
        self
    }

    pub fn clear_after_callback(&self) -> &Self {
        self.state().after = None;
        self
    }

    /// Use `request` instead of the synthesized `GET /` until [`Harness::reset`].
    pub fn use_request(&self, request: Request) -> &Self {
        self.state().request = Some(request);
        self
    }

    /// Forget the request, controller, session and cookies.
    pub fn reset(&self) -> &Self {
        let mut state = self.state();
        state.request = None;
        state.controller = None;
        state.sessions = None;
        state.session = None;
        state.cookies.clear();
        self
    }

    /// Replace the configuration. Takes effect on the next run; the session
    /// cookie name applies from the next [`Harness::bind`].
    pub fn configure(&self, config: Config) -> &Self {
        self.state().config = config;
        self
    }

    /// Route pattern used to derive path parameters.
    pub fn route(&self, pattern: impl Into<String>) -> &Self {
        self.state().config.route = Some(pattern.into());
        self
    }

    /// Action name passed to `init`.
    pub fn action(&self, name: impl Into<String>) -> &Self {
        self.state().action = name.into();
        self
    }

    /// Run `body` as the handler of one simulated request.
    ///
    /// Returns the controller's `"json"` output. An [`Abort`] from the body
    /// is a normal outcome. Hooks and `body` must not call back into this
    /// harness.
    ///
    /// `body` returns `()` or [`Flow`]. A closure whose only expression is a
    /// panic needs an explicit return type, e.g. `|c| -> () { panic!("x") }`,
    /// since `!` is not a body result.
    ///
    /// # Errors
    ///
    /// Returns error if a hook fails, the request method is not allowed, or
    /// the body panics.
    ///
    /// # Panics
    ///
    /// Panics if no controller is bound.
    ///
    /// [`Abort`]: ctltest_core::Abort
    /// [`Flow`]: ctltest_core::Flow
    pub fn run<F, R>(&self, body: F) -> Result<Option<Value>, RunError>
    where
        F: FnOnce(&mut C) -> R,
        R: IntoFlow,
    {
        invoke::execute(&mut self.state(), body)
    }

    /// Inspect the bound controller.
    pub fn with_controller<T>(&self, f: impl FnOnce(&C) -> T) -> Option<T> {
        self.state().controller.as_ref().map(f)
    }

    pub fn with_controller_mut<T>(&self, f: impl FnOnce(&mut C) -> T) -> Option<T> {
        self.state().controller.as_mut().map(f)
    }

    /// Unbind and return the controller.
    pub fn take_controller(&self) -> Option<C> {
        self.state().controller.take()
    }

    /// Session attached at bind time.
    #[must_use]
    pub fn session(&self) -> Option<SessionStore> {
        self.state().session.clone()
    }

    /// Message of the last run's error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// What the last run's controller wrote, including a 405 rejection.
    #[must_use]
    pub fn last_response(&self) -> Option<ResponseRecorder> {
        self.state().last_response.clone()
    }
}

impl<C: Controller> Default for Harness<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Harness<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Harness")
            .field("bound", &state.controller.is_some())
            .field("request", &state.request)
            .field("params", &state.params)
            .field("config", &state.config)
            .finish_non_exhaustive()
    }
}

/// Short type name of `C`, without module path or generics.
pub(crate) fn controller_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
