//! Panic recovery boundary
//!
//! A process-wide panic hook is installed on first use. While the current
//! thread is inside [`guarded`], the hook records the panic site and a full
//! backtrace instead of printing; everywhere else it defers to the hook that
//! was installed before it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use ctltest_core::{Abort, Flow};

/// A panic raised by a handler body, caught and kept for the caller.
///
/// The rendered text is the message line followed by the backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    pub message: String,
    /// `file:line:column` of the panic site, when the hook saw it.
    pub location: Option<String>,
    pub backtrace: String,
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "handler panicked at {location}: {}", self.message)?,
            None => write!(f, "handler panicked: {}", self.message)?,
        }
        if !self.backtrace.is_empty() {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

impl std::error::Error for PanicReport {}

/// How a guarded body ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Aborted,
    Panicked(PanicReport),
}

struct Captured {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let captured = Captured {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture().to_string(),
            };
            CAPTURED.with(|slot| *slot.borrow_mut() = Some(captured));
        }));
    });
}

/// Marks the current thread as inside a boundary until dropped.
struct Boundary;

impl Boundary {
    fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for Boundary {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `body`, turning an [`Abort`] into a normal outcome and any other
/// panic into a [`PanicReport`].
pub(crate) fn guarded<F>(body: F) -> Outcome
where
    F: FnOnce() -> Flow,
{
    install_hook();
    CAPTURED.with(|slot| slot.borrow_mut().take());

    let result = {
        let _boundary = Boundary::enter();
        panic::catch_unwind(AssertUnwindSafe(body))
    };

    match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(Abort)) => Outcome::Aborted,
        Err(payload) if payload.is::<Abort>() => Outcome::Aborted,
        Err(payload) => {
            let captured = CAPTURED.with(|slot| slot.borrow_mut().take());
            // another hook replaced ours; the recovery site is the best we have
            let (location, backtrace) = match captured {
                Some(c) => (c.location, c.backtrace),
                None => (None, Backtrace::force_capture().to_string()),
            };
            Outcome::Panicked(PanicReport {
                message: panic_message(payload.as_ref()),
                location,
                backtrace,
            })
        }
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
