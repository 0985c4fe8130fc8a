//! ctltest-runner: run a controller through one simulated request
//!
//! [`Harness`] collects the per-run configuration; `invoke` builds the
//! request context the way the framework's dispatcher would, drives the
//! controller lifecycle and turns handler panics into [`RunError`]s.

pub mod harness;
pub mod invoke;

pub use harness::{Harness, Hook, HookError};
pub use invoke::{PanicReport, RunError};
