//! The handler contract: `check` decides whether a handler fires for an update, `handle`
//! runs the callback with the exact value `check` produced.

use crate::context::Context;
use async_trait::async_trait;
use botgram_core::Update;

/// What a successful handler tells the dispatcher to do next.
///
/// `Stop` ends dispatch of all remaining groups for the current update (and, when
/// returned from an error handler, of the remaining error handlers too). It is control
/// flow, not an error; earlier groups that already ran are not undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Proceed to later groups.
    Continue,
    /// Skip all numerically later groups for this update.
    Stop,
}

/// The value a matching `check` passes to `handle`, so parsed data is not re-parsed.
///
/// `None` from `check` is the only non-match: empty `Args` and empty `Captures` still
/// count as a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Plain match, no payload.
    Match,
    /// Parsed command arguments (may be empty).
    Args(Vec<String>),
    /// Regex capture groups (may be empty).
    Captures(Vec<String>),
}

/// Outcome of a handler callback. `Err` is routed through the error-handler pipeline.
pub type HandlerResult = Result<Propagation, anyhow::Error>;

/// A single handler in the registry.
///
/// `check` must be side-effect-free and deterministic for a given update; the dispatcher
/// (and tests) may call it more than once. `handle` receives the exact [`CheckResult`]
/// that `check` returned.
#[async_trait]
pub trait Handler: Send + Sync {
    fn check(&self, update: &Update) -> Option<CheckResult>;

    async fn handle(
        &self,
        update: &Update,
        context: &Context,
        check_result: CheckResult,
    ) -> HandlerResult;

    /// Per-handler blocking override. `None` defers to the application default.
    /// Blocking handlers are awaited before the next group runs; non-blocking ones are
    /// spawned as supervised tasks and dispatch moves on immediately.
    fn block(&self) -> Option<bool> {
        None
    }
}

/// Callback invoked when a handler (or supervised task) fails.
///
/// The error is available via [`Context::error`]; `update` is the update being processed
/// when the failure happened, if any. Returning [`Propagation::Stop`] aborts the rest of
/// the error pipeline and all remaining groups.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle_error(&self, update: Option<&Update>, context: &Context) -> HandlerResult;

    fn block(&self) -> Option<bool> {
        None
    }
}
