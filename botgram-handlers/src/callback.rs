//! The boxed async callback every bundled handler stores.

use botgram_core::Update;
use botgram_dispatch::{CheckResult, Context, HandlerResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type CallbackFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A handler callback: `(update, context, check_result)` with the standard call shape.
pub type Callback = Arc<dyn Fn(Update, Context, CheckResult) -> CallbackFuture + Send + Sync>;

/// Wraps an async fn (or closure returning a future) into a [`Callback`].
///
/// ```ignore
/// let cb = callback(|update, context, check_result| async move {
///     // ...
///     Ok(Propagation::Continue)
/// });
/// ```
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Update, Context, CheckResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |update, context, check_result| Box::pin(f(update, context, check_result)))
}
