//! Per-dispatch [`Context`]: the bag of references handed to every handler and error
//! handler callback.

use crate::application::AppInner;
use crate::handler::HandlerResult;
use crate::jobqueue::JobQueue;
use botgram_core::{BotApi, Update};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

/// Mutable payload of the persisted data maps.
pub type DataMap = HashMap<String, serde_json::Value>;

/// One dispatch attempt's view of the application: the bot, the update queue sender, the
/// optional job queue, the shared data maps and (on error paths) the error being handled.
///
/// The data maps are shared and unsynchronized beyond the closure-scoped lock each access
/// takes; concurrent handlers racing on them is an accepted tradeoff of the cooperative
/// model. Callers needing atomicity serialize themselves (the default concurrency bound
/// of 1 already does).
#[derive(Clone)]
pub struct Context {
    pub(crate) app: Arc<AppInner>,
    pub(crate) chat_id: Option<i64>,
    pub(crate) user_id: Option<i64>,
    pub(crate) error: Option<Arc<anyhow::Error>>,
}

impl Context {
    pub(crate) fn for_update(app: &Arc<AppInner>, update: &Update) -> Self {
        Self {
            app: app.clone(),
            chat_id: update.effective_chat_id(),
            user_id: update.effective_user_id(),
            error: None,
        }
    }

    pub(crate) fn for_error(
        app: &Arc<AppInner>,
        update: Option<&Update>,
        error: Arc<anyhow::Error>,
    ) -> Self {
        Self {
            app: app.clone(),
            chat_id: update.and_then(Update::effective_chat_id),
            user_id: update.and_then(Update::effective_user_id),
            error: Some(error),
        }
    }

    pub fn bot(&self) -> &Arc<dyn BotApi> {
        &self.app.bot
    }

    /// Sender side of the update queue. Anything pushed here goes through normal dispatch.
    pub fn sender(&self) -> UnboundedSender<Update> {
        self.app.tx.clone()
    }

    pub fn job_queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.app.job_queue.as_ref()
    }

    /// The error being handled, when this context was built for an error-handler call.
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_deref()
    }

    /// Chat id of the update this context was built for, if any.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    /// User id of the update this context was built for, if any.
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// Runs `f` with exclusive access to the bot-wide data map.
    pub fn with_bot_data<R>(&self, f: impl FnOnce(&mut DataMap) -> R) -> R {
        let mut data = self
            .app
            .bot_data
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        f(&mut data)
    }

    /// Runs `f` with exclusive access to this update's per-chat data map, created empty on
    /// first access. Returns `None` when the update has no chat.
    pub fn with_chat_data<R>(&self, f: impl FnOnce(&mut DataMap) -> R) -> Option<R> {
        let chat_id = self.chat_id?;
        let mut data = self
            .app
            .chat_data
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Some(f(data.entry(chat_id).or_default()))
    }

    /// Runs `f` with exclusive access to this update's per-user data map, created empty on
    /// first access. Returns `None` when the update has no user.
    pub fn with_user_data<R>(&self, f: impl FnOnce(&mut DataMap) -> R) -> Option<R> {
        let user_id = self.user_id?;
        let mut data = self
            .app
            .user_data
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Some(f(data.entry(user_id).or_default()))
    }

    /// Schedules a supervised background task, exactly like
    /// [`Application::create_task`](crate::Application::create_task).
    pub fn create_task<F>(&self, future: F, update: Option<Arc<Update>>) -> AbortHandle
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        self.app.spawn_supervised(update, future)
    }
}
