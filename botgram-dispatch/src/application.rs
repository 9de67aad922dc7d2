//! The dispatch core.
//!
//! [`Application`] owns the update queue, the handler registry and the error-handler
//! pipeline. Its consumption task dequeues updates and runs them through the handler
//! groups; failures are isolated per update and the loop itself never dies because of a
//! handler or error-handler failure.

use crate::context::{Context, DataMap};
use crate::error::AppError;
use crate::handler::{ErrorHandler, Handler, HandlerResult, Propagation};
use crate::jobqueue::JobQueue;
use crate::persistence::Persistence;
use crate::registry::HandlerRegistry;
use crate::updater::Updater;
use botgram_core::{BotApi, Update, User};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct LifeState {
    initialized: bool,
    running: bool,
}

pub(crate) struct AppInner {
    pub(crate) bot: Arc<dyn BotApi>,
    pub(crate) tx: UnboundedSender<Update>,
    pub(crate) job_queue: Option<Arc<dyn JobQueue>>,
    pub(crate) persistence: Option<Arc<dyn Persistence>>,
    pub(crate) bot_data: Mutex<DataMap>,
    pub(crate) chat_data: Mutex<HashMap<i64, DataMap>>,
    pub(crate) user_data: Mutex<HashMap<i64, DataMap>>,
    pub(crate) default_block: bool,

    rx: Mutex<Option<UnboundedReceiver<Update>>>,
    state: Mutex<LifeState>,
    identity: Mutex<Option<User>>,
    registry: RwLock<HandlerRegistry>,
    error_handlers: Mutex<Vec<Arc<dyn ErrorHandler>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    fetcher: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
    semaphore: Option<Arc<Semaphore>>,
}

/// The application: update queue, handler registry, error handlers and lifecycle.
///
/// Lifecycle is `initialize` → `start` → `stop` → `shutdown`, each independently
/// awaitable; out-of-order calls fail with an [`AppError`]. `start`/`stop` may be cycled
/// more than once between `initialize` and `shutdown`.
pub struct Application {
    inner: Arc<AppInner>,
    updater: Option<Arc<Updater>>,
}

impl Application {
    pub(crate) fn new(
        bot: Arc<dyn BotApi>,
        tx: UnboundedSender<Update>,
        rx: UnboundedReceiver<Update>,
        updater: Option<Arc<Updater>>,
        job_queue: Option<Arc<dyn JobQueue>>,
        persistence: Option<Arc<dyn Persistence>>,
        concurrent_updates: usize,
        default_block: bool,
    ) -> Self {
        let semaphore = if concurrent_updates > 1 {
            Some(Arc::new(Semaphore::new(concurrent_updates)))
        } else {
            None
        };
        Self {
            inner: Arc::new(AppInner {
                bot,
                tx,
                job_queue,
                persistence,
                bot_data: Mutex::new(DataMap::new()),
                chat_data: Mutex::new(HashMap::new()),
                user_data: Mutex::new(HashMap::new()),
                default_block,
                rx: Mutex::new(Some(rx)),
                state: Mutex::new(LifeState::default()),
                identity: Mutex::new(None),
                registry: RwLock::new(HandlerRegistry::default()),
                error_handlers: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
                fetcher: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                semaphore,
            }),
            updater,
        }
    }

    pub fn bot(&self) -> Arc<dyn BotApi> {
        self.inner.bot.clone()
    }

    /// Sender side of the update queue. Anything pushed here is dispatched in order; the
    /// queue contents are not validated beyond what dispatch itself requires.
    pub fn sender(&self) -> UnboundedSender<Update> {
        self.inner.tx.clone()
    }

    pub fn updater(&self) -> Option<&Arc<Updater>> {
        self.updater.as_ref()
    }

    pub fn job_queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.inner.job_queue.as_ref()
    }

    /// The bot's own identity, available after `initialize()`.
    pub fn bot_identity(&self) -> Option<User> {
        self.inner
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers a handler in the given group. Groups run in ascending numeric order;
    /// within a group the first matching handler wins and the rest of the group is
    /// skipped. Takes effect for subsequent updates when called mid-run.
    pub fn add_handler(&self, handler: Arc<dyn Handler>, group: i32) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(handler, group);
    }

    pub fn add_handlers(&self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>, group: i32) {
        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for handler in handlers {
            registry.add(handler, group);
        }
    }

    /// Removes a handler by identity. Returns whether anything was removed.
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>, group: i32) -> bool {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handler, group)
    }

    /// Registers an error handler. Error handlers run in insertion order; registering the
    /// same handler twice logs a warning and is a no-op.
    pub fn add_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        let mut handlers = self
            .inner
            .error_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if handlers.iter().any(|existing| Arc::ptr_eq(existing, &handler)) {
            warn!("The error handler is already registered, skipping");
            return;
        }
        handlers.push(handler);
    }

    pub fn remove_error_handler(&self, handler: &Arc<dyn ErrorHandler>) -> bool {
        let mut handlers = self
            .inner
            .error_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|existing| !Arc::ptr_eq(existing, handler));
        handlers.len() < before
    }

    /// Schedules a supervised background task. An `Err` escaping the future is routed
    /// through the error-handler pipeline tagged with `update`; the task is tracked and
    /// awaited during `stop()`. Aborting via the returned handle is not treated as an
    /// error.
    pub fn create_task<F>(&self, future: F, update: Option<Arc<Update>>) -> AbortHandle
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.spawn_supervised(update, future)
    }

    /// Verifies authentication with `get_me`, loads persisted data and initializes the
    /// attached updater. No-op (with a debug log) when already initialized.
    pub async fn initialize(&self) -> Result<(), AppError> {
        {
            let state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.initialized {
                debug!("Application already initialized");
                return Ok(());
            }
        }

        let me = self.inner.bot.get_me().await.map_err(|e| {
            if e.is_fatal_auth() {
                AppError::InvalidToken(e)
            } else {
                AppError::Api(e)
            }
        })?;
        info!(bot_id = me.id, username = ?me.username, "Bot authenticated");
        *self
            .inner
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(me);

        if let Some(persistence) = &self.inner.persistence {
            let bot_data = persistence.bot_data().await.map_err(AppError::Persistence)?;
            let chat_data = persistence.chat_data().await.map_err(AppError::Persistence)?;
            let user_data = persistence.user_data().await.map_err(AppError::Persistence)?;
            *self
                .inner
                .bot_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = bot_data;
            *self
                .inner
                .chat_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = chat_data;
            *self
                .inner
                .user_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = user_data;
            debug!("Persisted data loaded");
        }

        if let Some(updater) = &self.updater {
            updater.initialize().await;
        }

        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .initialized = true;
        Ok(())
    }

    /// Spawns the background consumption task and starts the job queue.
    pub async fn start(&self) -> Result<(), AppError> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !state.initialized {
                return Err(AppError::NotInitialized);
            }
            if state.running {
                return Err(AppError::AlreadyRunning);
            }
            state.running = true;
        }

        let Some(rx) = self
            .inner
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            // A previous fetcher still owns the receiver.
            self.inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .running = false;
            return Err(AppError::AlreadyRunning);
        };

        let token = CancellationToken::new();
        *self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();

        let fetcher = tokio::spawn(AppInner::update_fetcher(self.inner.clone(), rx, token));
        *self
            .inner
            .fetcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(fetcher);

        if let Some(job_queue) = &self.inner.job_queue {
            if let Err(e) = job_queue.start().await {
                self.halt_fetcher().await;
                self.inner
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .running = false;
                return Err(AppError::JobQueue(e));
            }
        }

        info!("Application started");
        Ok(())
    }

    /// Stops accepting new dequeues, then waits for every in-flight dispatch (blocking
    /// and non-blocking) and every supervised task to finish naturally. Nothing is
    /// forcibly cancelled. Stops the job queue last.
    pub async fn stop(&self) -> Result<(), AppError> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !state.running {
                return Err(AppError::NotRunning);
            }
            state.running = false;
        }

        info!("Application is stopping");
        self.halt_fetcher().await;
        self.inner.await_tasks().await;

        if let Some(job_queue) = &self.inner.job_queue {
            if job_queue.running() {
                if let Err(e) = job_queue.stop().await {
                    warn!(error = %e, "Failed to stop the job queue");
                }
            }
        }

        info!("Application stopped");
        Ok(())
    }

    /// Writes the final persistence snapshot and tears down the updater. Fails when the
    /// application is still running; no-op (with a warning) when never initialized.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.running {
                return Err(AppError::StillRunning);
            }
            if !state.initialized {
                warn!("shutdown() called on an uninitialized Application");
                return Ok(());
            }
            state.initialized = false;
        }

        if let Some(updater) = &self.updater {
            updater.shutdown().await?;
        }

        if let Some(persistence) = &self.inner.persistence {
            self.inner.persist_all(persistence).await;
            if let Err(e) = persistence.flush().await {
                warn!(error = %e, "Failed to flush persistence");
            }
        }

        info!("Application shut down");
        Ok(())
    }

    /// Runs one update through the handler groups, bypassing the queue. This is the same
    /// code path the consumption task uses; it is public for webhook-push delivery and
    /// synchronous testing.
    pub async fn process_update(&self, update: Update) {
        self.inner.process_update(Arc::new(update)).await;
    }

    async fn halt_fetcher(&self) {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        let fetcher = self
            .inner
            .fetcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(fetcher) = fetcher {
            if let Err(e) = fetcher.await {
                if e.is_panic() {
                    error!("update fetcher panicked");
                }
            }
        }
    }
}

impl AppInner {
    async fn update_fetcher(
        inner: Arc<AppInner>,
        mut rx: UnboundedReceiver<Update>,
        token: CancellationToken,
    ) {
        debug!("update fetcher started");
        loop {
            let received = tokio::select! {
                _ = token.cancelled() => break,
                received = rx.recv() => received,
            };
            let Some(update) = received else {
                debug!("update queue closed");
                break;
            };

            match &inner.semaphore {
                // Bounded concurrent processing: admission follows queue order, each
                // update gets its own task, permit held for the task's lifetime.
                Some(semaphore) => {
                    let acquired = tokio::select! {
                        _ = token.cancelled() => None,
                        permit = semaphore.clone().acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = acquired else {
                        // Dequeued but never admitted; hand it back so a restart
                        // dispatches it.
                        let _ = inner.tx.send(update);
                        break;
                    };
                    let task_inner = inner.clone();
                    let task_update = Arc::new(update);
                    let handle = tokio::spawn(async move {
                        task_inner.process_update(task_update).await;
                        drop(permit);
                    });
                    inner.track(handle);
                }
                None => inner.process_update(Arc::new(update)).await,
            }
        }
        // Hand the receiver back so start() can be called again.
        *inner.rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        debug!("update fetcher stopped");
    }

    pub(crate) async fn process_update(self: &Arc<Self>, update: Arc<Update>) {
        let context = Context::for_update(self, &update);
        let groups = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();

        debug!(update_id = update.update_id, "processing update");
        'groups: for (group, handlers) in groups {
            let selected = handlers
                .iter()
                .find_map(|handler| handler.check(&update).map(|check| (handler, check)));
            let Some((handler, check)) = selected else {
                continue;
            };

            let blocking = handler.block().unwrap_or(self.default_block);
            if blocking {
                match handler.handle(&update, &context, check).await {
                    Ok(Propagation::Continue) => {}
                    Ok(Propagation::Stop) => {
                        debug!(
                            update_id = update.update_id,
                            group, "handler stopped further propagation"
                        );
                        break 'groups;
                    }
                    Err(error) => {
                        warn!(
                            update_id = update.update_id,
                            group, "error raised while processing update"
                        );
                        if self.dispatch_error(Some(update.clone()), error).await
                            == Propagation::Stop
                        {
                            break 'groups;
                        }
                    }
                }
            } else {
                let task_handler = handler.clone();
                let task_update = update.clone();
                let task_context = context.clone();
                self.spawn_supervised(Some(update.clone()), async move {
                    task_handler
                        .handle(&task_update, &task_context, check)
                        .await
                });
            }
        }

        if let Some(persistence) = &self.persistence {
            self.persist_checkpoint(persistence, &update).await;
        }
    }

    /// Runs the error-handler pipeline for a failure raised while handling `update`.
    ///
    /// Returns `Propagation::Stop` when a blocking error handler asked to abort the
    /// remaining groups. Error-handler failures are logged, never re-entered into the
    /// pipeline.
    pub(crate) async fn dispatch_error(
        self: &Arc<Self>,
        update: Option<Arc<Update>>,
        error: anyhow::Error,
    ) -> Propagation {
        let handlers: Vec<Arc<dyn ErrorHandler>> = self
            .error_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if handlers.is_empty() {
            error!(error = %error, "No error handlers are registered, logging exception");
            return Propagation::Continue;
        }

        let error = Arc::new(error);
        let context = Context::for_error(self, update.as_deref(), error.clone());

        for handler in handlers {
            let blocking = handler.block().unwrap_or(self.default_block);
            if blocking {
                match handler.handle_error(update.as_deref(), &context).await {
                    Ok(Propagation::Continue) => {}
                    Ok(Propagation::Stop) => {
                        debug!("error handler stopped further propagation");
                        return Propagation::Stop;
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            "An error was raised and an uncaught error was raised while handling the error"
                        );
                    }
                }
            } else {
                let task_handler = handler.clone();
                let task_update = update.clone();
                let task_context = context.clone();
                let handle = tokio::spawn(async move {
                    match task_handler
                        .handle_error(task_update.as_deref(), &task_context)
                        .await
                    {
                        Ok(Propagation::Continue) => {}
                        Ok(Propagation::Stop) => warn!(
                            "Propagation::Stop from a non-blocking error handler has no effect"
                        ),
                        Err(e) => error!(
                            error = %e,
                            "An error was raised and an uncaught error was raised while handling the error"
                        ),
                    }
                });
                self.track(handle);
            }
        }
        Propagation::Continue
    }

    pub(crate) fn spawn_supervised<F>(
        self: &Arc<Self>,
        update: Option<Arc<Update>>,
        future: F,
    ) -> AbortHandle
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        let inner = self.clone();
        let handle = tokio::spawn(async move {
            match future.await {
                Ok(Propagation::Continue) => {}
                Ok(Propagation::Stop) => warn!(
                    "Propagation::Stop returned from a non-blocking task has no effect; \
                     dispatch has already moved on"
                ),
                Err(error) => {
                    inner.dispatch_error(update, error).await;
                }
            }
        });
        let abort = handle.abort_handle();
        self.track(handle);
        abort
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|tracked| !tracked.is_finished());
        tasks.push(handle);
    }

    /// Awaits every tracked task, looping because awaited tasks may spawn more.
    async fn await_tasks(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.drain(..).collect()
            };
            if drained.is_empty() {
                break;
            }
            for handle in drained {
                if let Err(e) = handle.await {
                    // Aborted tasks were cancelled by their owner; only panics are notable.
                    if e.is_panic() {
                        error!("a supervised task panicked");
                    }
                }
            }
        }
    }

    /// Persistence checkpoint after one dispatch: bot data plus the maps of the update's
    /// effective chat and user.
    async fn persist_checkpoint(&self, persistence: &Arc<dyn Persistence>, update: &Update) {
        let bot_data = self
            .bot_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Err(e) = persistence.update_bot_data(&bot_data).await {
            warn!(error = %e, "Failed to persist bot data");
        }

        if let Some(chat_id) = update.effective_chat_id() {
            let data = self
                .chat_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&chat_id)
                .cloned()
                .unwrap_or_default();
            if let Err(e) = persistence.update_chat_data(chat_id, &data).await {
                warn!(error = %e, chat_id, "Failed to persist chat data");
            }
        }

        if let Some(user_id) = update.effective_user_id() {
            let data = self
                .user_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&user_id)
                .cloned()
                .unwrap_or_default();
            if let Err(e) = persistence.update_user_data(user_id, &data).await {
                warn!(error = %e, user_id, "Failed to persist user data");
            }
        }
    }

    /// Full snapshot written at shutdown.
    async fn persist_all(&self, persistence: &Arc<dyn Persistence>) {
        let bot_data = self
            .bot_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Err(e) = persistence.update_bot_data(&bot_data).await {
            warn!(error = %e, "Failed to persist bot data");
        }

        let chat_data: Vec<(i64, DataMap)> = self
            .chat_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, data)| (*id, data.clone()))
            .collect();
        for (chat_id, data) in chat_data {
            if let Err(e) = persistence.update_chat_data(chat_id, &data).await {
                warn!(error = %e, chat_id, "Failed to persist chat data");
            }
        }

        let user_data: Vec<(i64, DataMap)> = self
            .user_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, data)| (*id, data.clone()))
            .collect();
        for (user_id, data) in user_data {
            if let Err(e) = persistence.update_user_data(user_id, &data).await {
                warn!(error = %e, user_id, "Failed to persist user data");
            }
        }
    }
}
