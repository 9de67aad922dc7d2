//! The update source: long polling and the webhook listener.
//!
//! Both modes normalize inbound updates onto the application's shared queue. `stop()`
//! guarantees no more updates are pushed after it returns.

use crate::error::AppError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use botgram_core::{ApiError, BotApi, Update};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Callback invoked with every error the polling loop encounters, fatal or transient.
pub type PollingErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Options for [`Updater::start_polling`].
#[derive(Clone)]
pub struct PollingOptions {
    /// Pause between successful poll batches. Zero polls back-to-back (the long-poll
    /// timeout provides the pacing).
    pub poll_interval: Duration,
    /// Long-poll window in seconds passed to `getUpdates`.
    pub timeout: u64,
    /// Maximum batch size, server default when `None`.
    pub limit: Option<u8>,
    /// Discard updates that accumulated while the bot was down.
    pub drop_pending_updates: bool,
    pub on_error: Option<PollingErrorCallback>,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            timeout: 10,
            limit: None,
            drop_pending_updates: false,
            on_error: None,
        }
    }
}

/// Options for [`Updater::start_webhook`].
#[derive(Debug, Clone)]
pub struct WebhookOptions {
    /// Bind address for the listener. Port 0 picks a free port; the bound address is
    /// returned by `start_webhook`.
    pub addr: SocketAddr,
    /// URL path updates are POSTed to (conventionally the bot token).
    pub path: String,
    /// When set, requests must carry the matching secret-token header; others get 403.
    pub secret_token: Option<String>,
    /// When set, registered with the API via `setWebhook` at startup. TLS is expected to
    /// be terminated in front of the listener.
    pub webhook_url: Option<String>,
}

#[derive(Default)]
struct UpdaterState {
    initialized: bool,
    running: bool,
}

/// Pulls updates via repeated long polls, or receives them on a webhook listener, and
/// pushes them onto the shared update queue in ascending `update_id` order.
///
/// Lifecycle mirrors the application: `initialize` → `start_polling`/`start_webhook` →
/// `stop` → `shutdown`, with loud failures on out-of-order calls.
pub struct Updater {
    bot: Arc<dyn BotApi>,
    tx: UnboundedSender<Update>,
    state: Mutex<UpdaterState>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    pub fn new(bot: Arc<dyn BotApi>, tx: UnboundedSender<Update>) -> Self {
        Self {
            bot,
            tx,
            state: Mutex::new(UpdaterState::default()),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub async fn initialize(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.initialized {
            debug!("Updater already initialized");
            return;
        }
        state.initialized = true;
    }

    pub fn running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }

    /// Starts the long-polling loop. Any existing webhook is deleted first, since the API
    /// refuses `getUpdates` while one is registered.
    pub async fn start_polling(&self, options: PollingOptions) -> Result<(), AppError> {
        self.mark_running()?;

        if let Err(e) = self
            .bot
            .delete_webhook(options.drop_pending_updates)
            .await
        {
            if e.is_fatal_auth() {
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .running = false;
                return Err(AppError::Api(e));
            }
            warn!(error = %e, "Failed to delete webhook before polling, continuing anyway");
        }

        let token = self.fresh_token();
        let bot = self.bot.clone();
        let tx = self.tx.clone();
        let task = tokio::spawn(polling_loop(bot, tx, token, options));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!("Updater started polling");
        Ok(())
    }

    /// Starts the webhook listener and returns the bound address. The listener replies
    /// 200 as soon as an update is enqueued, before any handler runs, so the API's
    /// retry/backoff never kicks in.
    pub async fn start_webhook(&self, options: WebhookOptions) -> Result<SocketAddr, AppError> {
        self.mark_running()?;

        let listener = match tokio::net::TcpListener::bind(options.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .running = false;
                return Err(AppError::Io(e));
            }
        };
        let local_addr = listener.local_addr()?;

        if let Some(url) = &options.webhook_url {
            if let Err(e) = self
                .bot
                .set_webhook(url, options.secret_token.as_deref())
                .await
            {
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .running = false;
                return Err(AppError::Api(e));
            }
        }

        let mut path = options.path.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        let router = Router::new()
            .route(&path, post(receive_update))
            .with_state(WebhookState {
                tx: self.tx.clone(),
                secret_token: options.secret_token.clone(),
            });

        let token = self.fresh_token();
        let task = tokio::spawn(async move {
            let shutdown = token.cancelled_owned();
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "webhook listener failed");
            }
            debug!("webhook listener stopped");
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!(addr = %local_addr, "Updater listening for webhook updates");
        Ok(local_addr)
    }

    /// Stops the polling loop or webhook listener. After this returns, no more updates
    /// are pushed onto the queue.
    pub async fn stop(&self) -> Result<(), AppError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.running {
                return Err(AppError::NotRunning);
            }
            state.running = false;
        }

        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("update source task panicked");
                }
            }
        }

        info!("Updater stopped");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.running {
            return Err(AppError::StillRunning);
        }
        state.initialized = false;
        Ok(())
    }

    fn mark_running(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.initialized {
            return Err(AppError::NotInitialized);
        }
        if state.running {
            return Err(AppError::AlreadyRunning);
        }
        state.running = true;
        Ok(())
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}

async fn polling_loop(
    bot: Arc<dyn BotApi>,
    tx: UnboundedSender<Update>,
    token: CancellationToken,
    options: PollingOptions,
) {
    let mut offset: Option<i64> = None;
    debug!("polling loop started");

    'polling: loop {
        let fetched = tokio::select! {
            _ = token.cancelled() => break 'polling,
            fetched = bot.get_updates(offset, options.limit, Some(options.timeout)) => fetched,
        };

        match fetched {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if tx.send(update).is_err() {
                        warn!("update queue closed, stopping polling");
                        break 'polling;
                    }
                }
            }
            Err(api_error) => {
                if let Some(on_error) = &options.on_error {
                    on_error(&api_error);
                }
                if api_error.is_fatal_auth() {
                    error!(error = %api_error, "Fatal authorization error, polling stopped");
                    break 'polling;
                }
                warn!(error = %api_error, "Error while getting updates, retrying");
                let backoff = if options.poll_interval.is_zero() {
                    Duration::from_secs(1)
                } else {
                    options.poll_interval
                };
                tokio::select! {
                    _ = token.cancelled() => break 'polling,
                    _ = tokio::time::sleep(backoff) => {}
                }
                continue 'polling;
            }
        }

        if !options.poll_interval.is_zero() {
            tokio::select! {
                _ = token.cancelled() => break 'polling,
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }

    debug!("polling loop stopped");
}

#[derive(Clone)]
struct WebhookState {
    tx: UnboundedSender<Update>,
    secret_token: Option<String>,
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    payload: Result<Json<Update>, JsonRejection>,
) -> StatusCode {
    if let Some(expected) = &state.secret_token {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!("webhook request with missing or wrong secret token");
            return StatusCode::FORBIDDEN;
        }
    }

    let Json(update) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(update_id = update.update_id, "webhook update received");
    if state.tx.send(update).is_err() {
        // Queue gone means the application was dropped; tell the sender to retry later.
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
