//! Assembles an [`Application`] and its [`Updater`] around a shared update queue.

use crate::application::Application;
use crate::error::AppError;
use crate::jobqueue::JobQueue;
use crate::persistence::Persistence;
use crate::updater::Updater;
use botgram_core::{BotApi, HttpBot};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Builder for [`Application`].
///
/// Either [`token`](Self::token) or [`bot`](Self::bot) must be set. By default the
/// application is sequential (`concurrent_updates = 1`), handlers block, and an updater
/// sharing the queue is attached.
pub struct ApplicationBuilder {
    bot: Option<Arc<dyn BotApi>>,
    concurrent_updates: usize,
    default_block: bool,
    with_updater: bool,
    persistence: Option<Arc<dyn Persistence>>,
    job_queue: Option<Arc<dyn JobQueue>>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self {
            bot: None,
            concurrent_updates: 1,
            default_block: true,
            with_updater: true,
            persistence: None,
            job_queue: None,
        }
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given token with the reqwest-backed [`HttpBot`] client.
    pub fn token(mut self, token: &str) -> Self {
        self.bot = Some(Arc::new(HttpBot::new(token)));
        self
    }

    /// Uses an explicit [`BotApi`] implementation (e.g. a test double or a client built
    /// against a local API server).
    pub fn bot(mut self, bot: Arc<dyn BotApi>) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Bounds how many updates may be processed at the same time. `1` (the default)
    /// processes updates strictly sequentially; `0` is rejected at build.
    pub fn concurrent_updates(mut self, bound: usize) -> Self {
        self.concurrent_updates = bound;
        self
    }

    /// Application-wide default for handlers that do not carry their own `block` flag.
    pub fn default_block(mut self, block: bool) -> Self {
        self.default_block = block;
        self
    }

    /// Disables the attached updater; the queue can then only be fed through
    /// [`Application::sender`] or `process_update`.
    pub fn without_updater(mut self) -> Self {
        self.with_updater = false;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn job_queue(mut self, job_queue: Arc<dyn JobQueue>) -> Self {
        self.job_queue = Some(job_queue);
        self
    }

    pub fn build(self) -> Result<Application, AppError> {
        let bot = self.bot.ok_or_else(|| {
            AppError::InvalidConfig("a bot token or BotApi instance is required".to_string())
        })?;
        if self.concurrent_updates == 0 {
            return Err(AppError::InvalidConcurrency);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let updater = self
            .with_updater
            .then(|| Arc::new(Updater::new(bot.clone(), tx.clone())));

        Ok(Application::new(
            bot,
            tx,
            rx,
            updater,
            self.job_queue,
            self.persistence,
            self.concurrent_updates,
            self.default_block,
        ))
    }
}
