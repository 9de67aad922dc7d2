//! # botgram-dispatch
//!
//! The update-dispatch core: [`Application`] owns the update queue, the handler registry
//! and the error-handler pipeline, and drives per-update dispatch across ordered handler
//! groups. [`Updater`] feeds the queue via long polling or a webhook listener. Concrete
//! handler types live in `botgram-handlers`.

pub mod application;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod jobqueue;
pub mod persistence;
pub mod registry;
pub mod runner;
pub mod updater;

pub use application::Application;
pub use builder::ApplicationBuilder;
pub use config::BotConfig;
pub use context::{Context, DataMap};
pub use error::AppError;
pub use handler::{CheckResult, ErrorHandler, Handler, HandlerResult, Propagation};
pub use jobqueue::{JobFn, JobHandle, JobQueue};
pub use persistence::Persistence;
pub use runner::{run_polling, run_webhook};
pub use updater::{PollingOptions, Updater, WebhookOptions};
