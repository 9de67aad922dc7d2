//! # botgram-core
//!
//! Transport-facing building blocks for the botgram framework: the [`Update`] data model,
//! the [`BotApi`] trait with its reqwest-backed [`HttpBot`] implementation, the typed API
//! error taxonomy, and tracing initialization. Dispatch logic lives in `botgram-dispatch`.

pub mod api;
pub mod error;
pub mod logger;
pub mod types;

pub use api::{BotApi, HttpBot, DEFAULT_API_URL};
pub use error::{ApiError, ApiResult};
pub use logger::init_tracing;
pub use types::{CallbackQuery, Chat, Message, Update, UpdateKind, User};
