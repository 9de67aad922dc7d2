//! # botgram-handlers
//!
//! Concrete [`Handler`](botgram_dispatch::Handler) implementations: command matching,
//! filtered message handling, regex matching with capture pass-through, update-kind
//! matching (including catch-all), and callback queries. Each carries an optional
//! per-handler `block` override.

pub mod callback;
pub mod callback_query;
pub mod command;
pub mod filters;
pub mod kind;
pub mod message;
pub mod regex_handler;

pub use callback::{callback, Callback, CallbackFuture};
pub use callback_query::CallbackQueryHandler;
pub use command::CommandHandler;
pub use filters::Filter;
pub use kind::{Kind, KindHandler};
pub use message::MessageHandler;
pub use regex_handler::RegexHandler;
