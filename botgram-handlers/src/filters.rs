//! Composable message predicates for [`MessageHandler`](crate::MessageHandler).
//!
//! Filters combine with [`and`](Filter::and), [`or`](Filter::or) and [`not`](Filter::not):
//!
//! ```ignore
//! let photo_captions = filters::caption().and(filters::regex(r"(?i)cat")?);
//! ```

use botgram_core::Message;
use regex::Regex;
use std::sync::Arc;

/// A predicate over an incoming message.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&Message) -> bool + Send + Sync>);

impl Filter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn matches(&self, message: &Message) -> bool {
        (self.0)(message)
    }

    pub fn and(self, other: Filter) -> Filter {
        Filter::new(move |message| self.matches(message) && other.matches(message))
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::new(move |message| self.matches(message) || other.matches(message))
    }

    pub fn not(self) -> Filter {
        Filter::new(move |message| !self.matches(message))
    }
}

/// Matches every message.
pub fn all() -> Filter {
    Filter::new(|_| true)
}

/// Matches messages that carry text.
pub fn text() -> Filter {
    Filter::new(|message| message.text.is_some())
}

/// Matches text messages that start with `/`.
pub fn command() -> Filter {
    Filter::new(|message| {
        message
            .text
            .as_deref()
            .is_some_and(|text| text.starts_with('/'))
    })
}

/// Matches messages that carry a caption.
pub fn caption() -> Filter {
    Filter::new(|message| message.caption.is_some())
}

/// Matches messages whose text contains the given pattern.
pub fn regex(pattern: &str) -> Result<Filter, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(Filter::new(move |message| {
        message
            .text
            .as_deref()
            .is_some_and(|text| regex.is_match(text))
    }))
}
