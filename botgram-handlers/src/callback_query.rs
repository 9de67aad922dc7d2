//! Callback-query handler: matches button presses, optionally filtering on the
//! query's `data` payload with a regex.

use crate::callback::Callback;
use async_trait::async_trait;
use botgram_core::{Update, UpdateKind};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult};
use regex::Regex;
use tracing::debug;

pub struct CallbackQueryHandler {
    pattern: Option<Regex>,
    callback: Callback,
    block: Option<bool>,
}

impl CallbackQueryHandler {
    /// Matches every callback query.
    pub fn new(callback: Callback) -> Self {
        Self {
            pattern: None,
            callback,
            block: None,
        }
    }

    /// Matches only queries whose `data` matches the pattern; capture groups are
    /// passed to the callback. Queries without `data` never match.
    pub fn with_pattern(pattern: &str, callback: Callback) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
            callback,
            block: None,
        })
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for CallbackQueryHandler {
    fn check(&self, update: &Update) -> Option<CheckResult> {
        let UpdateKind::CallbackQuery(query) = &update.kind else {
            return None;
        };
        let Some(pattern) = &self.pattern else {
            return Some(CheckResult::Match);
        };
        let data = query.data.as_deref()?;
        let captures = pattern.captures(data)?;
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_owned()).unwrap_or_default())
            .collect();
        debug!(update_id = update.update_id, query_id = %query.id, "callback data matched pattern");
        Some(CheckResult::Captures(groups))
    }

    async fn handle(
        &self,
        update: &Update,
        context: &Context,
        check_result: CheckResult,
    ) -> HandlerResult {
        (self.callback)(update.clone(), context.clone(), check_result).await
    }

    fn block(&self) -> Option<bool> {
        self.block
    }
}
