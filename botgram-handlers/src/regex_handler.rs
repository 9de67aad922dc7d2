//! Regex handler: matches message text against a pattern and passes the capture
//! groups to the callback.

use crate::callback::Callback;
use async_trait::async_trait;
use botgram_core::{Update, UpdateKind};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult};
use regex::Regex;
use tracing::debug;

pub struct RegexHandler {
    pattern: Regex,
    callback: Callback,
    block: Option<bool>,
}

impl RegexHandler {
    pub fn new(pattern: &str, callback: Callback) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
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
impl Handler for RegexHandler {
    fn check(&self, update: &Update) -> Option<CheckResult> {
        let message = match &update.kind {
            UpdateKind::Message(m) | UpdateKind::EditedMessage(m) | UpdateKind::ChannelPost(m) => m,
            _ => return None,
        };
        let text = message.text.as_deref()?;
        let captures = self.pattern.captures(text)?;
        // Group 0 is the whole match; the callback gets the numbered groups. A
        // non-participating group comes through as an empty string.
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_owned()).unwrap_or_default())
            .collect();
        debug!(update_id = update.update_id, pattern = %self.pattern, "text matched pattern");
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
