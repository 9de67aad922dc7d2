//! Message handler: matches new, edited and channel messages against a [`Filter`].

use crate::callback::Callback;
use crate::filters::Filter;
use async_trait::async_trait;
use botgram_core::{Update, UpdateKind};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult};
use tracing::debug;

pub struct MessageHandler {
    filter: Filter,
    callback: Callback,
    block: Option<bool>,
}

impl MessageHandler {
    pub fn new(filter: Filter, callback: Callback) -> Self {
        Self {
            filter,
            callback,
            block: None,
        }
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for MessageHandler {
    fn check(&self, update: &Update) -> Option<CheckResult> {
        let message = match &update.kind {
            UpdateKind::Message(m) | UpdateKind::EditedMessage(m) | UpdateKind::ChannelPost(m) => m,
            _ => return None,
        };
        if !self.filter.matches(message) {
            return None;
        }
        debug!(update_id = update.update_id, "message matched filter");
        Some(CheckResult::Match)
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
