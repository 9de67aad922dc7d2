//! Update-kind handler: matches updates by their payload kind, or everything.

use crate::callback::Callback;
use async_trait::async_trait;
use botgram_core::{Update, UpdateKind};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult};

/// The shape of an update's payload, without the payload itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Message,
    EditedMessage,
    ChannelPost,
    CallbackQuery,
    Unknown,
}

impl Kind {
    pub fn of(update: &Update) -> Kind {
        match &update.kind {
            UpdateKind::Message(_) => Kind::Message,
            UpdateKind::EditedMessage(_) => Kind::EditedMessage,
            UpdateKind::ChannelPost(_) => Kind::ChannelPost,
            UpdateKind::CallbackQuery(_) => Kind::CallbackQuery,
            UpdateKind::Unknown => Kind::Unknown,
        }
    }
}

pub struct KindHandler {
    kind: Option<Kind>,
    callback: Callback,
    block: Option<bool>,
}

impl KindHandler {
    pub fn new(kind: Kind, callback: Callback) -> Self {
        Self {
            kind: Some(kind),
            callback,
            block: None,
        }
    }

    /// A handler that matches every update, whatever its kind. Useful as the last
    /// handler of the last group.
    pub fn catch_all(callback: Callback) -> Self {
        Self {
            kind: None,
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
impl Handler for KindHandler {
    fn check(&self, update: &Update) -> Option<CheckResult> {
        match self.kind {
            None => Some(CheckResult::Match),
            Some(kind) => (Kind::of(update) == kind).then_some(CheckResult::Match),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::callback;
    use botgram_dispatch::Propagation;

    fn unknown_update() -> Update {
        Update {
            update_id: 1,
            kind: UpdateKind::Unknown,
        }
    }

    fn cb() -> Callback {
        callback(|_, _, _| async { Ok(Propagation::Continue) })
    }

    #[test]
    fn test_kind_must_match() {
        let h = KindHandler::new(Kind::CallbackQuery, cb());
        assert!(h.check(&unknown_update()).is_none());

        let h = KindHandler::new(Kind::Unknown, cb());
        assert_eq!(h.check(&unknown_update()), Some(CheckResult::Match));
    }

    #[test]
    fn test_catch_all_matches_everything() {
        let h = KindHandler::catch_all(cb());
        assert_eq!(h.check(&unknown_update()), Some(CheckResult::Match));
    }
}
