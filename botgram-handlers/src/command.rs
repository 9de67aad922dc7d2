//! Command handler: matches `/name` (optionally `/name@bot_username`) at the start of a
//! new message and passes the parsed arguments to the callback.

use crate::callback::Callback;
use async_trait::async_trait;
use botgram_core::{Update, UpdateKind};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult};
use tracing::debug;

pub struct CommandHandler {
    command: String,
    username: Option<String>,
    callback: Callback,
    block: Option<bool>,
}

impl CommandHandler {
    /// Creates a handler for `/command`. The leading slash may be included or omitted;
    /// matching is case-insensitive.
    pub fn new(command: impl Into<String>, callback: Callback) -> Self {
        let command = command.into();
        let command = command.strip_prefix('/').unwrap_or(&command).to_lowercase();
        Self {
            command,
            username: None,
            callback,
            block: None,
        }
    }

    /// The bot's username, so `/command@other_bot` is not matched. Without it, any
    /// `@mention` suffix is accepted, since there is nothing to compare against.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn check(&self, update: &Update) -> Option<CheckResult> {
        let UpdateKind::Message(message) = &update.kind else {
            return None;
        };
        let text = message.text.as_deref()?;
        let mut parts = text.split_whitespace();
        let first = parts.next()?;
        let command = first.strip_prefix('/')?;

        let (name, mention) = match command.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (command, None),
        };
        if !name.eq_ignore_ascii_case(&self.command) {
            return None;
        }
        if let (Some(mention), Some(username)) = (mention, &self.username) {
            if !mention.eq_ignore_ascii_case(username) {
                return None;
            }
        }

        // No arguments is still a match.
        debug!(update_id = update.update_id, command = %self.command, "command matched");
        Some(CheckResult::Args(parts.map(str::to_owned).collect()))
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
