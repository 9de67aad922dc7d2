//! Shared test doubles: a scriptable [`BotApi`] fake and a recording handler.

#![allow(dead_code)]

use async_trait::async_trait;
use botgram_core::{ApiResult, BotApi, Chat, Message, Update, UpdateKind, User};
use botgram_dispatch::{CheckResult, Context, Handler, HandlerResult, Propagation};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// [`BotApi`] fake whose `get_updates` pops pre-scripted batches. Once the script is
/// exhausted it behaves like an idle long poll (short sleep, empty batch).
pub struct FakeBot {
    batches: Mutex<VecDeque<ApiResult<Vec<Update>>>>,
    pub offsets: Mutex<Vec<Option<i64>>>,
    pub get_updates_calls: AtomicUsize,
}

impl FakeBot {
    pub fn new(batches: Vec<ApiResult<Vec<Update>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            offsets: Mutex::new(Vec::new()),
            get_updates_calls: AtomicUsize::new(0),
        }
    }

    pub fn idle() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl BotApi for FakeBot {
    async fn get_me(&self) -> ApiResult<User> {
        Ok(User {
            id: 9000,
            is_bot: true,
            first_name: "testbot".to_string(),
            last_name: None,
            username: Some("test_bot".to_string()),
        })
    }

    async fn get_updates(
        &self,
        offset: Option<i64>,
        _limit: Option<u8>,
        _timeout: Option<u64>,
    ) -> ApiResult<Vec<Update>> {
        self.get_updates_calls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().unwrap().push(offset);
        let scripted = self.batches.lock().unwrap().pop_front();
        match scripted {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Message> {
        Ok(Message {
            message_id: 1,
            date: chrono::Utc::now(),
            chat: Chat {
                id: chat_id,
                kind: "private".to_string(),
                title: None,
                username: None,
            },
            from: None,
            text: Some(text.to_string()),
            caption: None,
        })
    }

    async fn set_webhook(&self, _url: &str, _secret_token: Option<&str>) -> ApiResult<bool> {
        Ok(true)
    }

    async fn delete_webhook(&self, _drop_pending_updates: bool) -> ApiResult<bool> {
        Ok(true)
    }
}

/// Builds a text-message update addressed to `chat_id` from `user_id`.
pub fn message_update(update_id: i64, chat_id: i64, user_id: i64, text: &str) -> Update {
    Update {
        update_id,
        kind: UpdateKind::Message(Message {
            message_id: update_id,
            date: chrono::Utc::now(),
            chat: Chat {
                id: chat_id,
                kind: "private".to_string(),
                title: None,
                username: None,
            },
            from: Some(User {
                id: user_id,
                is_bot: false,
                first_name: "Tester".to_string(),
                last_name: None,
                username: None,
            }),
            text: Some(text.to_string()),
            caption: None,
        }),
    }
}

/// What a [`ScriptHandler`] does when it fires.
#[derive(Clone, Copy)]
pub enum Outcome {
    Continue,
    Stop,
    Fail,
}

/// Catch-all handler that records its name into a shared log and then follows its
/// scripted outcome.
pub struct ScriptHandler {
    pub name: String,
    pub log: Arc<Mutex<Vec<String>>>,
    pub outcome: Outcome,
    pub block: Option<bool>,
}

impl ScriptHandler {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log,
            outcome,
            block: None,
        })
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    fn check(&self, _update: &Update) -> Option<CheckResult> {
        Some(CheckResult::Match)
    }

    async fn handle(
        &self,
        _update: &Update,
        _context: &Context,
        _check_result: CheckResult,
    ) -> HandlerResult {
        self.log.lock().unwrap().push(self.name.clone());
        match self.outcome {
            Outcome::Continue => Ok(Propagation::Continue),
            Outcome::Stop => Ok(Propagation::Stop),
            Outcome::Fail => Err(anyhow::anyhow!("scripted failure in {}", self.name)),
        }
    }

    fn block(&self) -> Option<bool> {
        self.block
    }
}
