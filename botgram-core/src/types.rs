//! Bot API data model: the [`Update`] envelope and the interface types it carries.
//!
//! Only the fields the dispatch layer and the bundled handlers actually read are modeled;
//! the full Bot API object graph is out of scope here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identity as returned inside updates and by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Chat (private, group, supergroup or channel) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A single message. `from` is absent for channel posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// An inline-keyboard button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// The payload of an [`Update`]. On the wire an update carries exactly one of these as an
/// optional field next to `update_id`; payload fields this crate does not model decode as
/// [`UpdateKind::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    CallbackQuery(CallbackQuery),
    Unknown,
}

/// One event delivered by the Bot API. `update_id` is unique and monotonically increasing
/// per source; the envelope is immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawUpdate", into = "RawUpdate")]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
}

impl Update {
    /// The message carried by this update, if any. Callback queries expose the message the
    /// pressed keyboard was attached to.
    pub fn effective_message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(message)
            | UpdateKind::EditedMessage(message)
            | UpdateKind::ChannelPost(message) => Some(message),
            UpdateKind::CallbackQuery(query) => query.message.as_ref(),
            UpdateKind::Unknown => None,
        }
    }

    /// Id of the chat this update belongs to, if any. Keys the per-chat data map.
    pub fn effective_chat_id(&self) -> Option<i64> {
        self.effective_message().map(|message| message.chat.id)
    }

    /// Id of the user that triggered this update, if any. Keys the per-user data map.
    pub fn effective_user_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::CallbackQuery(query) => Some(query.from.id),
            _ => self
                .effective_message()
                .and_then(|message| message.from.as_ref())
                .map(|user| user.id),
        }
    }
}

/// Wire shape of an update: `update_id` plus at most one payload field.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_query: Option<CallbackQuery>,
}

impl From<RawUpdate> for Update {
    fn from(raw: RawUpdate) -> Self {
        let kind = if let Some(message) = raw.message {
            UpdateKind::Message(message)
        } else if let Some(message) = raw.edited_message {
            UpdateKind::EditedMessage(message)
        } else if let Some(message) = raw.channel_post {
            UpdateKind::ChannelPost(message)
        } else if let Some(query) = raw.callback_query {
            UpdateKind::CallbackQuery(query)
        } else {
            UpdateKind::Unknown
        };
        Update {
            update_id: raw.update_id,
            kind,
        }
    }
}

impl From<Update> for RawUpdate {
    fn from(update: Update) -> Self {
        let mut raw = RawUpdate {
            update_id: update.update_id,
            message: None,
            edited_message: None,
            channel_post: None,
            callback_query: None,
        };
        match update.kind {
            UpdateKind::Message(message) => raw.message = Some(message),
            UpdateKind::EditedMessage(message) => raw.edited_message = Some(message),
            UpdateKind::ChannelPost(message) => raw.channel_post = Some(message),
            UpdateKind::CallbackQuery(query) => raw.callback_query = Some(query),
            UpdateKind::Unknown => {}
        }
        raw
    }
}
