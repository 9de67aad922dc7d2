//! Persistence contract consumed by the dispatch core.
//!
//! The application loads the three data maps at `initialize()`, writes the touched maps
//! after each dispatch, writes everything plus `flush()` at `shutdown()`, and never
//! inspects persisted bytes. No backend ships with this crate.

use crate::context::DataMap;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn bot_data(&self) -> anyhow::Result<DataMap>;
    async fn update_bot_data(&self, data: &DataMap) -> anyhow::Result<()>;

    async fn chat_data(&self) -> anyhow::Result<HashMap<i64, DataMap>>;
    async fn update_chat_data(&self, chat_id: i64, data: &DataMap) -> anyhow::Result<()>;

    async fn user_data(&self) -> anyhow::Result<HashMap<i64, DataMap>>;
    async fn update_user_data(&self, user_id: i64, data: &DataMap) -> anyhow::Result<()>;

    /// Final write barrier, called once during shutdown.
    async fn flush(&self) -> anyhow::Result<()>;
}
