use std::sync::Arc;

use tracing::{debug, info};

use crate::clients::DestinationClient;
use crate::error::CoreError;
use crate::store::CorrelationStore;

pub const MENTIONS_KEY: &str = "#Mentions";
pub const CALLS_KEY: &str = "#Calls";
pub const STATUS_KEY: &str = "status@broadcast";
pub const STATUS_LABEL: &str = "#Stories";

/// Maps source conversations to threads inside the one destination chat.
///
/// Creation is lazy and unsynchronised: two handlers racing on a brand-new
/// conversation may both create a thread. The store keeps the first mapping
/// written and both handlers post into that one; the loser's thread stays empty.
pub struct TopicResolver {
    store: Arc<dyn CorrelationStore>,
    dest: Arc<dyn DestinationClient>,
    chat_id: i64,
}

impl TopicResolver {
    pub fn new(store: Arc<dyn CorrelationStore>, dest: Arc<dyn DestinationClient>, chat_id: i64) -> Self {
        Self { store, dest, chat_id }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Existing thread for a conversation, without creating one.
    pub fn lookup(&self, key: &str) -> Result<Option<i64>, CoreError> {
        Ok(self.store.get_topic(key, self.chat_id)?.filter(|id| *id != 0))
    }

    pub async fn resolve(&self, key: &str, label: &str) -> Result<i64, CoreError> {
        if let Some(thread_id) = self.lookup(key)? {
            return Ok(thread_id);
        }

        let created = self.dest.create_thread(self.chat_id, &thread_label(label, key)).await?;
        let stored = self.store.put_topic(key, self.chat_id, created)?;
        if stored != created {
            debug!(key, created, stored, "lost thread creation race; using existing thread");
        } else {
            info!(key, thread_id = created, "created destination thread");
        }
        Ok(stored)
    }

    pub async fn rename(&self, thread_id: i64, label: &str) -> Result<(), CoreError> {
        self.dest.rename_thread(self.chat_id, thread_id, label).await
    }
}

/// Destination thread names are limited to 128 characters and may not be blank.
fn thread_label(label: &str, key: &str) -> String {
    let label = if label.trim().is_empty() { key } else { label };
    label.chars().take(128).collect()
}
