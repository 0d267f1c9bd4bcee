use crate::error::CoreError;
use crate::models::{CorrelationRecord, NewRecord};

/// Persisted correlation state: message pairs, topic mappings and cached push names.
///
/// Implementations must be safe to share between concurrently running event
/// handlers and give read-your-writes consistency per key.
pub trait CorrelationStore: Send + Sync {
    /// Upserts the pair keyed by `(wa_msg_id, wa_chat_id)`.
    fn put_record(&self, record: &NewRecord) -> Result<(), CoreError>;

    /// `CoreError::NotFound` when the message was never bridged.
    fn get_record(&self, wa_msg_id: &str, wa_chat_id: &str) -> Result<CorrelationRecord, CoreError>;

    /// Returns `false` for untracked messages; that is not an error.
    fn mark_read(&self, wa_chat_id: &str, wa_msg_id: &str) -> Result<bool, CoreError>;

    fn get_topic(&self, wa_chat_key: &str, tg_chat_id: i64) -> Result<Option<i64>, CoreError>;

    /// First writer wins: returns the thread id that ended up stored.
    fn put_topic(&self, wa_chat_key: &str, tg_chat_id: i64, tg_thread_id: i64) -> Result<i64, CoreError>;

    fn put_contact_name(&self, user_id: &str, push_name: &str) -> Result<(), CoreError>;

    fn get_contact_name(&self, user_id: &str) -> Result<Option<String>, CoreError>;
}
