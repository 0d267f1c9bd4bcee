use serde::{Deserialize, Serialize};

/// One translated message: the source message and the destination artifact it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub wa_msg_id: String,
    pub wa_chat_id: String,
    pub wa_sender_id: String,
    pub tg_chat_id: i64,
    pub tg_msg_id: i64,
    pub tg_thread_id: i64,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub wa_msg_id: String,
    pub wa_chat_id: String,
    pub wa_sender_id: String,
    pub tg_chat_id: i64,
    pub tg_msg_id: i64,
    pub tg_thread_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMapping {
    pub wa_chat_key: String,
    pub tg_chat_id: i64,
    pub tg_thread_id: i64,
}
