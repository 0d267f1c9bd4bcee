use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CoreError;
use crate::models::{CorrelationRecord, NewRecord, TopicMapping};

pub fn put_record(conn: &Connection, record: &NewRecord) -> Result<(), CoreError> {
    conn.execute(
        "INSERT INTO msg_id_pairs (wa_msg_id, wa_chat_id, wa_sender_id, tg_chat_id, tg_msg_id, tg_thread_id, is_read, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7) \
         ON CONFLICT(wa_msg_id, wa_chat_id) DO UPDATE SET \
           wa_sender_id = excluded.wa_sender_id, \
           tg_chat_id = excluded.tg_chat_id, \
           tg_msg_id = excluded.tg_msg_id, \
           tg_thread_id = excluded.tg_thread_id;",
        params![
            record.wa_msg_id,
            record.wa_chat_id,
            record.wa_sender_id,
            record.tg_chat_id,
            record.tg_msg_id,
            record.tg_thread_id,
            Utc::now().timestamp_millis(),
        ],
    )?;
    Ok(())
}

pub fn get_record(conn: &Connection, wa_msg_id: &str, wa_chat_id: &str) -> Result<CorrelationRecord, CoreError> {
    conn.query_row(
        "SELECT wa_msg_id, wa_chat_id, wa_sender_id, tg_chat_id, tg_msg_id, tg_thread_id, is_read \
         FROM msg_id_pairs \
         WHERE wa_msg_id = ?1 AND wa_chat_id = ?2;",
        params![wa_msg_id, wa_chat_id],
        |row| {
            Ok(CorrelationRecord {
                wa_msg_id: row.get(0)?,
                wa_chat_id: row.get(1)?,
                wa_sender_id: row.get(2)?,
                tg_chat_id: row.get(3)?,
                tg_msg_id: row.get(4)?,
                tg_thread_id: row.get(5)?,
                is_read: row.get::<_, i64>(6)? != 0,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CoreError::NotFound(format!("no message pair for {} in {}", wa_msg_id, wa_chat_id)))
}

/// Returns whether a tracked message was updated.
pub fn mark_read(conn: &Connection, wa_chat_id: &str, wa_msg_id: &str) -> Result<bool, CoreError> {
    let changed = conn.execute(
        "UPDATE msg_id_pairs SET is_read = 1 WHERE wa_msg_id = ?1 AND wa_chat_id = ?2;",
        params![wa_msg_id, wa_chat_id],
    )?;
    Ok(changed > 0)
}

pub fn get_topic(conn: &Connection, wa_chat_key: &str, tg_chat_id: i64) -> Result<Option<i64>, CoreError> {
    let thread_id = conn
        .query_row(
            "SELECT tg_thread_id FROM chat_threads WHERE wa_chat_key = ?1 AND tg_chat_id = ?2;",
            params![wa_chat_key, tg_chat_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(thread_id)
}

/// Inserts the mapping unless one already exists and returns the stored thread id,
/// so a concurrent creator converges on the first writer's thread.
pub fn put_topic(conn: &Connection, wa_chat_key: &str, tg_chat_id: i64, tg_thread_id: i64) -> Result<i64, CoreError> {
    conn.execute(
        "INSERT INTO chat_threads (wa_chat_key, tg_chat_id, tg_thread_id) VALUES (?1, ?2, ?3) \
         ON CONFLICT(wa_chat_key, tg_chat_id) DO NOTHING;",
        params![wa_chat_key, tg_chat_id, tg_thread_id],
    )?;
    get_topic(conn, wa_chat_key, tg_chat_id)?
        .ok_or_else(|| CoreError::Storage(format!("topic for {} vanished after insert", wa_chat_key)))
}

pub fn list_topics(conn: &Connection, tg_chat_id: i64) -> Result<Vec<TopicMapping>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT wa_chat_key, tg_chat_id, tg_thread_id FROM chat_threads \
         WHERE tg_chat_id = ?1 \
         ORDER BY tg_thread_id ASC;",
    )?;
    let rows = stmt.query_map(params![tg_chat_id], |row| {
        Ok(TopicMapping {
            wa_chat_key: row.get(0)?,
            tg_chat_id: row.get(1)?,
            tg_thread_id: row.get(2)?,
        })
    })?;
    Ok(rows.filter_map(Result::ok).collect())
}

pub fn put_contact_name(conn: &Connection, user_id: &str, push_name: &str) -> Result<(), CoreError> {
    conn.execute(
        "INSERT INTO contacts (user_id, push_name, updated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(user_id) DO UPDATE SET push_name = excluded.push_name, updated_at = excluded.updated_at;",
        params![user_id, push_name, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

pub fn get_contact_name(conn: &Connection, user_id: &str) -> Result<Option<String>, CoreError> {
    let name = conn
        .query_row(
            "SELECT push_name FROM contacts WHERE user_id = ?1;",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}
