use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::CoreError;
use crate::migrations::MIGRATIONS;
use crate::models::{CorrelationRecord, NewRecord};
use crate::query;
use crate::store::CorrelationStore;

/// SQLite-backed correlation store. One connection behind a mutex; every
/// statement is short, so handlers on other tasks only wait for a single query.
pub struct StoreDb {
    pub path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

pub fn open_store(path: impl AsRef<Path>) -> Result<StoreDb, CoreError> {
    let path = path.as_ref().to_path_buf();
    let conn = Connection::open(&path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA journal_size_limit = 67108864; \
         PRAGMA temp_store = MEMORY;",
    )?;
    apply_migrations(&conn)?;
    Ok(StoreDb {
        path: Some(path),
        conn: Mutex::new(conn),
    })
}

pub fn open_in_memory() -> Result<StoreDb, CoreError> {
    let conn = Connection::open_in_memory()?;
    apply_migrations(&conn)?;
    Ok(StoreDb {
        path: None,
        conn: Mutex::new(conn),
    })
}

pub fn apply_migrations(conn: &Connection) -> Result<(), CoreError> {
    let current_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let mut version = current_version as usize;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let next_version = idx + 1;
        if next_version <= version {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", next_version))?;
        version = next_version;
    }
    Ok(())
}

impl StoreDb {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Storage("store lock poisoned".to_string()))
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError>,
    {
        let guard = self.lock()?;
        f(&guard)
    }
}

impl CorrelationStore for StoreDb {
    fn put_record(&self, record: &NewRecord) -> Result<(), CoreError> {
        self.with_conn(|conn| query::put_record(conn, record))
    }

    fn get_record(&self, wa_msg_id: &str, wa_chat_id: &str) -> Result<CorrelationRecord, CoreError> {
        self.with_conn(|conn| query::get_record(conn, wa_msg_id, wa_chat_id))
    }

    fn mark_read(&self, wa_chat_id: &str, wa_msg_id: &str) -> Result<bool, CoreError> {
        self.with_conn(|conn| query::mark_read(conn, wa_chat_id, wa_msg_id))
    }

    fn get_topic(&self, wa_chat_key: &str, tg_chat_id: i64) -> Result<Option<i64>, CoreError> {
        self.with_conn(|conn| query::get_topic(conn, wa_chat_key, tg_chat_id))
    }

    fn put_topic(&self, wa_chat_key: &str, tg_chat_id: i64, tg_thread_id: i64) -> Result<i64, CoreError> {
        self.with_conn(|conn| query::put_topic(conn, wa_chat_key, tg_chat_id, tg_thread_id))
    }

    fn put_contact_name(&self, user_id: &str, push_name: &str) -> Result<(), CoreError> {
        self.with_conn(|conn| query::put_contact_name(conn, user_id, push_name))
    }

    fn get_contact_name(&self, user_id: &str) -> Result<Option<String>, CoreError> {
        self.with_conn(|conn| query::get_contact_name(conn, user_id))
    }
}
