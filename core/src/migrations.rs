pub const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS msg_id_pairs (
      wa_msg_id TEXT NOT NULL,
      wa_chat_id TEXT NOT NULL,
      wa_sender_id TEXT NOT NULL,
      tg_chat_id INTEGER NOT NULL,
      tg_msg_id INTEGER NOT NULL,
      tg_thread_id INTEGER NOT NULL DEFAULT 0,
      is_read INTEGER NOT NULL DEFAULT 0,
      PRIMARY KEY (wa_msg_id, wa_chat_id)
    );

    CREATE TABLE IF NOT EXISTS chat_threads (
      wa_chat_key TEXT NOT NULL,
      tg_chat_id INTEGER NOT NULL,
      tg_thread_id INTEGER NOT NULL,
      PRIMARY KEY (wa_chat_key, tg_chat_id)
    );

    CREATE TABLE IF NOT EXISTS contacts (
      user_id TEXT PRIMARY KEY,
      push_name TEXT NOT NULL,
      updated_at INTEGER NOT NULL
    );
    "#,
    r#"
    ALTER TABLE msg_id_pairs ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0;

    CREATE INDEX IF NOT EXISTS idx_msg_id_pairs_tg
      ON msg_id_pairs(tg_chat_id, tg_msg_id);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_chat_threads_tg_thread
      ON chat_threads(tg_chat_id, tg_thread_id);
    "#,
];
