use rusqlite::Connection;
use thread_relay_core::db::apply_migrations;

fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({});", table))
        .expect("pragma");
    let mut rows = stmt.query([]).expect("rows");
    while let Some(row) = rows.next().expect("row") {
        let name: String = row.get(1).expect("name");
        if name == column {
            return true;
        }
    }
    false
}

#[test]
fn msg_id_pairs_created_at_column_exists() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    assert!(column_exists(&conn, "msg_id_pairs", "created_at"), "created_at column missing");
    assert!(column_exists(&conn, "msg_id_pairs", "is_read"), "is_read column missing");
}

#[test]
fn destination_lookup_indexes_exist() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    for index in ["idx_msg_id_pairs_tg", "idx_chat_threads_tg_thread"] {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type='index' AND name=?1;",
                [index],
                |row| row.get(0),
            )
            .expect("index query");
        assert_eq!(count, 1, "{} missing", index);
    }
}

#[test]
fn contacts_table_exists() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    assert!(column_exists(&conn, "contacts", "push_name"));
}
